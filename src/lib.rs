//! gdrive_mcp - Google Drive search and file retrieval as MCP tools.
//!
//! This library provides:
//! - Credential resolution: load a persisted OAuth2 token, refresh it when expired
//! - A Drive client that searches by name and downloads files in chunks
//! - An MCP tool server exposing `search` and `getFile`
//!
//! # Example
//!
//! ```no_run
//! use gdrive_mcp::{CredentialResolver, DriveClient, TokenSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = TokenSource::new("tokens.json");
//!     let credential = CredentialResolver::new().resolve(&source).await?.into_credential();
//!     let client = DriveClient::new(credential);
//!
//!     let result = client.search("report", 10, None).await?;
//!     for file in result.files {
//!         println!("{}", file);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod credential;
pub mod download;
pub mod error;
pub mod models;
pub mod server;
pub mod setup;
pub mod url_parser;

// Re-exports for convenience
pub use auth::{CredentialResolver, Resolution};
pub use client::DriveClient;
pub use credential::{Credential, CredentialState, TokenFormat, TokenSource};
pub use error::{AuthError, DriveError, Error, RemoteError, Result};
pub use models::{FileContent, FileSummary, SearchResult};
pub use url_parser::extract_file_id;
