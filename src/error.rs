//! Error types for the gdrive_mcp crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by Google's HTTP endpoints or the transport below them.
#[derive(Error, Debug)]
pub enum DriveError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Malformed response: {0}")]
    DecodeError(#[from] serde_json::Error),

    #[error("Unexpected download response: {0}")]
    ProtocolError(String),
}

/// Errors raised while resolving the persisted credential.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token file not found at {}. Run `gdrive_mcp setup` first to authorize access.", path.display())]
    NotConfigured { path: PathBuf },

    #[error(
        "Could not load token file '{}' ({details}). Supported formats: .json, .bin. Run `gdrive_mcp setup` again to recreate it.",
        path.display()
    )]
    CorruptToken { path: PathBuf, details: String },

    #[error("Error refreshing token: {source}. Please run `gdrive_mcp setup` again to re-authenticate.")]
    RefreshFailed {
        #[source]
        source: DriveError,
    },

    #[error("Invalid or missing credentials: {reason}. Please run `gdrive_mcp setup`.")]
    Invalid { reason: String },

    #[error("Failed to access token file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The Drive call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Search,
    GetMetadata,
    Download,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Search => write!(f, "searching files"),
            Operation::GetMetadata => write!(f, "fetching file metadata"),
            Operation::Download => write!(f, "downloading file"),
        }
    }
}

/// An upstream failure tagged with the operation and parameters that caused it.
#[derive(Error, Debug)]
#[error("Error {operation} ({params}): {source}")]
pub struct RemoteError {
    pub operation: Operation,
    pub params: String,
    #[source]
    pub source: DriveError,
}

impl RemoteError {
    pub fn new(operation: Operation, params: impl Into<String>, source: DriveError) -> Self {
        Self {
            operation,
            params: params.into(),
            source,
        }
    }
}

/// Errors raised by the interactive setup flow.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Failed to read client secrets file '{}': {source}", path.display())]
    SecretsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Client secrets file is not valid: {0}")]
    SecretsFormat(String),

    #[error("OAuth callback failed: {0}")]
    Callback(String),

    #[error("Authorization code exchange failed: {0}")]
    Exchange(#[source] DriveError),

    #[error("Local redirect listener failed: {0}")]
    Listener(#[from] std::io::Error),
}

/// Top-level error for everything a tool call or the CLI can hit.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Invalid URL or ID: {0}")]
    InvalidUrlOrId(String),
}

/// Result type alias for the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for credential resolution.
pub type AuthResult<T> = std::result::Result<T, AuthError>;
