//! Data models for Google Drive and OAuth2 responses, and the narrowed tool output shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The fixed subset of Drive file metadata exposed to tool callers.
///
/// Any other field present in the Drive response is dropped on deserialization,
/// so the public shape stays stable when the upstream schema grows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

impl std::fmt::Display for FileSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = self.web_view_link.as_deref().unwrap_or("-");
        write!(f, "{}\t{}\t{}\t{}", self.id, self.mime_type, self.name, link)
    }
}

/// One page of search results, in Drive response order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub files: Vec<FileSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// A file's metadata together with its fully downloaded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub metadata: FileSummary,
    pub content: Vec<u8>,
}

/// Response from the files.list API endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    #[serde(default)]
    pub files: Vec<FileSummary>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl From<FileListResponse> for SearchResult {
    fn from(response: FileListResponse) -> Self {
        Self {
            files: response.files,
            next_page_token: response.next_page_token,
        }
    }
}

/// Google API error response.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub code: u16,
    pub message: String,
}

/// Error body returned by the OAuth2 token endpoint.
#[derive(Debug, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// OAuth2 token response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Google "authorized user" token file, as written by the setup flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUserFile {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Fields written by other tools (`universe_domain`, `account`, ...), kept on rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// OAuth client secrets downloaded from the Google Cloud console.
#[derive(Debug, Deserialize)]
pub struct ClientSecretsFile {
    #[serde(default)]
    pub installed: Option<ClientSecrets>,
    #[serde(default)]
    pub web: Option<ClientSecrets>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    crate::auth::AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    crate::auth::TOKEN_URI.to_string()
}
