//! MCP tool server exposing `search` and `getFile` over Google Drive.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::auth::{CredentialResolver, Resolution};
use crate::client::{DriveClient, DRIVE_API_BASE};
use crate::credential::{TokenFormat, TokenSource};
use crate::download::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, Result as DriveResult};
use crate::models::{FileContent, SearchResult};
use crate::url_parser::extract_file_id;

/// Page size used when the caller does not pass one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Tunables for the Drive side of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub drive_base_url: String,
    pub chunk_size: u64,
    pub default_page_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            drive_base_url: DRIVE_API_BASE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Holds the token source and the currently active Drive client.
///
/// The credential is resolved lazily and re-resolved once it expires; a
/// refreshed credential is written back to the token file in the format it
/// was read in.
pub struct Session {
    source: TokenSource,
    resolver: CredentialResolver,
    config: SessionConfig,
    active: RwLock<Option<Arc<DriveClient>>>,
}

impl Session {
    pub fn new(source: TokenSource, resolver: CredentialResolver, config: SessionConfig) -> Self {
        Self {
            source,
            resolver,
            config,
            active: RwLock::new(None),
        }
    }

    pub fn source(&self) -> &TokenSource {
        &self.source
    }

    /// Resolve credentials ahead of the first tool call, logging instead of failing.
    pub async fn warm_up(&self) {
        match self.client().await {
            Ok(client) => tracing::info!(
                expiry = ?client.credential().expiry,
                "credentials ready"
            ),
            Err(e) => tracing::warn!(error = %e, "credentials not ready; tool calls will report the error"),
        }
    }

    /// The Drive client for the current credential, resolving it if needed.
    pub async fn client(&self) -> DriveResult<Arc<DriveClient>> {
        {
            let active = self.active.read().await;
            if let Some(client) = active.as_ref() {
                if !client.credential().is_expired() {
                    return Ok(Arc::clone(client));
                }
            }
        }

        let mut active = self.active.write().await;

        // Another call may have resolved while we waited for the lock.
        if let Some(client) = active.as_ref() {
            if !client.credential().is_expired() {
                return Ok(Arc::clone(client));
            }
        }

        let (resolution, format) = self.resolver.resolve_stored(&self.source).await?;
        if resolution.is_refreshed() {
            self.persist(&resolution, format);
        }

        let client = Arc::new(
            DriveClient::new(resolution.into_credential())
                .with_base_url(self.config.drive_base_url.clone())
                .with_chunk_size(self.config.chunk_size),
        );
        *active = Some(Arc::clone(&client));

        Ok(client)
    }

    fn persist(&self, resolution: &Resolution, format: TokenFormat) {
        match self.source.save(resolution.credential(), format) {
            Ok(()) => tracing::info!(
                path = %self.source.path().display(),
                "persisted refreshed credentials"
            ),
            Err(e) => tracing::warn!(error = %e, "failed to persist refreshed credentials"),
        }
    }

    pub async fn search(
        &self,
        query: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> DriveResult<SearchResult> {
        let client = self.client().await?;
        let page_size = page_size.unwrap_or(self.config.default_page_size);
        Ok(client.search(query, page_size, page_token).await?)
    }

    /// Fetch a file by raw ID or Drive share URL.
    pub async fn get_file(&self, file_id_or_url: &str) -> DriveResult<FileContent> {
        let file_id = extract_file_id(file_id_or_url)?;
        let client = self.client().await?;
        Ok(client.fetch_file(&file_id).await?)
    }
}

/// JSON payload for a search result.
pub fn search_payload(result: &SearchResult) -> Value {
    serde_json::to_value(result).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

/// JSON payload for a downloaded file: UTF-8 content as text, anything else base64.
pub fn file_payload(file: &FileContent) -> Value {
    let (content, encoding) = match std::str::from_utf8(&file.content) {
        Ok(text) => (text.to_string(), "utf-8"),
        Err(_) => (BASE64.encode(&file.content), "base64"),
    };
    json!({
        "metadata": file.metadata,
        "content": content,
        "contentEncoding": encoding,
    })
}

/// JSON payload reported for a failed tool call.
pub fn error_payload(err: &Error) -> Value {
    json!({ "error": err.to_string() })
}

fn tool_result(outcome: DriveResult<Value>) -> CallToolResult {
    match outcome {
        Ok(value) => CallToolResult::success(vec![Content::text(value.to_string())]),
        Err(e) => {
            tracing::warn!(error = %e, "tool call failed");
            CallToolResult::error(vec![Content::text(error_payload(&e).to_string())])
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[schemars(description = "Substring matched against file names")]
    pub query: String,

    #[schemars(description = "Maximum number of files to return (1-1000, default 10)")]
    pub page_size: Option<u32>,

    #[schemars(description = "nextPageToken from a previous search, to fetch the following page")]
    pub page_token: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetFileRequest {
    #[schemars(description = "Drive file ID or share URL")]
    pub file_id: String,
}

/// MCP service wrapping a shared [`Session`].
#[derive(Clone)]
pub struct DriveTools {
    session: Arc<Session>,
    tool_router: ToolRouter<Self>,
}

impl DriveTools {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl DriveTools {
    #[tool(description = "Search Google Drive for files whose name contains the query. Returns id, name, mimeType and webViewLink per file, plus nextPageToken when more results exist.")]
    pub async fn search(
        &self,
        Parameters(request): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self
            .session
            .search(&request.query, request.page_size, request.page_token.as_deref())
            .await
            .map(|result| search_payload(&result));
        Ok(tool_result(outcome))
    }

    #[tool(
        name = "getFile",
        description = "Download a Google Drive file by ID or share URL. Returns its metadata and content (UTF-8 text, or base64 for binary files)."
    )]
    pub async fn get_file(
        &self,
        Parameters(request): Parameters<GetFileRequest>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = self
            .session
            .get_file(&request.file_id)
            .await
            .map(|file| file_payload(&file));
        Ok(tool_result(outcome))
    }
}

#[tool_handler]
impl ServerHandler for DriveTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Google Drive tools: use 'search' to find files by name, then 'getFile' with a returned id to read its content.".into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::models::FileSummary;

    fn summary() -> FileSummary {
        FileSummary {
            id: "abc123".to_string(),
            name: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
            web_view_link: Some("https://drive.google.com/file/d/abc123/view".to_string()),
        }
    }

    #[test]
    fn test_file_payload_text() {
        let file = FileContent {
            metadata: summary(),
            content: b"hello".to_vec(),
        };
        let payload = file_payload(&file);
        assert_eq!(payload["content"], "hello");
        assert_eq!(payload["contentEncoding"], "utf-8");
        assert_eq!(payload["metadata"]["id"], "abc123");
    }

    #[test]
    fn test_file_payload_binary() {
        let file = FileContent {
            metadata: summary(),
            content: vec![0xff, 0xfe, 0x00],
        };
        let payload = file_payload(&file);
        assert_eq!(payload["content"], "//4A");
        assert_eq!(payload["contentEncoding"], "base64");
    }

    #[test]
    fn test_error_payload_shape() {
        let err = Error::from(AuthError::NotConfigured {
            path: "tokens.json".into(),
        });
        let payload = error_payload(&err);
        let obj = payload.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .starts_with("Token file not found"));
    }

    fn tools_without_token(dir: &tempfile::TempDir) -> DriveTools {
        let session = Session::new(
            TokenSource::new(dir.path().join("tokens.json")),
            CredentialResolver::new(),
            SessionConfig::default(),
        );
        DriveTools::new(Arc::new(session))
    }

    #[test]
    fn test_router_lists_both_tools() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools_without_token(&dir);

        let mut names: Vec<String> = tools
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["getFile", "search"]);
    }

    #[tokio::test]
    async fn test_tool_call_reports_error_payload() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools_without_token(&dir);

        let result = tools
            .search(Parameters(SearchRequest {
                query: "report".to_string(),
                page_size: None,
                page_token: None,
            }))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
        let text = &result.content[0].as_text().unwrap().text;
        let payload: Value = serde_json::from_str(text).unwrap();
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .starts_with("Token file not found"));
    }

    #[test]
    fn test_search_payload_omits_missing_token() {
        let payload = search_payload(&SearchResult {
            files: vec![summary()],
            next_page_token: None,
        });
        assert!(payload.get("nextPageToken").is_none());
        assert_eq!(payload["files"].as_array().unwrap().len(), 1);
    }
}
