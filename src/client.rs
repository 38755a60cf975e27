//! Google Drive API client for search and file retrieval.

use reqwest::{Client, Response, Url};

use crate::credential::Credential;
use crate::download::{ChunkedDownload, DEFAULT_CHUNK_SIZE};
use crate::error::{DriveError, Operation, RemoteError};
use crate::models::{ApiErrorResponse, FileContent, FileListResponse, FileSummary, SearchResult};

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Fields requested for each file; everything else is dropped by the API.
const FILE_FIELDS: &str = "id, name, mimeType, webViewLink";

/// Largest page size the Drive API accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Client for Drive operations under a single resolved credential.
///
/// Every call is a fresh round trip: nothing is cached and nothing is retried.
#[derive(Clone)]
pub struct DriveClient {
    credential: Credential,
    http: Client,
    base_url: String,
    chunk_size: u64,
}

impl DriveClient {
    /// Create a new DriveClient.
    ///
    /// # Arguments
    /// * `credential` - A credential already checked by the resolver
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            http: Client::new(),
            base_url: DRIVE_API_BASE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Point the client at a different API root (used against mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Search files whose name contains `name_pattern`.
    ///
    /// # Arguments
    /// * `name_pattern` - Substring matched against file names
    /// * `page_size` - Maximum results for this call, clamped to 1..=1000
    /// * `page_token` - Continuation token from a previous call, passed through unchanged
    pub async fn search(
        &self,
        name_pattern: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<SearchResult, RemoteError> {
        let query = name_query(name_pattern);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE).to_string();

        tracing::debug!(%query, %page_size, has_page_token = page_token.is_some(), "searching files");

        let list_response = self
            .list_files(&query, &page_size, page_token)
            .await
            .map_err(|e| RemoteError::new(Operation::Search, format!("q={}", query), e))?;

        let result = SearchResult::from(list_response);
        tracing::info!(
            %query,
            count = result.files.len(),
            more = result.next_page_token.is_some(),
            "search completed"
        );
        Ok(result)
    }

    async fn list_files(
        &self,
        query: &str,
        page_size: &str,
        page_token: Option<&str>,
    ) -> Result<FileListResponse, DriveError> {
        let fields = format!("nextPageToken, files({})", FILE_FIELDS);
        let mut request = self
            .http
            .get(format!("{}/files", self.base_url))
            .bearer_auth(self.credential.bearer())
            .query(&[
                ("q", query),
                ("pageSize", page_size),
                ("fields", fields.as_str()),
                ("includeItemsFromAllDrives", "true"),
                ("supportsAllDrives", "true"),
            ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = error_for_status(request.send().await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Get file metadata by ID.
    pub async fn get_metadata(&self, file_id: &str) -> Result<FileSummary, RemoteError> {
        self.fetch_metadata(file_id)
            .await
            .map_err(|e| RemoteError::new(Operation::GetMetadata, format!("fileId={}", file_id), e))
    }

    async fn fetch_metadata(&self, file_id: &str) -> Result<FileSummary, DriveError> {
        let response = self
            .http
            .get(self.file_url(file_id)?)
            .bearer_auth(self.credential.bearer())
            .query(&[("supportsAllDrives", "true"), ("fields", FILE_FIELDS)])
            .send()
            .await?;

        let response = error_for_status(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch a file's metadata and its full content.
    ///
    /// The content is downloaded in chunks and assembled in order. Any failure
    /// discards what was received so far.
    pub async fn fetch_file(&self, file_id: &str) -> Result<FileContent, RemoteError> {
        let metadata = self.get_metadata(file_id).await?;

        let download_error =
            |e| RemoteError::new(Operation::Download, format!("fileId={}", file_id), e);
        let content = self
            .download(file_id)
            .map_err(download_error)?
            .collect()
            .await
            .map_err(download_error)?;

        tracing::info!(
            file_id,
            name = %metadata.name,
            bytes = content.len(),
            "file downloaded"
        );

        Ok(FileContent { metadata, content })
    }

    /// Start a chunked download of a file's media.
    pub fn download(&self, file_id: &str) -> Result<ChunkedDownload<'_>, DriveError> {
        Ok(ChunkedDownload::new(
            &self.http,
            self.file_url(file_id)?.into(),
            self.credential.bearer(),
            self.chunk_size,
        ))
    }

    /// `{base}/files/{id}` with the ID percent-encoded as a single path segment.
    fn file_url(&self, file_id: &str) -> Result<Url, DriveError> {
        if file_id.is_empty() {
            return Err(DriveError::ProtocolError("file ID is empty".to_string()));
        }
        let invalid_base = || DriveError::ProtocolError(format!("invalid API base URL {}", self.base_url));

        let mut url = Url::parse(&self.base_url).map_err(|_| invalid_base())?;
        url.path_segments_mut()
            .map_err(|_| invalid_base())?
            .pop_if_empty()
            .push("files")
            .push(file_id);
        Ok(url)
    }
}

/// Drive query matching non-trashed files whose name contains `pattern`.
pub fn name_query(pattern: &str) -> String {
    let escaped = pattern.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name contains '{}' and trashed = false", escaped)
}

/// Turn a non-success response into a [`DriveError`], preferring Google's error body.
pub(crate) async fn api_error(response: Response) -> DriveError {
    let status = response.status();
    let error_body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
        return DriveError::ApiError {
            status: api_error.error.code,
            message: api_error.error.message,
        };
    }
    DriveError::ApiError {
        status: status.as_u16(),
        message: error_body,
    }
}

pub(crate) async fn error_for_status(response: Response) -> Result<Response, DriveError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(api_error(response).await)
    }
}
