//! Chunked media download using HTTP range requests.

use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};

use crate::client::api_error;
use crate::error::DriveError;

/// Default chunk size (100 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = spec.split_once('/')?;
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };
        let (start, end) = range.trim().split_once('-')?;
        let start: u64 = start.parse().ok()?;
        let end: u64 = end.parse().ok()?;
        if end < start {
            return None;
        }
        Some(Self { start, end, total })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Length from a 416 `Content-Range: bytes */<length>` header.
fn unsatisfied_length(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_prefix("bytes")?
        .trim_start()
        .strip_prefix("*/")?
        .trim()
        .parse()
        .ok()
}

/// Downloads one media resource chunk by chunk.
///
/// Call [`next_chunk`](Self::next_chunk) until it reports completion; chunks
/// arrive strictly in order.
pub struct ChunkedDownload<'a> {
    http: &'a Client,
    url: String,
    bearer: &'a str,
    chunk_size: u64,
    received: u64,
    total: Option<u64>,
    done: bool,
}

impl<'a> ChunkedDownload<'a> {
    pub fn new(http: &'a Client, url: String, bearer: &'a str, chunk_size: u64) -> Self {
        Self {
            http,
            url,
            bearer,
            chunk_size: chunk_size.max(1),
            received: 0,
            total: None,
            done: false,
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetch the next chunk. Returns the chunk bytes and whether the transfer is complete.
    pub async fn next_chunk(&mut self) -> Result<(Vec<u8>, bool), DriveError> {
        if self.done {
            return Ok((Vec::new(), true));
        }

        let start = self.received;
        let end = start.saturating_add(self.chunk_size - 1);

        let response = self
            .http
            .get(&self.url)
            .bearer_auth(self.bearer)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                if start != 0 {
                    return Err(DriveError::ProtocolError(format!(
                        "server ignored range request at offset {}",
                        start
                    )));
                }
                let body = response.bytes().await?.to_vec();
                self.received = body.len() as u64;
                self.total = Some(self.received);
                self.done = true;
                Ok((body, true))
            }
            StatusCode::PARTIAL_CONTENT => {
                let range = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(ContentRange::parse)
                    .ok_or_else(|| {
                        DriveError::ProtocolError(
                            "missing or malformed Content-Range header".to_string(),
                        )
                    })?;

                if range.start != start {
                    return Err(DriveError::ProtocolError(format!(
                        "expected chunk at offset {}, got {}",
                        start, range.start
                    )));
                }

                let body = response.bytes().await?.to_vec();
                if body.len() as u64 != range.len() {
                    return Err(DriveError::ProtocolError(format!(
                        "chunk length {} does not match Content-Range {}-{}",
                        body.len(),
                        range.start,
                        range.end
                    )));
                }

                self.received = range.end + 1;
                self.total = range.total;
                self.done = match range.total {
                    Some(total) => self.received >= total,
                    None => range.len() < self.chunk_size,
                };

                tracing::debug!(
                    received = self.received,
                    total = ?self.total,
                    "downloaded chunk"
                );
                Ok((body, self.done))
            }
            StatusCode::RANGE_NOT_SATISFIABLE if self.total.is_none() => {
                // Zero-length media, or media whose length is an exact multiple of
                // the chunk size when no total was ever reported.
                let reported = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(unsatisfied_length);
                if reported.map_or(true, |len| len == start) {
                    self.total = Some(start);
                    self.done = true;
                    Ok((Vec::new(), true))
                } else {
                    Err(api_error(response).await)
                }
            }
            _ => Err(api_error(response).await),
        }
    }

    /// Drive the download to completion, concatenating chunks in order.
    ///
    /// On any failure the partially assembled buffer is dropped.
    pub async fn collect(mut self) -> Result<Vec<u8>, DriveError> {
        let mut content = Vec::new();
        loop {
            let (chunk, done) = self.next_chunk().await?;
            content.extend_from_slice(&chunk);
            if done {
                break;
            }
        }
        Ok(content)
    }
}
