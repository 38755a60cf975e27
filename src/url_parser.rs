//! Extracts Google Drive file IDs from share links.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// `drive.google.com/file/d/<ID>` share links.
static FILE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/file/(?:u/\d+/)?d/([a-zA-Z0-9_-]+)")
        .expect("Invalid file URL regex")
});

/// Docs, Sheets and Slides editor links.
static DOCS_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://docs\.google\.com/(?:document|spreadsheets|presentation|forms)/(?:u/\d+/)?d/([a-zA-Z0-9_-]+)",
    )
    .expect("Invalid docs URL regex")
});

/// `open?id=` and `uc?id=` links, with `id` anywhere in the query.
static QUERY_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://drive\.google\.com/(?:open|uc)\?(?:[^#]*&)?id=([a-zA-Z0-9_-]+)")
        .expect("Invalid open URL regex")
});

static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid ID regex"));

/// Extract a Drive file ID from a share URL or validate a raw ID.
///
/// Supports:
/// - `https://drive.google.com/file/d/<ID>/view`
/// - `https://docs.google.com/document/d/<ID>/edit` (also spreadsheets, presentation, forms)
/// - `https://drive.google.com/open?id=<ID>` and `https://drive.google.com/uc?id=<ID>`
/// - Raw ID string
///
/// # Examples
///
/// ```
/// use gdrive_mcp::url_parser::extract_file_id;
///
/// let id = extract_file_id("https://drive.google.com/file/d/1abc123/view").unwrap();
/// assert_eq!(id, "1abc123");
///
/// let id = extract_file_id("1abc123").unwrap();
/// assert_eq!(id, "1abc123");
/// ```
pub fn extract_file_id(url_or_id: &str) -> Result<String> {
    let trimmed = url_or_id.trim();

    for regex in [&*FILE_URL_REGEX, &*DOCS_URL_REGEX, &*QUERY_ID_REGEX] {
        if let Some(id) = regex.captures(trimmed).and_then(|c| c.get(1)) {
            return Ok(id.as_str().to_string());
        }
    }

    if ID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(Error::InvalidUrlOrId(url_or_id.to_string()))
}
