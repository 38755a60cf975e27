//! Persisted credential material and the token file it lives in.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bincode::Options;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::TOKEN_URI;
use crate::error::{AuthError, AuthResult};
use crate::models::AuthorizedUserFile;

/// Default token file name.
pub const DEFAULT_TOKEN_FILE: &str = "tokens.json";

/// Tokens this close to expiry are treated as expired.
pub(crate) const EXPIRY_SKEW_SECS: i64 = 60;

/// Upper bound on the binary form, so garbage length prefixes cannot allocate.
const MAX_BINARY_TOKEN_LEN: u64 = 64 * 1024;

/// OAuth2 user credential for the Drive API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub token_uri: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Unmodelled token-file fields, carried through to the JSON form only.
    #[serde(skip)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Where a credential stands with respect to use and refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Valid,
    ExpiredRefreshable,
    ExpiredUnrefreshable,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: None,
            expiry,
            scopes: Vec::new(),
            token_uri: TOKEN_URI.to_string(),
            client_id: None,
            client_secret: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// No expiry means the provider never told us one; such tokens are used until rejected.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now + Duration::seconds(EXPIRY_SKEW_SECS),
            None => false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty()) && !self.is_expired()
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.client_id.is_some()
            && self.client_secret.is_some()
    }

    pub fn state(&self) -> CredentialState {
        if self.is_valid() {
            CredentialState::Valid
        } else if self.can_refresh() {
            CredentialState::ExpiredRefreshable
        } else {
            CredentialState::ExpiredUnrefreshable
        }
    }

    /// Bearer token for API calls. Empty when the credential was never issued one.
    pub fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl From<AuthorizedUserFile> for Credential {
    fn from(file: AuthorizedUserFile) -> Self {
        Self {
            access_token: file.token,
            refresh_token: file.refresh_token,
            expiry: file.expiry,
            scopes: file.scopes,
            token_uri: file.token_uri.unwrap_or_else(|| TOKEN_URI.to_string()),
            client_id: file.client_id,
            client_secret: file.client_secret,
            extra: file.extra,
        }
    }
}

impl From<&Credential> for AuthorizedUserFile {
    fn from(credential: &Credential) -> Self {
        Self {
            token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            token_uri: Some(credential.token_uri.clone()),
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
            scopes: credential.scopes.clone(),
            expiry: credential.expiry,
            extra: credential.extra.clone(),
        }
    }
}

/// Serialization form of a token file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    /// Google authorized-user JSON.
    Json,
    /// bincode encoding of [`Credential`].
    Binary,
}

impl TokenFormat {
    /// Format implied by a path's extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(TokenFormat::Json),
            "bin" => Some(TokenFormat::Binary),
            _ => None,
        }
    }

    fn decode(self, bytes: &[u8]) -> Result<Credential, String> {
        match self {
            TokenFormat::Json => serde_json::from_slice::<AuthorizedUserFile>(bytes)
                .map(Credential::from)
                .map_err(|e| format!("json: {}", e)),
            TokenFormat::Binary => bincode_options()
                .deserialize::<Credential>(bytes)
                .map_err(|e| format!("binary: {}", e)),
        }
    }

    fn encode(self, credential: &Credential) -> Result<Vec<u8>, String> {
        match self {
            TokenFormat::Json => {
                serde_json::to_vec_pretty(&AuthorizedUserFile::from(credential))
                    .map_err(|e| e.to_string())
            }
            TokenFormat::Binary => bincode_options()
                .serialize(credential)
                .map_err(|e| e.to_string()),
        }
    }
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_BINARY_TOKEN_LEN)
}

/// A credential read from disk, with the format it was found in.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub credential: Credential,
    pub format: TokenFormat,
}

/// Location of the persisted credential.
#[derive(Debug, Clone)]
pub struct TokenSource {
    path: PathBuf,
    format: Option<TokenFormat>,
}

impl TokenSource {
    /// Source whose format is taken from the file extension, or inferred on load.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = TokenFormat::from_path(&path);
        Self { path, format }
    }

    pub fn with_format<P: AsRef<Path>>(path: P, format: TokenFormat) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            format: Some(format),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_hint(&self) -> Option<TokenFormat> {
        self.format
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and decode the token file.
    ///
    /// With no format hint, JSON is tried first and binary second.
    pub fn load(&self) -> AuthResult<StoredCredential> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AuthError::NotConfigured {
                    path: self.path.clone(),
                })
            }
            Err(e) => {
                return Err(AuthError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let attempts: &[TokenFormat] = match self.format {
            Some(TokenFormat::Json) => &[TokenFormat::Json],
            Some(TokenFormat::Binary) => &[TokenFormat::Binary],
            None => &[TokenFormat::Json, TokenFormat::Binary],
        };

        let mut failures = Vec::with_capacity(attempts.len());
        for &format in attempts {
            match format.decode(&bytes) {
                Ok(credential) => {
                    tracing::debug!(path = %self.path.display(), ?format, "loaded token file");
                    return Ok(StoredCredential { credential, format });
                }
                Err(e) => failures.push(e),
            }
        }

        Err(AuthError::CorruptToken {
            path: self.path.clone(),
            details: failures.join("; "),
        })
    }

    /// Write a credential back in the given format.
    pub fn save(&self, credential: &Credential, format: TokenFormat) -> AuthResult<()> {
        let bytes = format.encode(credential).map_err(|e| AuthError::Io {
            path: self.path.clone(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| AuthError::Io {
                    path: self.path.clone(),
                    source: e,
                })?;
            }
        }

        fs::write(&self.path, bytes).map_err(|e| AuthError::Io {
            path: self.path.clone(),
            source: e,
        })?;

        tracing::debug!(path = %self.path.display(), ?format, "saved token file");
        Ok(())
    }
}
