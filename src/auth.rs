//! Credential resolution and OAuth2 refresh for Google APIs.

use chrono::{Duration, Utc};
use reqwest::Client;

use crate::credential::{
    Credential, CredentialState, StoredCredential, TokenFormat, TokenSource, EXPIRY_SKEW_SECS,
};
use crate::error::{AuthError, AuthResult, DriveError};
use crate::models::{OAuthErrorResponse, TokenResponse};

/// Google OAuth2 token endpoint.
pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth2 authorization endpoint.
pub const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Read-only Google Drive scope.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Floor for short `expires_in` values, so a fresh token is never inside the expiry skew.
const MIN_EXPIRES_IN: u64 = 2 * EXPIRY_SKEW_SECS as u64;

/// Clamp for absurd `expires_in` values.
const MAX_EXPIRES_IN: u64 = 365 * 24 * 3600;

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The stored credential was already valid and is returned unchanged.
    Loaded(Credential),
    /// The stored credential was expired and has been refreshed.
    Refreshed(Credential),
}

impl Resolution {
    pub fn credential(&self) -> &Credential {
        match self {
            Resolution::Loaded(c) | Resolution::Refreshed(c) => c,
        }
    }

    pub fn into_credential(self) -> Credential {
        match self {
            Resolution::Loaded(c) | Resolution::Refreshed(c) => c,
        }
    }

    pub fn is_refreshed(&self) -> bool {
        matches!(self, Resolution::Refreshed(_))
    }
}

/// Loads, validates and refreshes user credentials.
///
/// The resolver never writes the refreshed credential back; callers decide
/// whether to persist a [`Resolution::Refreshed`] value.
#[derive(Clone)]
pub struct CredentialResolver {
    client: Client,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialResolver {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Load the credential at `source` and make sure it is usable.
    pub async fn resolve(&self, source: &TokenSource) -> AuthResult<Resolution> {
        Ok(self.resolve_stored(source).await?.0)
    }

    /// Like [`resolve`](Self::resolve), also reporting the format the file was read in.
    pub async fn resolve_stored(&self, source: &TokenSource) -> AuthResult<(Resolution, TokenFormat)> {
        let StoredCredential { credential, format } = source.load()?;
        let resolution = self.ensure_fresh(credential).await?;
        Ok((resolution, format))
    }

    /// Return the credential as-is when valid, otherwise refresh it if possible.
    pub async fn ensure_fresh(&self, credential: Credential) -> AuthResult<Resolution> {
        match credential.state() {
            CredentialState::Valid => Ok(Resolution::Loaded(credential)),
            CredentialState::ExpiredRefreshable => {
                let refreshed = self.refresh(&credential).await?;
                Ok(Resolution::Refreshed(refreshed))
            }
            CredentialState::ExpiredUnrefreshable => {
                let reason = if credential.access_token.is_none() {
                    "no access token and no refresh token"
                } else if credential.refresh_token.is_none() {
                    "access token expired and no refresh token is available"
                } else {
                    "access token expired and the client id or secret is missing"
                };
                Err(AuthError::Invalid {
                    reason: reason.to_string(),
                })
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Makes exactly one request to the credential's token endpoint.
    pub async fn refresh(&self, credential: &Credential) -> AuthResult<Credential> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            credential.refresh_token.as_deref(),
            credential.client_id.as_deref(),
            credential.client_secret.as_deref(),
        ) else {
            return Err(AuthError::Invalid {
                reason: "credential cannot be refreshed".to_string(),
            });
        };

        tracing::info!(token_uri = %credential.token_uri, "refreshing expired access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];

        let token_response = request_token(&self.client, &credential.token_uri, &params)
            .await
            .map_err(|source| {
                tracing::warn!(error = %source, "token refresh failed");
                AuthError::RefreshFailed { source }
            })?;

        let mut refreshed = credential.clone();
        refreshed.access_token = Some(token_response.access_token);
        refreshed.expiry = Some(expiry_from(token_response.expires_in));

        Ok(refreshed)
    }
}

pub(crate) fn expiry_from(expires_in: Option<u64>) -> chrono::DateTime<Utc> {
    let secs = expires_in
        .unwrap_or(DEFAULT_EXPIRES_IN)
        .clamp(MIN_EXPIRES_IN, MAX_EXPIRES_IN);
    Utc::now() + Duration::seconds(secs as i64)
}

/// POST a form to an OAuth2 token endpoint and decode the token response.
pub(crate) async fn request_token(
    client: &Client,
    token_uri: &str,
    params: &[(&str, &str)],
) -> Result<TokenResponse, DriveError> {
    let response = client.post(token_uri).form(params).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<OAuthErrorResponse>(&body) {
            Ok(err) => match err.error_description {
                Some(description) => format!("{}: {}", err.error, description),
                None => err.error,
            },
            Err(_) => body,
        };
        return Err(DriveError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_valid_credential_returned_unchanged() {
        let credential = Credential::new("access", Some(Utc::now() + Duration::hours(1)));
        let resolution = CredentialResolver::new()
            .ensure_fresh(credential.clone())
            .await
            .unwrap();

        assert!(!resolution.is_refreshed());
        assert_eq!(resolution.into_credential(), credential);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_is_invalid() {
        let credential = Credential::new("access", Some(Utc::now() - Duration::hours(1)));
        let err = CredentialResolver::new()
            .ensure_fresh(credential)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Invalid { .. }));
    }

    #[test]
    fn test_expiry_from_defaults_to_one_hour() {
        let expiry = expiry_from(None);
        let remaining = expiry - Utc::now();
        assert!(remaining > Duration::minutes(59));
        assert!(remaining <= Duration::hours(1));
    }

    #[test]
    fn test_expiry_from_short_lifetime_is_still_valid() {
        let mut credential = Credential::new("access", None);
        credential.expiry = Some(expiry_from(Some(0)));
        assert!(credential.is_valid());

        credential.expiry = Some(expiry_from(Some(30)));
        assert!(credential.is_valid());
    }
}
