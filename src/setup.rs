//! Interactive OAuth2 setup that writes the token file.
//!
//! Runs Google's installed-app flow: a loopback listener receives the
//! authorization code, which is exchanged for tokens at the token endpoint.

use std::fs;
use std::path::Path;

use reqwest::{Client, Url};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::auth::{expiry_from, request_token, CredentialResolver, DRIVE_READONLY_SCOPE};
use crate::credential::{Credential, CredentialState, TokenFormat, TokenSource};
use crate::error::{AuthError, Result, SetupError};
use crate::models::{ClientSecrets, ClientSecretsFile};

const SUCCESS_PAGE: &str = "<html><body><h3>Authorization complete.</h3><p>You may close this window.</p></body></html>";

/// Load OAuth client secrets from a Google Cloud console download.
pub fn load_client_secrets<P: AsRef<Path>>(path: P) -> Result<ClientSecrets> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| SetupError::SecretsFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file: ClientSecretsFile =
        serde_json::from_str(&content).map_err(|e| SetupError::SecretsFormat(e.to_string()))?;

    Ok(file.installed.or(file.web).ok_or_else(|| {
        SetupError::SecretsFormat("expected an \"installed\" or \"web\" client section".to_string())
    })?)
}

/// Consent page URL for the installed-app flow.
pub fn authorization_url(secrets: &ClientSecrets, redirect_uri: &str, state: &str) -> Result<Url> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", DRIVE_READONLY_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|e| SetupError::SecretsFormat(format!("invalid auth_uri: {}", e)).into())
}

/// Pull the authorization code out of the redirect's request line
/// (`GET /?state=...&code=... HTTP/1.1`), checking `state`.
pub fn parse_callback(request_line: &str, expected_state: &str) -> Result<String> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| SetupError::Callback("malformed request line".to_string()))?;
    let url = Url::parse("http://localhost")
        .and_then(|base| base.join(target))
        .map_err(|e| SetupError::Callback(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(SetupError::Callback(format!("authorization denied: {}", error)).into());
    }
    if state.as_deref() != Some(expected_state) {
        return Err(SetupError::Callback("state mismatch".to_string()).into());
    }
    Ok(code.ok_or_else(|| SetupError::Callback("no authorization code".to_string()))?)
}

/// Exchange an authorization code for a credential.
pub async fn exchange_code(
    http: &Client,
    secrets: &ClientSecrets,
    code: &str,
    redirect_uri: &str,
) -> Result<Credential> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("redirect_uri", redirect_uri),
    ];

    let token = request_token(http, &secrets.token_uri, &params)
        .await
        .map_err(SetupError::Exchange)?;

    let scopes = match token.scope {
        Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
        None => vec![DRIVE_READONLY_SCOPE.to_string()],
    };

    Ok(Credential {
        access_token: Some(token.access_token),
        refresh_token: token.refresh_token,
        expiry: Some(expiry_from(token.expires_in)),
        scopes,
        token_uri: secrets.token_uri.clone(),
        client_id: Some(secrets.client_id.clone()),
        client_secret: Some(secrets.client_secret.clone()),
        extra: Default::default(),
    })
}

/// Run the full loopback flow and return the new credential.
pub async fn run_installed_flow(http: &Client, secrets: &ClientSecrets) -> Result<Credential> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(SetupError::Listener)?;
    let port = listener.local_addr().map_err(SetupError::Listener)?.port();
    let redirect_uri = format!("http://localhost:{}/", port);
    let state = uuid::Uuid::new_v4().simple().to_string();

    let url = authorization_url(secrets, &redirect_uri, &state)?;
    eprintln!("Please visit this URL to authorize this application:\n{}", url);
    if let Err(e) = open::that(url.as_str()) {
        tracing::debug!(error = %e, "could not open browser");
    }

    let (stream, _) = listener.accept().await.map_err(SetupError::Listener)?;
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .map_err(SetupError::Listener)?;

    let outcome = parse_callback(&request_line, &state);

    let body = match &outcome {
        Ok(_) => SUCCESS_PAGE.to_string(),
        Err(e) => format!("<html><body><h3>Authorization failed.</h3><p>{}</p></body></html>", e),
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let mut stream = reader.into_inner();
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!(error = %e, "failed to answer redirect");
    }
    let _ = stream.shutdown().await;

    let code = outcome?;
    exchange_code(http, secrets, &code, &redirect_uri).await
}

/// Make sure the token file holds a usable credential.
///
/// A stored credential that is valid is kept; an expired refreshable one is
/// refreshed. Anything else starts the browser flow.
pub async fn setup(credentials_path: &Path, source: &TokenSource) -> Result<()> {
    let resolver = CredentialResolver::new();

    let existing = match source.load() {
        Ok(stored) => Some(stored),
        Err(AuthError::NotConfigured { .. }) => None,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable token file");
            None
        }
    };

    if let Some(stored) = existing {
        match stored.credential.state() {
            CredentialState::Valid => {
                eprintln!("Token file {} is already valid.", source.path().display());
                return Ok(());
            }
            CredentialState::ExpiredRefreshable => match resolver.refresh(&stored.credential).await {
                Ok(credential) => {
                    source.save(&credential, stored.format)?;
                    eprintln!("Refreshed token saved to {}.", source.path().display());
                    return Ok(());
                }
                Err(e) => tracing::warn!(error = %e, "refresh failed; starting authorization"),
            },
            CredentialState::ExpiredUnrefreshable => {}
        }
    }

    let secrets = load_client_secrets(credentials_path)?;
    let credential = run_installed_flow(&Client::new(), &secrets).await?;

    let format = source.format_hint().unwrap_or(TokenFormat::Json);
    source.save(&credential, format)?;
    eprintln!("Token saved to {}.", source.path().display());
    Ok(())
}
