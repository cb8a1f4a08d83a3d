//! # GitHub App
//!
//! Issues installation access tokens by authenticating as a GitHub App.
//!
//! Each request signs a short-lived RS256 app JWT and exchanges it at
//! `POST /app/installations/{id}/access_tokens` for a token scoped to the
//! requested permissions and repositories.

use super::{Credential, CredentialError, CredentialRequest, CredentialSource};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::constants::MANAGER_NAME;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backdate `iat` to tolerate clock drift against GitHub
const JWT_BACKDATE_SECS: i64 = 60;

/// GitHub rejects app JWTs valid for more than 10 minutes
const JWT_LIFETIME_SECS: i64 = 9 * 60;

const GITHUB_API_VERSION: &str = "2022-11-28";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Serialize)]
struct AccessTokenRequest {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    permissions: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    repositories: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    repository_ids: Vec<i64>,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
}

/// Credential source backed by a GitHub App
pub struct GitHubApp {
    app_id: i64,
    default_installation_id: Option<i64>,
    encoding_key: EncodingKey,
    api_url: String,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for GitHubApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubApp")
            .field("app_id", &self.app_id)
            .field("default_installation_id", &self.default_installation_id)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl GitHubApp {
    /// Create a GitHub App client from a PEM encoded RSA private key
    pub fn new(
        app_id: i64,
        default_installation_id: Option<i64>,
        private_key_pem: &[u8],
        api_url: &str,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .context("GitHub App private key is not a valid RSA PEM key")?;

        let http = reqwest::Client::builder()
            .user_agent(MANAGER_NAME)
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self {
            app_id,
            default_installation_id: default_installation_id.filter(|id| *id != 0),
            encoding_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
            clock: Arc::new(SystemClock),
        })
    }

    /// Create a GitHub App client from operator configuration
    pub fn from_config(config: &AppConfig, api_url: &str) -> Result<Self> {
        let key = config
            .private_key_pem()
            .context("Failed to load GitHub App private key")?;
        Self::new(config.app_id, config.installation_id, &key, api_url)
    }

    /// Replace the clock used to stamp app JWTs
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn app_id(&self) -> i64 {
        self.app_id
    }

    fn app_jwt(&self) -> Result<String, CredentialError> {
        let now = self.clock.now().timestamp();
        let claims = AppClaims {
            iat: now - JWT_BACKDATE_SECS,
            exp: now + JWT_LIFETIME_SECS,
            iss: self.app_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| CredentialError::Signing(e.to_string()))
    }

    fn resolve_installation(&self, request: &CredentialRequest) -> Result<i64, CredentialError> {
        request
            .installation_id
            .filter(|id| *id != 0)
            .or(self.default_installation_id)
            .ok_or(CredentialError::MissingInstallation)
    }
}

#[async_trait]
impl CredentialSource for GitHubApp {
    async fn issue(&self, request: &CredentialRequest) -> Result<Credential, CredentialError> {
        let installation_id = self.resolve_installation(request)?;
        let jwt = self.app_jwt()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation_id
        );

        let body = AccessTokenRequest {
            permissions: request.permissions.clone(),
            repositories: request.repositories.clone(),
            repository_ids: request.repository_ids.clone(),
        };

        debug!(
            installation_id = installation_id,
            permissions = body.permissions.len(),
            repositories = body.repositories.len() + body.repository_ids.len(),
            "Requesting installation access token"
        );

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {jwt}"))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            let error = classify_response(status, &headers, &text);
            warn!(
                installation_id = installation_id,
                status = status.as_u16(),
                transient = error.is_transient(),
                "GitHub refused installation access token: {}",
                error
            );
            return Err(error);
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        info!(
            installation_id = installation_id,
            expires_at = %token.expires_at,
            "Issued installation access token"
        );

        Ok(Credential::new(token.token, token.expires_at))
    }
}

fn classify_send_error(error: reqwest::Error) -> CredentialError {
    if error.is_builder() {
        CredentialError::InvalidRequest(error.to_string())
    } else {
        CredentialError::Transient(error.to_string())
    }
}

fn is_rate_limited(headers: &HeaderMap, message: &str) -> bool {
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    exhausted
        || headers.contains_key("retry-after")
        || message.to_lowercase().contains("rate limit")
}

fn classify_response(status: StatusCode, headers: &HeaderMap, body: &str) -> CredentialError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());
    let detail = format!("HTTP {}: {}", status.as_u16(), message);

    match status {
        StatusCode::TOO_MANY_REQUESTS => CredentialError::Transient(detail),
        StatusCode::FORBIDDEN if is_rate_limited(headers, &message) => {
            CredentialError::Transient(detail)
        }
        s if s.is_server_error() => CredentialError::Transient(detail),
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::UNPROCESSABLE_ENTITY => CredentialError::Auth(detail),
        _ => CredentialError::InvalidResponse(detail),
    }
}
