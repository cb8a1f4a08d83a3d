//! # Credential Source
//!
//! Trait for anything able to exchange an identity and a requested scope for
//! a short-lived credential, plus the GitHub App implementation.
//!
//! Failures are split into two classes:
//! - **transient** - expected to clear on their own (rate limiting, network
//!   blips, upstream 5xx); the caller retries on its own schedule
//! - **fatal** - need operator action (bad key, unknown installation,
//!   permissions the App does not hold)

pub mod github;

pub use github::GitHubApp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::constants::FIXED_CREDENTIAL_VALIDITY;

/// Short-lived credential issued by a [`CredentialSource`]
///
/// The token is wiped from memory when the credential is dropped.
#[derive(Clone)]
pub struct Credential {
    token: Zeroizing<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from its expiry
    ///
    /// The issue time is derived as `expires_at - FIXED_CREDENTIAL_VALIDITY`
    /// rather than taken from the local clock.
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
            created_at: created_at_for(expires_at),
            expires_at,
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"***")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Issue time implied by an expiry under the fixed validity window
#[must_use]
pub fn created_at_for(expires_at: DateTime<Utc>) -> DateTime<Utc> {
    let validity = chrono::Duration::from_std(FIXED_CREDENTIAL_VALIDITY)
        .unwrap_or_else(|_| chrono::Duration::hours(1));
    expires_at - validity
}

/// What the caller wants the credential to be good for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialRequest {
    /// Installation override; `None` falls back to the source's default
    pub installation_id: Option<i64>,
    /// Permission name to access level
    pub permissions: BTreeMap<String, String>,
    pub repositories: Vec<String>,
    pub repository_ids: Vec<i64>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    /// Retryable: rate limiting, network errors, upstream outages
    #[error("transient failure issuing installation token: {0}")]
    Transient(String),
    /// GitHub rejected the request (bad key, unknown installation, scope not granted)
    #[error("GitHub rejected installation token request: {0}")]
    Auth(String),
    #[error("no installation ID configured for this token and no operator default is set")]
    MissingInstallation,
    #[error("invalid installation token request: {0}")]
    InvalidRequest(String),
    #[error("unexpected response from GitHub: {0}")]
    InvalidResponse(String),
    #[error("failed to sign GitHub App JWT: {0}")]
    Signing(String),
}

impl CredentialError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, CredentialError::Transient(_))
    }

    /// Short label used for metrics
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            CredentialError::Transient(_) => "transient",
            CredentialError::Auth(_) => "auth",
            CredentialError::MissingInstallation => "missing_installation",
            CredentialError::InvalidRequest(_) => "invalid_request",
            CredentialError::InvalidResponse(_) => "invalid_response",
            CredentialError::Signing(_) => "signing",
        }
    }
}

/// Issues short-lived credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn issue(&self, request: &CredentialRequest) -> Result<Credential, CredentialError>;
}
