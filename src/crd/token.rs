//! # Token
//!
//! Namespaced owner: the managed Secret always lives in the Token's own
//! namespace.

use super::{default_refresh_interval, default_retry_interval, Permissions, TokenStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Token Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: github.as-code.io/v1
/// kind: Token
/// metadata:
///   name: ci-token
///   namespace: builds
/// spec:
///   secret:
///     name: github-ci
///     basicAuth: true
///   refreshInterval: 30m
///   permissions:
///     contents: read
///     metadata: read
///   repositories:
///     - app-config
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "github.as-code.io",
    version = "v1",
    kind = "Token",
    namespaced,
    status = "TokenStatus",
    shortname = "ght",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Secret","type":"string","jsonPath":".status.managedSecret.name"}"#,
    printcolumn = r#"{"name":"Expires","type":"date","jsonPath":".status.installationAccessToken.expiresAt"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TokenSpec {
    /// Placement and shape of the managed Secret
    #[serde(default)]
    pub secret: TokenSecretSpec,
    /// Override the operator's default GitHub App installation
    #[serde(default, rename = "installationID", skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<i64>,
    /// How often to rotate the token (must be below 1h)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
    /// How long to wait after a transient issuing failure
    #[serde(default = "default_retry_interval")]
    pub retry_interval: String,
    /// Permissions requested for the token, as a subset of the App's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    /// Repository names the token is restricted to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<String>,
    /// Repository IDs the token is restricted to
    #[serde(default, rename = "repositoryIDs", skip_serializing_if = "Vec::is_empty")]
    pub repository_ids: Vec<i64>,
}

impl Default for TokenSpec {
    fn default() -> Self {
        Self {
            secret: TokenSecretSpec::default(),
            installation_id: None,
            refresh_interval: default_refresh_interval(),
            retry_interval: default_retry_interval(),
            permissions: None,
            repositories: Vec::new(),
            repository_ids: Vec::new(),
        }
    }
}

/// Managed Secret settings for a `Token`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenSecretSpec {
    /// Secret name, defaults to the Token name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Store `username`/`password` instead of `token`
    #[serde(default)]
    pub basic_auth: bool,
    /// Extra labels for the Secret
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Extra annotations for the Secret
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}
