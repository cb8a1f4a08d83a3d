//! # Custom Resource Definitions
//!
//! `Token` (namespaced) and `ClusterToken` (cluster-scoped) describe a GitHub
//! App installation access token to be issued and kept fresh in a managed
//! Kubernetes Secret. Both kinds share the same status block.

mod cluster_token;
mod permissions;
mod status;
mod token;

pub use cluster_token::{ClusterToken, ClusterTokenSecretSpec, ClusterTokenSpec};
pub use permissions::{PermissionLevel, Permissions};
pub use status::{
    Condition, ConditionStatus, Conditions, InstallationAccessToken, ManagedSecretRef,
    TokenStatus,
};
pub use token::{Token, TokenSecretSpec, TokenSpec};

use crate::constants::{DEFAULT_REFRESH_INTERVAL, DEFAULT_RETRY_INTERVAL};

pub(crate) fn default_refresh_interval() -> String {
    DEFAULT_REFRESH_INTERVAL.to_string()
}

pub(crate) fn default_retry_interval() -> String {
    DEFAULT_RETRY_INTERVAL.to_string()
}
