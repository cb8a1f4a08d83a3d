//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use github_token_manager::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (`Token`, `ClusterToken`, `TokenStatus`, etc.)
//! - The engine and its seams (`Engine`, `ObjectStore`, `CredentialSource`, `Clock`)
//! - Reconciler types (`Reconciler`, `ReconcilerError`)
//! - Config types (`AppConfig`, `ControllerConfig`)

// CRD types - most commonly used
pub use crate::crd::*;

// Engine and seams
pub use crate::clock::{Clock, SystemClock};
pub use crate::controller::reconciler::{
    reconcile, Engine, EngineSettings, KubeStore, ObjectKey, ObjectStore, Reconciler,
    ReconcilerError, StoreError, TokenOwner, TokenSecretError,
};
pub use crate::credential::{
    Credential, CredentialError, CredentialRequest, CredentialSource, GitHubApp,
};

// Config types - for configuration management
pub use crate::config::{AppConfig, ConfigError, ControllerConfig, KeyProvider};
