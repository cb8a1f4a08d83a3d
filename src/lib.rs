//! GitHub Token Manager Library
//!
//! Issues GitHub App installation access tokens into Kubernetes Secrets owned
//! by `Token` and `ClusterToken` resources, and rotates them before they
//! expire.
//!
//! ## Quick Start
//!
//! ```rust
//! use github_token_manager::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod clock;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod credential;
pub mod observability;
pub mod prelude;
pub mod runtime;
