//! # Reconciler
//!
//! Core reconciliation logic for `Token` and `ClusterToken` resources.
//!
//! The reconciler:
//! - Watches `Token` and `ClusterToken` resources and the Secrets they own
//! - Requests installation access tokens from the GitHub App
//! - Creates, rotates, moves and reshapes the managed Secret
//! - Reports progress on the owner's `Ready` condition
//!
//! ## Reconciliation Flow
//!
//! 1. Load the owner (stop silently if it is gone)
//! 2. Initialize the `Ready` condition and validate intervals
//! 3. Remove a previously managed Secret the spec no longer points at
//! 4. Create the Secret, or rotate its token once the refresh interval elapsed
//! 5. Requeue for the next refresh (or the retry interval after a transient failure)

pub mod owner;
pub mod reconcile;
pub mod secret;
pub mod status;
pub mod store;
pub mod token_secret;
pub mod types;
pub mod validation;

// Re-export public API
pub use owner::TokenOwner;
pub use reconcile::{backoff_key, owner_key, reconcile};
pub use status::StatusChange;
pub use store::{KubeStore, ObjectKey, ObjectStore, StoreError};
pub use token_secret::{Engine, EngineSettings, TokenSecretError};
pub use types::{Reconciler, ReconcilerError};
pub use validation::{parse_duration, token_policy, SpecError, TokenPolicy};
