//! # GitHub Token Manager
//!
//! A Kubernetes controller that keeps short-lived GitHub App installation
//! access tokens in Secrets.
//!
//! ## Overview
//!
//! 1. **Watching owners** - `Token` (namespaced) and `ClusterToken` (cluster-scoped)
//! 2. **Issuing tokens** - signs a GitHub App JWT and exchanges it for an
//!    installation access token scoped by the owner's permissions and repositories
//! 3. **Managing Secrets** - writes the token as `{token}` or
//!    `{username, password}` into a Secret controlled by the owner
//! 4. **Rotating** - replaces the token every `refreshInterval`, well before
//!    its one hour lifetime ends
//!
//! ## Features
//!
//! - **Secret moves**: changing the target name or namespace deletes the old Secret
//! - **Ownership checks**: never overwrites a Secret it does not control
//! - **Prometheus metrics** and **health probes** on `METRICS_PORT`

use anyhow::Result;
use github_token_manager::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.client, init.reconciler, init.server_state).await
}
