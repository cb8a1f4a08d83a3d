//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server, GitHub App and client setup
//! - `watch_loop`: one `kube_runtime` controller per owner kind
//! - `error_policy`: per-owner backoff after failures and watch error handling

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
