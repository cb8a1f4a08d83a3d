//! # Controller
//!
//! Core controller modules for the GitHub token manager.
//!
//! - `backoff`: exponential backoff for failed reconciles
//! - `reconciler`: core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
