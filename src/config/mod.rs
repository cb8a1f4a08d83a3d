//! # Configuration
//!
//! - [`ControllerConfig`]: runtime tuning (ports, logging, concurrency,
//!   deadlines, backoff) read from environment variables
//! - [`AppConfig`]: the GitHub App identity read from the operator config
//!   file and environment

pub mod app;
pub mod controller;

pub use app::{AppConfig, ConfigError, KeyProvider};
pub use controller::ControllerConfig;
