//! # Observability
//!
//! Prometheus metrics and tracing subscriber setup.
//!
//! - `metrics`: Prometheus metrics collection
//! - `logging`: `tracing-subscriber` initialization

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
