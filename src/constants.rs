//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

use std::time::Duration;

/// API group of the `Token` and `ClusterToken` resources
pub const API_GROUP: &str = "github.as-code.io";

/// Name used for field managers, labels and log prefixes
pub const MANAGER_NAME: &str = "github-token-manager";

/// Lifetime of every installation access token issued by GitHub.
///
/// `createdAt` is always derived as `expiresAt - FIXED_CREDENTIAL_VALIDITY`;
/// refresh intervals must stay strictly below this value.
pub const FIXED_CREDENTIAL_VALIDITY: Duration = Duration::from_secs(60 * 60);

/// Secret type tag for `{token}` secrets
pub const SECRET_TYPE_TOKEN: &str = "github.as-code.io/token";

/// Secret type tag for `{username, password}` secrets
pub const SECRET_TYPE_BASIC_AUTH: &str = "github.as-code.io/basic-auth";

/// Username GitHub expects alongside an installation token in basic auth
pub const BASIC_AUTH_USERNAME: &str = "x-access-token";

/// Condition type reported on every owner
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Default refresh interval applied by the CRD schema
pub const DEFAULT_REFRESH_INTERVAL: &str = "30m";

/// Default retry interval applied by the CRD schema
pub const DEFAULT_RETRY_INTERVAL: &str = "5m";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default per-invocation reconcile deadline (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;

/// Default error backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 5_000;

/// Default error backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default number of in-place retries after a status write conflict
pub const DEFAULT_STATUS_CONFLICT_RETRIES: u32 = 3;

/// Default delay before restarting watch stream after it ends or fails (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default concurrent reconciles across all owners
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 1;

/// Default GitHub REST API endpoint
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Default location of the operator configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/config/gtm.yaml";
