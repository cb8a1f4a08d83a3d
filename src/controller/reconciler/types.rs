//! # Types
//!
//! Shared context and error type for the reconcile entry points.

use super::reconcile::backoff_key;
use super::store::ObjectKey;
use super::token_secret::{EngineSettings, TokenSecretError};
use crate::clock::{Clock, SystemClock};
use crate::config::ControllerConfig;
use crate::controller::backoff::ErrorBackoff;
use crate::credential::CredentialSource;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] TokenSecretError),
}

impl ReconcilerError {
    /// Metric label of the underlying failure
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            ReconcilerError::ReconciliationFailed(e) => e.class(),
        }
    }
}

/// Context shared by every reconcile of every owner kind
#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    pub credentials: Arc<dyn CredentialSource>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ControllerConfig>,
    // Error backoff per owner, keyed by kind and object key
    pub backoff_states: Arc<Mutex<HashMap<String, ErrorBackoff>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        client: Client,
        credentials: Arc<dyn CredentialSource>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            client,
            credentials,
            clock: Arc::new(SystemClock),
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            timeout: self.config.reconcile_timeout(),
            status_conflict_retries: self.config.status_conflict_retries,
        }
    }

    /// A fresh backoff with the configured bounds
    #[must_use]
    pub fn new_backoff(&self) -> ErrorBackoff {
        ErrorBackoff::new(
            self.config.backoff_start_duration(),
            self.config.backoff_max_duration(),
        )
    }

    /// Forget the error history of an owner after a successful reconcile
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }

    /// Drop the backoff state of an owner that no longer exists
    pub fn forget_owner(&self, kind: &str, key: &ObjectKey) {
        self.reset_backoff(&backoff_key(kind, key));
    }
}
