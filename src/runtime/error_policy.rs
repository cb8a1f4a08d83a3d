//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loops.
//! This module handles reconciliation errors and logs controller stream errors.

use crate::controller::reconciler::{
    owner_key, ObjectKey, Reconciler, ReconcilerError, TokenOwner,
};
use crate::observability::metrics;
use kube_runtime::controller::{self, Action};
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};

/// Handle reconciliation errors with per-owner exponential backoff
///
/// Backoff state is tracked per owner so one failing resource does not slow
/// down the others. A successful reconcile clears it.
pub fn handle_reconciliation_error<O: TokenOwner>(
    owner: Arc<O>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let kind = O::kind_name();
    let key = owner_key(owner.as_ref());

    error!("Reconciliation error for {}: {}", key, error);
    metrics::increment_reconciliation_errors(&kind, error.class());

    let (delay, failures) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(key.clone())
                .or_insert_with(|| ctx.new_backoff());
            let delay = state.next_backoff();
            (delay, state.failures())
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (ctx.config.backoff_start_duration(), 0)
        }
    };

    info!(
        "Retrying {} in {:?} (consecutive failures: {})",
        key, delay, failures
    );

    metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Errors surfaced on a controller's output stream
pub type ControllerError = controller::Error<ReconcilerError, watcher::Error>;

/// Log an error from the controller stream and return the level it was logged at
///
/// Nothing here pauses the stream. Reconciler failures were already logged
/// and requeued by [`handle_reconciliation_error`], and the trigger watches
/// retry on their own backoff.
pub fn log_controller_error(kind: &str, error: &ControllerError) -> Level {
    match error {
        controller::Error::ReconcilerFailed(_, object) => {
            debug!("{} reconcile of {} failed, requeued by error policy", kind, object);
            Level::DEBUG
        }
        controller::Error::ObjectNotFound(object) => {
            debug!("{} {} is no longer in the cache", kind, object);
            Level::DEBUG
        }
        controller::Error::QueueError(e) => classify_watch_error(kind, &e.to_string()),
        controller::Error::RunnerError(e) => {
            error!("{} controller runner error: {}", kind, e);
            Level::ERROR
        }
    }
}

/// Owner the controller tried to reconcile after it left the cache
#[must_use]
pub fn missing_owner(error: &ControllerError) -> Option<ObjectKey> {
    match error {
        controller::Error::ObjectNotFound(object) => Some(ObjectKey {
            namespace: object.namespace.clone(),
            name: object.name.clone(),
        }),
        _ => None,
    }
}

/// Log a watch failure by cause
fn classify_watch_error(kind: &str, error_string: &str) -> Level {
    let is_not_found = error_string.contains("404") || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired");

    if is_401 {
        error!(
            "{} watch authentication failed (401 Unauthorized), RBAC may have been revoked or token expired",
            kind
        );
        Level::ERROR
    } else if is_410 {
        debug!("{} watch resource version expired (410), watch will restart", kind);
        Level::DEBUG
    } else if is_not_found {
        warn!(
            "{} watch target not found (404), the CRD may be missing: {}",
            kind, error_string
        );
        Level::WARN
    } else {
        warn!("{} watch error: {}", kind, error_string);
        Level::WARN
    }
}
