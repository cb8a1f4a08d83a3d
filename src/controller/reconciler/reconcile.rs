//! # Reconcile Entry Point
//!
//! Glue between the `kube_runtime` controller and the engine: one call per
//! dispatched owner, for either owner kind.

use super::owner::TokenOwner;
use super::store::{KubeStore, ObjectKey};
use super::token_secret::Engine;
use super::types::{Reconciler, ReconcilerError};
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, Instrument};

/// Key used for per-owner bookkeeping (error backoff)
pub fn owner_key<O: TokenOwner>(owner: &O) -> String {
    backoff_key(&O::kind_name(), &owner.key())
}

pub fn backoff_key(kind: &str, key: &ObjectKey) -> String {
    format!("{kind}/{key}")
}

/// Reconcile one owner of kind `O`
///
/// Errors are handled by the error policy, which applies per-owner backoff.
pub async fn reconcile<O: TokenOwner>(
    owner: Arc<O>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let kind = O::kind_name();
    let key = owner.key();
    let span = tracing::span!(
        tracing::Level::INFO,
        "reconcile",
        resource.kind = kind.as_str(),
        resource.namespace = key.namespace.as_deref().unwrap_or(""),
        resource.name = key.name.as_str(),
        resource.generation = owner.meta().generation.unwrap_or(0),
    );

    async move {
        let start = Instant::now();
        metrics::increment_reconciliations(&kind);

        let engine: Engine<O> = Engine::new(
            Arc::new(KubeStore::<O>::new(ctx.client.clone())),
            Arc::clone(&ctx.credentials),
            Arc::clone(&ctx.clock),
            ctx.engine_settings(),
        );
        let result = engine.reconcile(&key).await;
        metrics::observe_reconciliation_duration(&kind, start.elapsed().as_secs_f64());

        match result {
            Ok(Some(after)) => {
                ctx.reset_backoff(&owner_key(owner.as_ref()));
                debug!("Requeue in {:?}", after);
                metrics::increment_requeues_total("scheduled");
                Ok(Action::requeue(after))
            }
            Ok(None) => {
                debug!("{} {} is gone, dropping its backoff state", kind, key);
                ctx.forget_owner(&kind, &key);
                Ok(Action::await_change())
            }
            Err(e) => {
                error!("Reconciliation of {} {} failed: {}", kind, key, e);
                Err(e.into())
            }
        }
    }
    .instrument(span)
    .await
}
