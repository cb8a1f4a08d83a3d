//! # Watch Loop
//!
//! Controller watch loops for `Token` and `ClusterToken` resources.
//!
//! Each owner kind gets its own `kube_runtime` controller that also watches
//! the Secrets carrying the manager's `part-of` label, so deleting or editing
//! a managed Secret re-dispatches its owner. Secrets are mapped back through
//! their controller owner reference rather than `owns`, which would look the
//! owner up in the Secret's namespace and never find a `ClusterToken`.
//!
//! Errors on the controller stream are logged and never pause it. Both loops
//! restart after the configured delay only if their stream ends, and stop on
//! SIGINT/SIGTERM.

use crate::constants::MANAGER_NAME;
use crate::controller::reconciler::{reconcile, Reconciler, TokenOwner};
use crate::controller::server::ServerState;
use crate::crd::{ClusterToken, Token};
use crate::runtime::error_policy::{
    handle_reconciliation_error, log_controller_error, missing_owner,
};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{controller, watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Label selector matching every Secret written by this manager
#[must_use]
pub fn managed_secret_selector() -> String {
    format!("app.kubernetes.io/part-of={MANAGER_NAME}")
}

/// Owners of kind `O` that control `secret`
///
/// Only controller owner references count; the owner's namespace is resolved
/// by [`TokenOwner::dispatch_ref`] so cluster-scoped owners map correctly.
#[must_use]
pub fn secret_owners<O: TokenOwner>(secret: &Secret) -> Vec<ObjectRef<O>> {
    let kind = O::kind(&());
    let api_version = O::api_version(&());
    let namespace = secret.metadata.namespace.as_deref();
    secret
        .metadata
        .owner_references
        .iter()
        .flatten()
        .filter(|r| r.controller == Some(true) && r.kind == kind && r.api_version == api_version)
        .map(|r| O::dispatch_ref(&r.name, namespace))
        .collect()
}

/// Run both controllers until shutdown
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    futures::future::join(
        run_controller::<Token>(
            client.clone(),
            Arc::clone(&reconciler),
            Arc::clone(&server_state),
        ),
        run_controller::<ClusterToken>(client, reconciler, server_state),
    )
    .await;

    info!("Controller stopped gracefully");
    Ok(())
}

async fn run_controller<O: TokenOwner>(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) {
    let kind = O::kind_name();
    let restart_delay = reconciler.config.watch_restart_delay_duration();
    let concurrency = reconciler.config.max_concurrent_reconciles;

    loop {
        if !server_state.ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        info!("Starting {} controller (concurrency {})", kind, concurrency);
        let owners: Api<O> = Api::all(client.clone());
        let secrets: Api<Secret> = Api::all(client.clone());

        Controller::new(owners, watcher::Config::default().any_semantic())
            .watches(
                secrets,
                watcher::Config::default().labels(&managed_secret_selector()),
                |secret: Secret| secret_owners::<O>(&secret),
            )
            .with_config(controller::Config::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(
                reconcile::<O>,
                handle_reconciliation_error::<O>,
                Arc::clone(&reconciler),
            )
            .for_each(|result| {
                match result {
                    Ok((object, action)) => {
                        debug!("Reconciled {}: {:?}", object, action);
                    }
                    Err(e) => {
                        log_controller_error(&kind, &e);
                        if let Some(key) = missing_owner(&e) {
                            reconciler.forget_owner(&kind, &key);
                        }
                    }
                }
                futures::future::ready(())
            })
            .await;

        if !server_state.ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        warn!(
            "{} watch stream ended, restarting in {:?}...",
            kind, restart_delay
        );
        tokio::time::sleep(restart_delay).await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
