//! # Token Secret Engine
//!
//! Per-owner state machine deciding whether to create, migrate, verify or
//! refresh the managed Secret.
//!
//! One invocation:
//! 1. initializes the `Ready` condition of a fresh owner
//! 2. validates the refresh and retry intervals
//! 3. removes the previously managed Secret when the spec now points elsewhere
//! 4. resolves the Secret at the current coordinates and either creates it,
//!    refuses to touch it (not ours), idles until the refresh deadline, or
//!    rotates the token in place
//!
//! Transient credential failures are absorbed and turned into a requeue after
//! the owner's retry interval. Everything else is surfaced on the `Ready`
//! condition first and then returned as an error.

use super::owner::TokenOwner;
use super::secret::{
    build_secret, has_shape, is_controlled_by, refreshed_secret, secret_key,
};
use super::status::StatusChange;
use super::store::{ObjectKey, ObjectStore, StoreError};
use super::validation::{SpecError, TokenPolicy};
use crate::clock::Clock;
use crate::credential::{Credential, CredentialError, CredentialSource};
use crate::crd::{ConditionStatus, ManagedSecretRef};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use kube::Resource;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TokenSecretError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("Secret {0} already exists and is not managed by this owner")]
    OwnershipConflict(ObjectKey),
    #[error("invalid spec: {0}")]
    InvalidSpec(#[from] SpecError),
    #[error("reconcile deadline exceeded")]
    DeadlineExceeded,
    #[error("{0} was deleted during reconciliation")]
    OwnerGone(ObjectKey),
    #[error("{0} has no UID and cannot own a Secret")]
    OwnerNotPersisted(ObjectKey),
}

impl TokenSecretError {
    /// Short label used for metrics
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            TokenSecretError::Store(_) => "store",
            TokenSecretError::Credential(_) => "credential",
            TokenSecretError::OwnershipConflict(_) => "ownership_conflict",
            TokenSecretError::InvalidSpec(_) => "invalid_spec",
            TokenSecretError::DeadlineExceeded => "deadline_exceeded",
            TokenSecretError::OwnerGone(_) => "owner_gone",
            TokenSecretError::OwnerNotPersisted(_) => "owner_not_persisted",
        }
    }
}

/// Tuning for a single engine invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Deadline for the whole invocation
    pub timeout: Duration,
    /// In-place retries after a status write conflict
    pub status_conflict_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::constants::DEFAULT_RECONCILE_TIMEOUT_SECS),
            status_conflict_retries: crate::constants::DEFAULT_STATUS_CONFLICT_RETRIES,
        }
    }
}

/// Collaborators of the reconciliation engine for one owner kind
pub struct Engine<O: TokenOwner> {
    pub store: Arc<dyn ObjectStore<O>>,
    pub credentials: Arc<dyn CredentialSource>,
    pub clock: Arc<dyn Clock>,
    pub settings: EngineSettings,
}

impl<O: TokenOwner> fmt::Debug for Engine<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("kind", &O::kind_name())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<O: TokenOwner> Engine<O> {
    pub fn new(
        store: Arc<dyn ObjectStore<O>>,
        credentials: Arc<dyn CredentialSource>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            credentials,
            clock,
            settings,
        }
    }

    /// Reconcile one owner
    ///
    /// Returns how long to wait before the next pass, or `None` when the owner
    /// no longer exists.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Option<Duration>, TokenSecretError> {
        let deadline = Instant::now() + self.settings.timeout;
        let fetched = bounded(deadline, self.store.get_owner(key)).await?;
        let Some(owner) = fetched else {
            debug!("{} {} not found, nothing to do", O::kind_name(), key);
            return Ok(None);
        };

        let mut run = TokenSecret {
            engine: self,
            deadline,
            key: key.clone(),
            owner,
        };

        match run.reconcile().await {
            Err(TokenSecretError::OwnerGone(gone)) => {
                info!("{} {} was deleted during reconciliation", O::kind_name(), gone);
                Ok(None)
            }
            other => other,
        }
    }
}

/// Await an operation, bounded by the invocation deadline
async fn bounded<T, E>(
    deadline: Instant,
    operation: impl Future<Output = Result<T, E>>,
) -> Result<T, TokenSecretError>
where
    E: Into<TokenSecretError>,
{
    match tokio::time::timeout_at(deadline, operation).await {
        Ok(result) => result.map_err(Into::into),
        Err(_elapsed) => Err(TokenSecretError::DeadlineExceeded),
    }
}

/// Outcome of asking the credential source for a token
enum Issuance {
    /// Token issued for the owner spec at `generation`
    Issued {
        credential: Credential,
        generation: Option<i64>,
    },
    /// Transient failure, retry after the owner's retry interval
    Deferred(CredentialError),
}

/// State of one engine invocation for one owner
pub(super) struct TokenSecret<'a, O: TokenOwner> {
    pub(super) engine: &'a Engine<O>,
    pub(super) deadline: Instant,
    pub(super) key: ObjectKey,
    pub(super) owner: O,
}

impl<O: TokenOwner> TokenSecret<'_, O> {
    pub(super) async fn bounded<T, E>(
        &self,
        operation: impl Future<Output = Result<T, E>>,
    ) -> Result<T, TokenSecretError>
    where
        E: Into<TokenSecretError>,
    {
        bounded(self.deadline, operation).await
    }

    fn store(&self) -> &dyn ObjectStore<O> {
        self.engine.store.as_ref()
    }

    async fn reconcile(&mut self) -> Result<Option<Duration>, TokenSecretError> {
        if !self.owner.has_conditions() {
            self.update_status(&[StatusChange::ready(
                ConditionStatus::Unknown,
                "Reconciling",
                "Starting reconciliation",
            )])
            .await?;
        }

        let policy = match self.owner.policy() {
            Ok(policy) => policy,
            Err(e) => {
                warn!("Invalid spec for {} {}: {}", O::kind_name(), self.key, e);
                self.update_status(&[StatusChange::ready(
                    ConditionStatus::False,
                    "InvalidSpec",
                    e.to_string(),
                )])
                .await?;
                return Err(e.into());
            }
        };

        let target = self.owner.secret_target();
        let managed = self.owner.managed_secret();
        if !managed.is_unset() && !managed.matches(&target) {
            info!("Managed Secret moved from {} to {}", managed, target);
            self.remove_stale_secret(&managed).await?;
        }

        let existing = self.bounded(self.store().get_secret(&secret_key(&target))).await?;
        match existing {
            None => self.create_secret(&target, &policy).await,
            Some(secret) if !is_controlled_by(&secret, &self.owner) => {
                warn!(
                    "Secret {} already exists and is not controlled by {} {}",
                    target,
                    O::kind_name(),
                    self.key
                );
                metrics::increment_ownership_conflicts();
                self.update_status(&[StatusChange::ready(
                    ConditionStatus::False,
                    "Failed",
                    "Secret already exists",
                )])
                .await?;
                Err(TokenSecretError::OwnershipConflict(secret_key(&target)))
            }
            Some(secret) if !has_shape(&secret, target.basic_auth) => {
                // The type of a Secret is immutable
                info!("Secret {} has the wrong type, recreating it", target);
                self.delete_owned_secret(&secret).await?;
                self.create_secret(&target, &policy).await
            }
            Some(secret) => self.refresh_secret(secret, &target, &policy).await,
        }
    }

    async fn issue_credential(&mut self) -> Result<Issuance, TokenSecretError> {
        let generation = self.owner.meta().generation;
        let request = self.owner.credential_request();
        let issued = tokio::time::timeout_at(
            self.deadline,
            self.engine.credentials.issue(&request),
        )
        .await
        .map_err(|_elapsed| TokenSecretError::DeadlineExceeded)?;

        match issued {
            Ok(credential) => {
                metrics::increment_credentials_issued();
                Ok(Issuance::Issued {
                    credential,
                    generation,
                })
            }
            Err(e) if e.is_transient() => {
                metrics::increment_credential_failures(e.class());
                warn!(
                    "Transient failure issuing token for {} {}: {}",
                    O::kind_name(),
                    self.key,
                    e
                );
                Ok(Issuance::Deferred(e))
            }
            Err(e) => {
                metrics::increment_credential_failures(e.class());
                self.update_status(&[StatusChange::ready(
                    ConditionStatus::False,
                    "Failed",
                    format!("Failed to issue installation access token: {e}"),
                )])
                .await?;
                Err(e.into())
            }
        }
    }

    async fn create_secret(
        &mut self,
        target: &ManagedSecretRef,
        policy: &TokenPolicy,
    ) -> Result<Option<Duration>, TokenSecretError> {
        info!("Creating Secret {}", target);

        let (credential, generation) = match self.issue_credential().await? {
            Issuance::Issued {
                credential,
                generation,
            } => (credential, generation),
            Issuance::Deferred(e) => {
                self.update_status(&[StatusChange::ready(
                    ConditionStatus::False,
                    "Retrying",
                    format!("Waiting to retry installation access token: {e}"),
                )])
                .await?;
                return Ok(Some(policy.retry_interval));
            }
        };

        let secret = build_secret(&self.owner, target, &credential)
            .ok_or_else(|| TokenSecretError::OwnerNotPersisted(self.key.clone()))?;

        self.update_status(&[StatusChange::ready(
            ConditionStatus::False,
            "Creating",
            "Creating Secret",
        )])
        .await?;

        self.bounded(self.store().create_secret(&secret)).await?;
        metrics::increment_secrets_created();

        self.update_status(&[
            StatusChange::ready(ConditionStatus::True, "Created", "Created Secret"),
            StatusChange::ManagedSecret,
            StatusChange::CredentialExpiry(credential.expires_at()),
            StatusChange::RotatedGeneration(generation),
        ])
        .await?;

        info!(
            expires_at = %credential.expires_at(),
            "Created Secret {}", target
        );
        Ok(Some(policy.refresh_interval))
    }

    /// Whether the token in the Secret is due for rotation, or how long until it is
    fn refresh_wait(&self, policy: &TokenPolicy) -> Option<Duration> {
        // Only successful rotations record a generation, so a failed
        // rotation after a spec change is attempted again
        if self.owner.rotated_generation() != self.owner.meta().generation {
            debug!("Spec changed since last rotation");
            return None;
        }

        let timestamps = self.owner.credential_timestamps()?;
        let interval = chrono::Duration::from_std(policy.refresh_interval).ok()?;
        let refresh_at = timestamps.created_at + interval;
        let now = self.engine.clock.now();
        if now < refresh_at {
            (refresh_at - now).to_std().ok()
        } else {
            None
        }
    }

    async fn refresh_secret(
        &mut self,
        secret: Secret,
        target: &ManagedSecretRef,
        policy: &TokenPolicy,
    ) -> Result<Option<Duration>, TokenSecretError> {
        if let Some(wait) = self.refresh_wait(policy) {
            debug!("Secret {} is current, next refresh in {:?}", target, wait);
            return Ok(Some(wait));
        }

        info!("Refreshing Secret {}", target);

        let (credential, generation) = match self.issue_credential().await? {
            Issuance::Issued {
                credential,
                generation,
            } => (credential, generation),
            Issuance::Deferred(_) => {
                info!("Leaving Secret {} unchanged until retry", target);
                return Ok(Some(policy.retry_interval));
            }
        };

        self.update_status(&[StatusChange::ready(
            ConditionStatus::Unknown,
            "Updating",
            "Updating Secret",
        )])
        .await?;

        let updated = refreshed_secret(secret, &self.owner, &credential, target.basic_auth);
        self.bounded(self.store().update_secret(&updated)).await?;
        metrics::increment_secrets_updated();

        self.update_status(&[
            StatusChange::ready(ConditionStatus::True, "Updated", "Updated Secret"),
            StatusChange::ManagedSecret,
            StatusChange::CredentialExpiry(credential.expires_at()),
            StatusChange::RotatedGeneration(generation),
        ])
        .await?;

        info!(
            expires_at = %credential.expires_at(),
            "Updated Secret {}", target
        );
        Ok(Some(policy.refresh_interval))
    }

    /// Delete the Secret a previous spec pointed at, if it is still ours
    async fn remove_stale_secret(
        &mut self,
        managed: &ManagedSecretRef,
    ) -> Result<(), TokenSecretError> {
        self.update_status(&[StatusChange::ready(
            ConditionStatus::False,
            "Reconciling",
            "Deleting old Secret",
        )])
        .await?;

        let message = match self.bounded(self.store().get_secret(&secret_key(managed))).await? {
            None => {
                info!("Old Secret {} not found", managed);
                "Old Secret not found"
            }
            Some(secret) if !is_controlled_by(&secret, &self.owner) => {
                warn!(
                    "Old Secret {} is not controlled by {} {}, leaving it in place",
                    managed,
                    O::kind_name(),
                    self.key
                );
                "Old Secret not managed, left in place"
            }
            Some(secret) => {
                self.delete_owned_secret(&secret).await?;
                "Deleted old Secret"
            }
        };

        self.update_status(&[StatusChange::ready(
            ConditionStatus::False,
            "Reconciling",
            message,
        )])
        .await
    }

    async fn delete_owned_secret(&self, secret: &Secret) -> Result<(), TokenSecretError> {
        let key = ObjectKey::of(secret);
        match self.bounded(self.store().delete_secret(secret)).await {
            Ok(()) => {
                metrics::increment_secrets_deleted();
                info!("Deleted Secret {}", key);
                Ok(())
            }
            Err(TokenSecretError::Store(e)) if e.is_not_found() => {
                debug!("Secret {} already deleted", key);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
