//! # Status Updates
//!
//! Writes owner status with change detection and conflict retry.
//!
//! Every write starts from a fresh copy of the owner, so changes made by
//! other writers since the last read are preserved. If applying the requested
//! changes leaves the status identical, nothing is written (no watch event).

use super::owner::TokenOwner;
use super::token_secret::{TokenSecret, TokenSecretError};
use crate::constants::CONDITION_TYPE_READY;
use crate::crd::{Condition, ConditionStatus};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// One mutation of the owner's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    /// Set the `Ready` condition
    Ready {
        status: ConditionStatus,
        reason: String,
        message: String,
    },
    /// Record the current spec target as the managed Secret
    ManagedSecret,
    /// Record a freshly issued token's expiry
    CredentialExpiry(DateTime<Utc>),
    /// Record the generation the stored token was issued for
    RotatedGeneration(Option<i64>),
}

impl StatusChange {
    pub fn ready(
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        StatusChange::Ready {
            status,
            reason: reason.into(),
            message: message.into(),
        }
    }

    fn apply<O: TokenOwner>(&self, owner: &mut O, now: DateTime<Utc>) -> bool {
        match self {
            StatusChange::Ready {
                status,
                reason,
                message,
            } => owner.set_condition(
                Condition::new(CONDITION_TYPE_READY, *status, reason.as_str(), message.as_str()),
                now,
            ),
            StatusChange::ManagedSecret => owner.update_managed_secret(),
            StatusChange::CredentialExpiry(expires_at) => owner.set_credential_expiry(*expires_at),
            StatusChange::RotatedGeneration(generation) => owner.set_rotated_generation(*generation),
        }
    }
}

impl<O: TokenOwner> TokenSecret<'_, O> {
    /// Apply `changes` to the latest owner and persist them
    ///
    /// Conflicts are retried in place a bounded number of times; the owner
    /// disappearing ends the invocation with [`TokenSecretError::OwnerGone`].
    pub(super) async fn update_status(
        &mut self,
        changes: &[StatusChange],
    ) -> Result<(), TokenSecretError> {
        let mut attempt = 0;
        loop {
            let latest = self
                .bounded(self.engine.store.get_owner(&self.key))
                .await?
                .ok_or_else(|| TokenSecretError::OwnerGone(self.key.clone()))?;
            self.owner = latest;

            let now = self.engine.clock.now();
            let mut changed = false;
            for change in changes {
                changed |= change.apply(&mut self.owner, now);
            }
            if !changed {
                debug!("Skipping status update for {}, nothing changed", self.key);
                return Ok(());
            }

            match self
                .bounded(self.engine.store.update_owner_status(&self.owner))
                .await
            {
                Ok(()) => {
                    // Pick up the new resource version for the next write
                    if let Some(latest) = self
                        .bounded(self.engine.store.get_owner(&self.key))
                        .await?
                    {
                        self.owner = latest;
                    }
                    return Ok(());
                }
                Err(TokenSecretError::Store(e))
                    if e.is_conflict() && attempt < self.engine.settings.status_conflict_retries =>
                {
                    attempt += 1;
                    warn!(
                        "Status update conflict for {} (attempt {}): {}",
                        self.key, attempt, e
                    );
                }
                Err(TokenSecretError::Store(e)) if e.is_not_found() => {
                    return Err(TokenSecretError::OwnerGone(self.key.clone()));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
