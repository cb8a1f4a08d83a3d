//! # Token Owners
//!
//! The capability set the reconciliation engine needs from an owner, and its
//! implementations for `Token` and `ClusterToken`.
//!
//! Implementors provide the spec getters and access to the shared
//! [`TokenStatus`]; everything derived from those (credential request,
//! timing policy, status mutation with change detection) comes from the
//! provided methods, so both kinds run through one engine.

use super::store::ObjectKey;
use super::validation::{token_policy, SpecError, TokenPolicy};
use crate::credential::{created_at_for, CredentialRequest};
use crate::crd::{
    ClusterToken, Condition, InstallationAccessToken, ManagedSecretRef, Permissions, Token,
    TokenStatus,
};
use chrono::{DateTime, Utc};
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A resource requesting an installation access token in a managed Secret
pub trait TokenOwner:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// API handle for this kind; `namespace` is ignored for cluster-scoped kinds
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// Coordinates and shape of the Secret the current spec asks for
    fn secret_target(&self) -> ManagedSecretRef;

    fn secret_labels(&self) -> &BTreeMap<String, String>;

    fn secret_annotations(&self) -> &BTreeMap<String, String>;

    fn installation_id(&self) -> Option<i64>;

    fn permissions(&self) -> Option<&Permissions>;

    fn repositories(&self) -> &[String];

    fn repository_ids(&self) -> &[i64];

    fn refresh_interval_spec(&self) -> &str;

    fn retry_interval_spec(&self) -> &str;

    fn token_status(&self) -> Option<&TokenStatus>;

    fn token_status_mut(&mut self) -> &mut TokenStatus;

    /// Reference to the owner named by a managed Secret's owner reference
    fn dispatch_ref(name: &str, secret_namespace: Option<&str>) -> ObjectRef<Self>;

    /// Kind name, e.g. `Token`
    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }

    fn key(&self) -> ObjectKey {
        ObjectKey::of(self)
    }

    fn credential_request(&self) -> CredentialRequest {
        CredentialRequest {
            installation_id: self.installation_id(),
            permissions: self
                .permissions()
                .map(Permissions::to_request_map)
                .unwrap_or_default(),
            repositories: self.repositories().to_vec(),
            repository_ids: self.repository_ids().to_vec(),
        }
    }

    fn policy(&self) -> Result<TokenPolicy, SpecError> {
        token_policy(self.refresh_interval_spec(), self.retry_interval_spec())
    }

    /// Last recorded managed Secret, unset if none
    fn managed_secret(&self) -> ManagedSecretRef {
        self.token_status()
            .map(|s| s.managed_secret.clone())
            .unwrap_or_default()
    }

    /// Record the current spec target as the managed Secret
    fn update_managed_secret(&mut self) -> bool {
        let target = self.secret_target();
        let status = self.token_status_mut();
        if status.managed_secret.matches(&target) {
            return false;
        }
        status.managed_secret = target;
        true
    }

    fn credential_timestamps(&self) -> Option<InstallationAccessToken> {
        self.token_status()
            .and_then(|s| s.installation_access_token)
    }

    /// Record the expiry of a freshly issued token
    fn set_credential_expiry(&mut self, expires_at: DateTime<Utc>) -> bool {
        let timestamps = InstallationAccessToken {
            created_at: created_at_for(expires_at),
            expires_at,
        };
        let status = self.token_status_mut();
        if status.installation_access_token == Some(timestamps) {
            return false;
        }
        status.installation_access_token = Some(timestamps);
        true
    }

    /// Generation the current token was issued for
    fn rotated_generation(&self) -> Option<i64> {
        self.token_status().and_then(|s| s.observed_generation)
    }

    /// Record the generation a token was successfully issued for
    fn set_rotated_generation(&mut self, generation: Option<i64>) -> bool {
        let status = self.token_status_mut();
        if status.observed_generation == generation {
            return false;
        }
        status.observed_generation = generation;
        true
    }

    fn has_conditions(&self) -> bool {
        self.token_status()
            .is_some_and(|s| !s.conditions.is_empty())
    }

    fn condition(&self, r#type: &str) -> Option<&Condition> {
        self.token_status().and_then(|s| s.conditions.get(r#type))
    }

    /// Set a condition stamped with the current generation
    fn set_condition(&mut self, mut condition: Condition, now: DateTime<Utc>) -> bool {
        condition.observed_generation = self.meta().generation;
        self.token_status_mut().conditions.set(condition, now)
    }
}

impl TokenOwner for Token {
    fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
        Api::namespaced(client, namespace.unwrap_or("default"))
    }

    fn secret_target(&self) -> ManagedSecretRef {
        ManagedSecretRef::new(
            self.namespace().unwrap_or_default(),
            self.spec
                .secret
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| self.name_any()),
            self.spec.secret.basic_auth,
        )
    }

    fn secret_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.secret.labels
    }

    fn secret_annotations(&self) -> &BTreeMap<String, String> {
        &self.spec.secret.annotations
    }

    fn installation_id(&self) -> Option<i64> {
        self.spec.installation_id.filter(|id| *id != 0)
    }

    fn permissions(&self) -> Option<&Permissions> {
        self.spec.permissions.as_ref()
    }

    fn repositories(&self) -> &[String] {
        &self.spec.repositories
    }

    fn repository_ids(&self) -> &[i64] {
        &self.spec.repository_ids
    }

    fn refresh_interval_spec(&self) -> &str {
        &self.spec.refresh_interval
    }

    fn retry_interval_spec(&self) -> &str {
        &self.spec.retry_interval
    }

    fn token_status(&self) -> Option<&TokenStatus> {
        self.status.as_ref()
    }

    fn token_status_mut(&mut self) -> &mut TokenStatus {
        self.status.get_or_insert_with(TokenStatus::default)
    }

    fn dispatch_ref(name: &str, secret_namespace: Option<&str>) -> ObjectRef<Self> {
        let reference = ObjectRef::new(name);
        match secret_namespace {
            Some(namespace) => reference.within(namespace),
            None => reference,
        }
    }
}

impl TokenOwner for ClusterToken {
    fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
        Api::all(client)
    }

    fn secret_target(&self) -> ManagedSecretRef {
        ManagedSecretRef::new(
            self.spec.secret.namespace.clone(),
            self.spec
                .secret
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| self.name_any()),
            self.spec.secret.basic_auth,
        )
    }

    fn secret_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.secret.labels
    }

    fn secret_annotations(&self) -> &BTreeMap<String, String> {
        &self.spec.secret.annotations
    }

    fn installation_id(&self) -> Option<i64> {
        self.spec.installation_id.filter(|id| *id != 0)
    }

    fn permissions(&self) -> Option<&Permissions> {
        self.spec.permissions.as_ref()
    }

    fn repositories(&self) -> &[String] {
        &self.spec.repositories
    }

    fn repository_ids(&self) -> &[i64] {
        &self.spec.repository_ids
    }

    fn refresh_interval_spec(&self) -> &str {
        &self.spec.refresh_interval
    }

    fn retry_interval_spec(&self) -> &str {
        &self.spec.retry_interval
    }

    fn token_status(&self) -> Option<&TokenStatus> {
        self.status.as_ref()
    }

    fn token_status_mut(&mut self) -> &mut TokenStatus {
        self.status.get_or_insert_with(TokenStatus::default)
    }

    // Cluster-scoped: the Secret's namespace is not the owner's
    fn dispatch_ref(name: &str, _secret_namespace: Option<&str>) -> ObjectRef<Self> {
        ObjectRef::new(name)
    }
}
