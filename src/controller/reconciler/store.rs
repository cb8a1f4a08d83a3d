//! # Object Store
//!
//! Read and write access to owners and Secrets with optimistic concurrency.
//!
//! [`ObjectStore`] is the seam the reconciliation engine talks to;
//! [`KubeStore`] binds it to the Kubernetes API server.

use super::owner::TokenOwner;
use crate::constants::MANAGER_NAME;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams, Preconditions};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Namespace and name of an object; cluster-scoped objects have no namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of an existing object
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.meta().namespace.clone(),
            name: obj.meta().name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    /// Stale resource version or an object that already exists
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),
    #[error("failed to serialize object: {0}")]
    Serialization(String),
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(api_err) if api_err.code == 404 => {
                StoreError::NotFound(api_err.message.clone())
            }
            kube::Error::Api(api_err) if api_err.code == 409 => {
                StoreError::Conflict(api_err.message.clone())
            }
            kube::Error::SerdeError(e) => StoreError::Serialization(e.to_string()),
            other => StoreError::Api(other),
        }
    }
}

/// Storage operations the reconciliation engine needs
#[async_trait]
pub trait ObjectStore<O: TokenOwner>: Send + Sync {
    /// Fetch an owner; `None` when it no longer exists
    async fn get_owner(&self, key: &ObjectKey) -> Result<Option<O>, StoreError>;

    /// Write the owner's status, failing with `Conflict` if its resource
    /// version is stale
    async fn update_owner_status(&self, owner: &O) -> Result<(), StoreError>;

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>, StoreError>;

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Replace a Secret, failing with `Conflict` if its resource version is stale
    async fn update_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Delete a Secret, provided its UID still matches
    async fn delete_secret(&self, secret: &Secret) -> Result<(), StoreError>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
pub struct KubeStore<O> {
    client: Client,
    owner: PhantomData<fn() -> O>,
}

impl<O> fmt::Debug for KubeStore<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<O> Clone for KubeStore<O> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            owner: PhantomData,
        }
    }
}

impl<O: TokenOwner> KubeStore<O> {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            owner: PhantomData,
        }
    }

    fn owners(&self, namespace: Option<&str>) -> Api<O> {
        O::api(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn secret_namespace(secret: &Secret) -> Result<&str, StoreError> {
    secret
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| StoreError::Serialization("Secret has no namespace".to_string()))
}

#[async_trait]
impl<O: TokenOwner> ObjectStore<O> for KubeStore<O> {
    async fn get_owner(&self, key: &ObjectKey) -> Result<Option<O>, StoreError> {
        Ok(self
            .owners(key.namespace.as_deref())
            .get_opt(&key.name)
            .await?)
    }

    async fn update_owner_status(&self, owner: &O) -> Result<(), StoreError> {
        let patch = json!({
            "metadata": { "resourceVersion": owner.resource_version() },
            "status": owner.token_status(),
        });
        self.owners(owner.namespace().as_deref())
            .patch_status(
                &owner.name_any(),
                &PatchParams::apply(MANAGER_NAME),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>, StoreError> {
        let namespace = key.namespace.as_deref().unwrap_or("default");
        Ok(self.secrets(namespace).get_opt(&key.name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = secret_namespace(secret)?;
        Ok(self
            .secrets(namespace)
            .create(&PostParams::default(), secret)
            .await?)
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = secret_namespace(secret)?;
        Ok(self
            .secrets(namespace)
            .replace(&secret.name_any(), &PostParams::default(), secret)
            .await?)
    }

    async fn delete_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let namespace = secret_namespace(secret)?;
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                uid: secret.metadata.uid.clone(),
                resource_version: None,
            }),
            ..DeleteParams::default()
        };
        self.secrets(namespace)
            .delete(&secret.name_any(), &params)
            .await?;
        Ok(())
    }
}
