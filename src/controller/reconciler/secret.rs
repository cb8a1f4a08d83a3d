//! # Managed Secret
//!
//! Builds the Secret holding an installation access token and checks
//! ownership of existing Secrets.

use super::owner::TokenOwner;
use super::store::ObjectKey;
use crate::constants::{
    BASIC_AUTH_USERNAME, MANAGER_NAME, SECRET_TYPE_BASIC_AUTH, SECRET_TYPE_TOKEN,
};
use crate::credential::Credential;
use crate::crd::ManagedSecretRef;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::warn;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_CREATED_BY: &str = "app.kubernetes.io/created-by";

/// Key of the Secret a reference points at
#[must_use]
pub fn secret_key(reference: &ManagedSecretRef) -> ObjectKey {
    ObjectKey::namespaced(reference.namespace.clone(), reference.name.clone())
}

/// Secret type tag for the requested shape
#[must_use]
pub fn secret_type(basic_auth: bool) -> &'static str {
    if basic_auth {
        SECRET_TYPE_BASIC_AUTH
    } else {
        SECRET_TYPE_TOKEN
    }
}

/// Secret payload: `{username, password}` for basic auth, `{token}` otherwise
#[must_use]
pub fn build_secret_data(credential: &Credential, basic_auth: bool) -> BTreeMap<String, ByteString> {
    let token = ByteString(credential.token().as_bytes().to_vec());
    if basic_auth {
        BTreeMap::from([
            (
                "username".to_string(),
                ByteString(BASIC_AUTH_USERNAME.as_bytes().to_vec()),
            ),
            ("password".to_string(), token),
        ])
    } else {
        BTreeMap::from([("token".to_string(), token)])
    }
}

/// Management labels merged with the owner's extra labels
///
/// Management labels win on collision.
pub fn secret_labels<O: TokenOwner>(owner: &O) -> BTreeMap<String, String> {
    let mut labels = owner.secret_labels().clone();
    let fixed = [
        (LABEL_NAME, O::kind_name()),
        (LABEL_INSTANCE, owner.name_any()),
        (LABEL_PART_OF, MANAGER_NAME.to_string()),
        (LABEL_CREATED_BY, MANAGER_NAME.to_string()),
    ];
    for (key, value) in fixed {
        if let Some(previous) = labels.insert(key.to_string(), value.clone()) {
            if previous != value {
                warn!(
                    label = key,
                    ignored = previous.as_str(),
                    "Secret label is reserved and cannot be overridden"
                );
            }
        }
    }
    labels
}

/// Whether the Secret's controller reference points at this owner
pub fn is_controlled_by<O: TokenOwner>(secret: &Secret, owner: &O) -> bool {
    let Some(uid) = owner.meta().uid.as_deref() else {
        return false;
    };
    secret.owner_references().iter().any(|r| {
        r.controller == Some(true) && r.uid == uid && r.kind == O::kind_name()
    })
}

/// A new Secret for the owner, controlled by it
///
/// Returns `None` when the owner has not been persisted yet (no UID).
pub fn build_secret<O: TokenOwner>(
    owner: &O,
    target: &ManagedSecretRef,
    credential: &Credential,
) -> Option<Secret> {
    let owner_ref = owner.controller_owner_ref(&())?;
    Some(Secret {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            labels: Some(secret_labels(owner)),
            annotations: Some(owner.secret_annotations().clone()).filter(|a| !a.is_empty()),
            owner_references: Some(vec![owner_ref]),
            ..ObjectMeta::default()
        },
        type_: Some(secret_type(target.basic_auth).to_string()),
        data: Some(build_secret_data(credential, target.basic_auth)),
        ..Secret::default()
    })
}

/// Existing Secret carrying a fresh token and the owner's current metadata
pub fn refreshed_secret<O: TokenOwner>(
    mut secret: Secret,
    owner: &O,
    credential: &Credential,
    basic_auth: bool,
) -> Secret {
    secret.data = Some(build_secret_data(credential, basic_auth));
    secret.string_data = None;
    secret
        .labels_mut()
        .extend(secret_labels(owner));
    secret
        .annotations_mut()
        .extend(owner.secret_annotations().clone());
    secret
}

/// Whether the existing Secret has the shape the owner asks for
#[must_use]
pub fn has_shape(secret: &Secret, basic_auth: bool) -> bool {
    secret.type_.as_deref() == Some(secret_type(basic_auth))
}
