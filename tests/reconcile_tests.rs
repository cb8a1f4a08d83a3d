//! Engine behaviour against an in-memory store and scripted credentials.

mod common;

use common::*;
use github_token_manager::constants::{
    BASIC_AUTH_USERNAME, MANAGER_NAME, SECRET_TYPE_BASIC_AUTH, SECRET_TYPE_TOKEN,
};
use github_token_manager::prelude::*;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::time::Duration;

fn setup(spec: TokenSpec) -> (Harness<Token>, ObjectKey) {
    let harness = Harness::<Token>::new();
    let owner = harness.store.insert_owner(token("ci", "builds", spec));
    (harness, owner.key())
}

fn secret_key(name: &str) -> ObjectKey {
    ObjectKey::namespaced("builds", name)
}

#[tokio::test]
async fn first_reconcile_creates_token_secret() {
    let (h, key) = setup(token_spec("10m", "1m"));

    let requeue = h.reconcile(&key).await.unwrap();
    assert_eq!(requeue, Some(minutes(10)));

    let secret = h.store.secret(&secret_key("ci")).unwrap();
    assert_eq!(secret.type_.as_deref(), Some(SECRET_TYPE_TOKEN));
    assert_eq!(data_keys(&secret), vec!["token"]);
    assert_eq!(data(&secret, "token"), "ghs_token_1");
    assert_eq!(secret.labels()["app.kubernetes.io/part-of"], MANAGER_NAME);
    assert_eq!(secret.labels()["app.kubernetes.io/instance"], "ci");

    let owner = h.owner(&key);
    let status = owner.status.as_ref().unwrap();
    assert_eq!(status.managed_secret, ManagedSecretRef::new("builds", "ci", false));
    let timestamps = status.installation_access_token.unwrap();
    assert_eq!(timestamps.created_at, t0());
    assert_eq!(timestamps.expires_at, t0() + chrono::Duration::hours(1));

    let ready = h.ready(&key);
    assert_eq!(ready.status, ConditionStatus::True);
    assert_eq!(ready.reason, "Created");
    assert_eq!(ready.message, "Created Secret");
    assert_eq!(status.conditions.len(), 1);
}

#[tokio::test]
async fn basic_auth_secret_has_username_and_password() {
    let mut spec = token_spec("10m", "1m");
    spec.secret.basic_auth = true;
    let (h, key) = setup(spec);

    h.reconcile(&key).await.unwrap();

    let secret = h.store.secret(&secret_key("ci")).unwrap();
    assert_eq!(secret.type_.as_deref(), Some(SECRET_TYPE_BASIC_AUTH));
    assert_eq!(data_keys(&secret), vec!["password", "username"]);
    assert_eq!(data(&secret, "username"), BASIC_AUTH_USERNAME);
    assert_eq!(data(&secret, "password"), "ghs_token_1");
}

#[tokio::test]
async fn reconcile_before_refresh_is_due_writes_nothing() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.reconcile(&key).await.unwrap();
    h.store.clear_ops();

    let requeue = h.reconcile(&key).await.unwrap();

    assert_eq!(requeue, Some(minutes(10)));
    assert!(h.store.writes().is_empty(), "unexpected writes: {:?}", h.store.writes());
    assert_eq!(h.credentials.calls(), 1);
}

#[tokio::test]
async fn token_rotates_once_refresh_interval_elapsed() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.reconcile(&key).await.unwrap();

    h.clock.advance(minutes(5));
    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(5)));
    assert_eq!(h.credentials.calls(), 1);

    h.clock.advance(minutes(5));
    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(10)));
    assert_eq!(h.credentials.calls(), 2);

    let secret = h.store.secret(&secret_key("ci")).unwrap();
    assert_eq!(data(&secret, "token"), "ghs_token_2");

    let ready = h.ready(&key);
    assert_eq!(ready.status, ConditionStatus::True);
    assert_eq!(ready.reason, "Updated");
    assert_eq!(ready.message, "Updated Secret");

    let timestamps = h.owner(&key).credential_timestamps().unwrap();
    assert_eq!(timestamps.created_at, t0() + chrono::Duration::minutes(10));
    assert_eq!(h.controlled_secrets(&key).len(), 1);
}

#[tokio::test]
async fn transient_failure_on_create_waits_for_retry_interval() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.credentials
        .fail_next(CredentialError::Transient("HTTP 429: slow down".to_string()));

    let requeue = h.reconcile(&key).await.unwrap();

    assert_eq!(requeue, Some(minutes(1)));
    assert!(h.store.secrets().is_empty());
    let ready = h.ready(&key);
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, "Retrying");

    // Next attempt succeeds
    h.clock.advance(minutes(1));
    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(10)));
    assert!(h.store.secret(&secret_key("ci")).is_some());
}

#[tokio::test]
async fn transient_failure_on_refresh_leaves_secret_untouched() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.reconcile(&key).await.unwrap();
    let before = h.store.secret(&secret_key("ci")).unwrap();
    let status_before = h.owner(&key).status;

    h.clock.advance(minutes(10));
    h.credentials
        .fail_next(CredentialError::Transient("connection reset".to_string()));
    h.store.clear_ops();

    let requeue = h.reconcile(&key).await.unwrap();

    assert_eq!(requeue, Some(minutes(1)));
    assert_eq!(h.store.secret(&secret_key("ci")).unwrap(), before);
    assert_eq!(h.owner(&key).status, status_before);
    assert!(h.store.writes().is_empty());
}

#[tokio::test]
async fn fatal_credential_error_is_reported_then_returned() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.credentials
        .fail_next(CredentialError::Auth("HTTP 404: Not Found".to_string()));

    let error = h.reconcile(&key).await.unwrap_err();

    assert!(matches!(
        error,
        TokenSecretError::Credential(CredentialError::Auth(_))
    ));
    assert!(h.store.secrets().is_empty());
    let ready = h.ready(&key);
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, "Failed");
    assert!(ready.message.contains("HTTP 404"));
}

#[tokio::test]
async fn unowned_secret_is_never_adopted() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.store.insert_secret(foreign_secret("builds", "ci"));
    let foreign = h.store.secret(&secret_key("ci")).unwrap();

    for _ in 0..3 {
        let error = h.reconcile(&key).await.unwrap_err();
        assert!(matches!(error, TokenSecretError::OwnershipConflict(_)));
    }

    assert_eq!(h.store.secret(&secret_key("ci")).unwrap(), foreign);
    assert_eq!(h.store.secrets().len(), 1);
    assert_eq!(h.credentials.calls(), 0);

    let ready = h.ready(&key);
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, "Failed");
    assert_eq!(ready.message, "Secret already exists");
}

#[tokio::test]
async fn renamed_secret_is_migrated() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.reconcile(&key).await.unwrap();
    assert!(h.store.secret(&secret_key("ci")).is_some());

    h.store
        .edit_owner(&key, |owner| owner.spec.secret.name = Some("renamed".to_string()));
    h.reconcile(&key).await.unwrap();

    assert!(h.store.secret(&secret_key("ci")).is_none());
    let renamed = h.store.secret(&secret_key("renamed")).unwrap();
    assert_eq!(data(&renamed, "token"), "ghs_token_2");
    assert_eq!(
        h.owner(&key).managed_secret(),
        ManagedSecretRef::new("builds", "renamed", false)
    );
    assert_eq!(h.controlled_secrets(&key).len(), 1);
}

#[tokio::test]
async fn unowned_previous_secret_is_left_in_place() {
    let h = Harness::<Token>::new();
    let mut owner = token("ci", "builds", token_spec("10m", "1m"));
    let status = owner.token_status_mut();
    status.managed_secret = ManagedSecretRef::new("builds", "legacy", false);
    status.conditions = vec![Condition::new(
        "Ready",
        ConditionStatus::True,
        "Created",
        "Created Secret",
    )]
    .into();
    let key = h.store.insert_owner(owner).key();
    h.store.insert_secret(foreign_secret("builds", "legacy"));

    h.reconcile(&key).await.unwrap();

    assert!(h.store.secret(&secret_key("legacy")).is_some());
    assert!(h.store.secret(&secret_key("ci")).is_some());
    assert_eq!(h.owner(&key).managed_secret().name, "ci");
}

#[tokio::test]
async fn switching_to_basic_auth_replaces_secret() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.reconcile(&key).await.unwrap();

    h.store.edit_owner(&key, |owner| owner.spec.secret.basic_auth = true);
    h.reconcile(&key).await.unwrap();

    let secret = h.store.secret(&secret_key("ci")).unwrap();
    assert_eq!(secret.type_.as_deref(), Some(SECRET_TYPE_BASIC_AUTH));
    assert_eq!(data_keys(&secret), vec!["password", "username"]);
    assert!(h.owner(&key).managed_secret().basic_auth);
    assert_eq!(h.controlled_secrets(&key).len(), 1);
}

#[tokio::test]
async fn deleted_secret_is_recreated() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.reconcile(&key).await.unwrap();

    h.store.remove_secret(&secret_key("ci"));
    h.clock.advance(minutes(1));
    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(10)));

    let secret = h.store.secret(&secret_key("ci")).unwrap();
    assert_eq!(data(&secret, "token"), "ghs_token_2");
}

#[tokio::test]
async fn spec_change_rotates_before_refresh_is_due() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.reconcile(&key).await.unwrap();

    h.store.edit_owner(&key, |owner| {
        owner.spec.permissions = Some(Permissions {
            contents: Some(PermissionLevel::Read),
            ..Permissions::default()
        });
        owner.spec.repositories = vec!["app-config".to_string()];
    });
    h.clock.advance(minutes(1));
    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(10)));

    assert_eq!(h.credentials.calls(), 2);
    let request = h.credentials.last_request().unwrap();
    assert_eq!(
        request.permissions,
        BTreeMap::from([("contents".to_string(), "read".to_string())])
    );
    assert_eq!(request.repositories, vec!["app-config".to_string()]);

    // Rotation is recorded against the new generation
    h.store.clear_ops();
    h.reconcile(&key).await.unwrap();
    assert!(h.store.writes().is_empty());
}

#[tokio::test]
async fn fatal_error_after_spec_change_is_retried() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.reconcile(&key).await.unwrap();

    h.store
        .edit_owner(&key, |owner| owner.spec.repositories = vec!["app-config".to_string()]);
    for attempt in 0..2 {
        h.credentials.fail_next(CredentialError::Auth(
            "HTTP 422: The permissions requested are not granted".to_string(),
        ));
        let error = h.reconcile(&key).await.unwrap_err();
        assert!(matches!(
            error,
            TokenSecretError::Credential(CredentialError::Auth(_))
        ));
        assert_eq!(h.credentials.calls(), 2 + attempt);
        assert_eq!(h.ready(&key).reason, "Failed");
    }

    // The Secret keeps the token issued for the old spec until a rotation succeeds
    let secret = h.store.secret(&secret_key("ci")).unwrap();
    assert_eq!(data(&secret, "token"), "ghs_token_1");

    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(10)));
    assert_eq!(h.credentials.calls(), 4);
    let secret = h.store.secret(&secret_key("ci")).unwrap();
    assert_eq!(data(&secret, "token"), "ghs_token_2");
    assert_eq!(h.ready(&key).reason, "Updated");
    assert_eq!(
        h.credentials.last_request().unwrap().repositories,
        vec!["app-config".to_string()]
    );

    h.store.clear_ops();
    h.reconcile(&key).await.unwrap();
    assert!(h.store.writes().is_empty());
    assert_eq!(h.credentials.calls(), 4);
}

#[tokio::test]
async fn missing_owner_stops_silently() {
    let h = Harness::<Token>::new();

    let requeue = h.reconcile(&ObjectKey::namespaced("builds", "gone")).await.unwrap();

    assert_eq!(requeue, None);
    assert_eq!(h.store.ops(), vec![Op::GetOwner]);
    assert_eq!(h.credentials.calls(), 0);
}

#[tokio::test]
async fn status_conflicts_are_retried_in_place() {
    let (h, key) = setup(token_spec("10m", "1m"));
    h.store.inject_status_conflicts(2);

    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(10)));
    assert!(h.store.secret(&secret_key("ci")).is_some());
    assert_eq!(h.ready(&key).reason, "Created");
}

#[tokio::test]
async fn persistent_status_conflict_is_returned() {
    let h = Harness::<Token>::with_settings(EngineSettings {
        status_conflict_retries: 1,
        ..EngineSettings::default()
    });
    let key = h
        .store
        .insert_owner(token("ci", "builds", token_spec("10m", "1m")))
        .key();
    h.store.inject_status_conflicts(5);

    let error = h.reconcile(&key).await.unwrap_err();

    assert!(matches!(error, TokenSecretError::Store(ref e) if e.is_conflict()));
    assert!(h.store.secrets().is_empty());
}

#[tokio::test]
async fn stalled_store_hits_deadline() {
    let h = Harness::<Token>::with_settings(EngineSettings {
        timeout: Duration::from_millis(100),
        ..EngineSettings::default()
    });
    let key = h
        .store
        .insert_owner(token("ci", "builds", token_spec("10m", "1m")))
        .key();
    h.store.stall_secret_reads();

    let error = h.reconcile(&key).await.unwrap_err();

    assert!(matches!(error, TokenSecretError::DeadlineExceeded));
    assert_eq!(h.credentials.calls(), 0);
}

#[tokio::test]
async fn refresh_interval_must_stay_below_token_lifetime() {
    let (h, key) = setup(token_spec("1h", "1m"));

    let error = h.reconcile(&key).await.unwrap_err();

    assert!(matches!(error, TokenSecretError::InvalidSpec(_)));
    let ready = h.ready(&key);
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason, "InvalidSpec");
    assert!(h.store.secrets().is_empty());
    assert_eq!(h.credentials.calls(), 0);
}

#[tokio::test]
async fn unparsable_retry_interval_is_invalid() {
    let (h, key) = setup(token_spec("10m", "soon"));

    let error = h.reconcile(&key).await.unwrap_err();

    assert!(matches!(error, TokenSecretError::InvalidSpec(_)));
    assert!(h.ready(&key).message.contains("soon"));
}

#[tokio::test]
async fn extra_labels_cannot_override_management_labels() {
    let mut spec = token_spec("10m", "1m");
    spec.secret.labels = BTreeMap::from([
        ("team".to_string(), "platform".to_string()),
        ("app.kubernetes.io/part-of".to_string(), "other".to_string()),
    ]);
    spec.secret.annotations =
        BTreeMap::from([("owner".to_string(), "platform@example.com".to_string())]);
    let (h, key) = setup(spec);

    h.reconcile(&key).await.unwrap();

    let secret = h.store.secret(&secret_key("ci")).unwrap();
    assert_eq!(secret.labels()["team"], "platform");
    assert_eq!(secret.labels()["app.kubernetes.io/part-of"], MANAGER_NAME);
    assert_eq!(secret.annotations()["owner"], "platform@example.com");
}

#[tokio::test]
async fn cluster_token_writes_into_spec_namespace() {
    let h = Harness::<ClusterToken>::new();
    let spec = ClusterTokenSpec {
        secret: ClusterTokenSecretSpec {
            namespace: "flux-system".to_string(),
            name: Some("github-auth".to_string()),
            basic_auth: true,
            ..ClusterTokenSecretSpec::default()
        },
        refresh_interval: "20m".to_string(),
        installation_id: Some(42),
        ..ClusterTokenSpec::default()
    };
    let key = h.store.insert_owner(ClusterToken::new("flux", spec)).key();
    assert_eq!(key, ObjectKey::cluster("flux"));

    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(20)));

    let secret = h
        .store
        .secret(&ObjectKey::namespaced("flux-system", "github-auth"))
        .unwrap();
    assert_eq!(data(&secret, "username"), BASIC_AUTH_USERNAME);
    let owner_ref = &secret.owner_references()[0];
    assert_eq!(owner_ref.kind, "ClusterToken");
    assert_eq!(owner_ref.controller, Some(true));
    assert_eq!(h.credentials.last_request().unwrap().installation_id, Some(42));
}

fn flux_spec(namespace: &str) -> ClusterTokenSpec {
    ClusterTokenSpec {
        secret: ClusterTokenSecretSpec {
            namespace: namespace.to_string(),
            name: Some("github-auth".to_string()),
            basic_auth: true,
            ..ClusterTokenSecretSpec::default()
        },
        refresh_interval: "20m".to_string(),
        ..ClusterTokenSpec::default()
    }
}

#[tokio::test]
async fn cluster_token_namespace_move_migrates_secret() {
    let h = Harness::<ClusterToken>::new();
    let key = h
        .store
        .insert_owner(ClusterToken::new("flux", flux_spec("flux-system")))
        .key();
    let old = ObjectKey::namespaced("flux-system", "github-auth");
    h.reconcile(&key).await.unwrap();
    assert!(h.store.secret(&old).is_some());

    h.store
        .edit_owner(&key, |owner| owner.spec.secret.namespace = "apps".to_string());
    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(20)));

    assert!(h.store.secret(&old).is_none());
    let moved = h
        .store
        .secret(&ObjectKey::namespaced("apps", "github-auth"))
        .unwrap();
    assert_eq!(data(&moved, "password"), "ghs_token_2");
    assert_eq!(moved.owner_references()[0].kind, "ClusterToken");
    assert_eq!(
        h.owner(&key).managed_secret(),
        ManagedSecretRef::new("apps", "github-auth", true)
    );
    assert_eq!(h.controlled_secrets(&key).len(), 1);
    assert_eq!(h.ready(&key).reason, "Created");
}

#[tokio::test]
async fn cluster_token_secret_deleted_is_recreated() {
    let h = Harness::<ClusterToken>::new();
    let key = h
        .store
        .insert_owner(ClusterToken::new("flux", flux_spec("flux-system")))
        .key();
    let secret_key = ObjectKey::namespaced("flux-system", "github-auth");
    h.reconcile(&key).await.unwrap();

    h.store.remove_secret(&secret_key);
    h.clock.advance(minutes(1));
    assert_eq!(h.reconcile(&key).await.unwrap(), Some(minutes(20)));

    let secret = h.store.secret(&secret_key).unwrap();
    assert_eq!(data(&secret, "password"), "ghs_token_2");
}
