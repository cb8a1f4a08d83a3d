//! Shared fixtures for engine tests: an in-memory object store with
//! resource versions, a scripted credential source and a settable clock.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use github_token_manager::controller::reconciler::secret::is_controlled_by;
use github_token_manager::prelude::*;
use k8s_openapi::api::core::v1::Secret;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Clock the test moves by hand
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Store operations, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    GetOwner,
    UpdateOwnerStatus,
    GetSecret(ObjectKey),
    CreateSecret(ObjectKey),
    UpdateSecret(ObjectKey),
    DeleteSecret(ObjectKey),
}

impl Op {
    pub fn is_write(&self) -> bool {
        !matches!(self, Op::GetOwner | Op::GetSecret(_))
    }
}

struct State<O> {
    owners: BTreeMap<ObjectKey, O>,
    secrets: BTreeMap<ObjectKey, Secret>,
    version: u64,
    ops: Vec<Op>,
    status_conflicts: u32,
}

impl<O> State<O> {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// In-memory [`ObjectStore`] enforcing resource versions and UID preconditions
pub struct MemoryStore<O> {
    state: Mutex<State<O>>,
    stall_secret_reads: AtomicBool,
}

impl<O: TokenOwner> MemoryStore<O> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                owners: BTreeMap::new(),
                secrets: BTreeMap::new(),
                version: 0,
                ops: Vec::new(),
                status_conflicts: 0,
            }),
            stall_secret_reads: AtomicBool::new(false),
        })
    }

    /// Persist a new owner, assigning UID, generation and resource version
    pub fn insert_owner(&self, mut owner: O) -> O {
        let mut state = self.state.lock().unwrap();
        let meta = owner.meta_mut();
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{}", meta.name.clone().unwrap_or_default()));
        }
        meta.generation = Some(meta.generation.unwrap_or(1));
        meta.resource_version = Some(state.next_version());
        state.owners.insert(ObjectKey::of(&owner), owner.clone());
        owner
    }

    /// Edit the owner's spec as a user would: bumps generation
    pub fn edit_owner(&self, key: &ObjectKey, edit: impl FnOnce(&mut O)) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let owner = state.owners.get_mut(key).unwrap();
        edit(owner);
        let meta = owner.meta_mut();
        meta.generation = Some(meta.generation.unwrap_or(0) + 1);
        meta.resource_version = Some(version);
    }

    pub fn owner(&self, key: &ObjectKey) -> O {
        self.state.lock().unwrap().owners[key].clone()
    }

    pub fn remove_owner(&self, key: &ObjectKey) {
        self.state.lock().unwrap().owners.remove(key);
    }

    /// Persist a Secret created outside the engine
    pub fn insert_secret(&self, mut secret: Secret) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        secret.metadata.uid = Some(format!("secret-uid-{version}"));
        secret.metadata.resource_version = Some(version);
        state.secrets.insert(ObjectKey::of(&secret), secret);
    }

    pub fn secret(&self, key: &ObjectKey) -> Option<Secret> {
        self.state.lock().unwrap().secrets.get(key).cloned()
    }

    pub fn secrets(&self) -> Vec<Secret> {
        self.state.lock().unwrap().secrets.values().cloned().collect()
    }

    pub fn remove_secret(&self, key: &ObjectKey) {
        self.state.lock().unwrap().secrets.remove(key);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn writes(&self) -> Vec<Op> {
        self.ops().into_iter().filter(Op::is_write).collect()
    }

    pub fn clear_ops(&self) {
        self.state.lock().unwrap().ops.clear();
    }

    /// Fail the next `n` status writes with a conflict
    pub fn inject_status_conflicts(&self, n: u32) {
        self.state.lock().unwrap().status_conflicts = n;
    }

    /// Make every Secret read hang forever
    pub fn stall_secret_reads(&self) {
        self.stall_secret_reads.store(true, Ordering::SeqCst);
    }

    fn record(&self, op: Op) {
        self.state.lock().unwrap().ops.push(op);
    }
}

#[async_trait]
impl<O: TokenOwner> ObjectStore<O> for MemoryStore<O> {
    async fn get_owner(&self, key: &ObjectKey) -> Result<Option<O>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::GetOwner);
        Ok(state.owners.get(key).cloned())
    }

    async fn update_owner_status(&self, owner: &O) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::UpdateOwnerStatus);
        if state.status_conflicts > 0 {
            state.status_conflicts -= 1;
            return Err(StoreError::Conflict("injected conflict".to_string()));
        }
        let version = state.next_version();
        let key = ObjectKey::of(owner);
        let stored = state
            .owners
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if stored.meta().resource_version != owner.meta().resource_version {
            return Err(StoreError::Conflict(format!("{key} has been modified")));
        }
        *stored.token_status_mut() = owner.token_status().cloned().unwrap_or_default();
        stored.meta_mut().resource_version = Some(version);
        Ok(())
    }

    async fn get_secret(&self, key: &ObjectKey) -> Result<Option<Secret>, StoreError> {
        if self.stall_secret_reads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.record(Op::GetSecret(key.clone()));
        Ok(self.secret(key))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let key = ObjectKey::of(secret);
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::CreateSecret(key.clone()));
        if state.secrets.contains_key(&key) {
            return Err(StoreError::Conflict(format!("{key} already exists")));
        }
        let version = state.next_version();
        let mut created = secret.clone();
        created.metadata.uid = Some(format!("secret-uid-{version}"));
        created.metadata.resource_version = Some(version);
        state.secrets.insert(key, created.clone());
        Ok(created)
    }

    async fn update_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let key = ObjectKey::of(secret);
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::UpdateSecret(key.clone()));
        let version = state.next_version();
        let stored = state
            .secrets
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if stored.metadata.resource_version != secret.metadata.resource_version {
            return Err(StoreError::Conflict(format!("{key} has been modified")));
        }
        let mut updated = secret.clone();
        updated.metadata.uid.clone_from(&stored.metadata.uid);
        updated.metadata.resource_version = Some(version);
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let key = ObjectKey::of(secret);
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::DeleteSecret(key.clone()));
        let stored = state
            .secrets
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if stored.metadata.uid != secret.metadata.uid {
            return Err(StoreError::Conflict(format!("{key} UID precondition failed")));
        }
        state.secrets.remove(&key);
        Ok(())
    }
}

/// Credential source replaying scripted results, then issuing numbered tokens
pub struct ScriptedCredentials {
    clock: Arc<FixedClock>,
    script: Mutex<VecDeque<Result<Credential, CredentialError>>>,
    requests: Mutex<Vec<CredentialRequest>>,
    issued: Mutex<u32>,
}

impl ScriptedCredentials {
    pub fn new(clock: Arc<FixedClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            issued: Mutex::new(0),
        })
    }

    pub fn fail_next(&self, error: CredentialError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CredentialRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CredentialSource for ScriptedCredentials {
    async fn issue(&self, request: &CredentialRequest) -> Result<Credential, CredentialError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        let mut issued = self.issued.lock().unwrap();
        *issued += 1;
        Ok(Credential::new(
            format!("ghs_token_{issued}"),
            self.clock.now() + chrono::Duration::hours(1),
        ))
    }
}

/// Engine wired to in-memory collaborators
pub struct Harness<O: TokenOwner> {
    pub store: Arc<MemoryStore<O>>,
    pub credentials: Arc<ScriptedCredentials>,
    pub clock: Arc<FixedClock>,
    pub engine: Engine<O>,
}

impl<O: TokenOwner> Harness<O> {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let store = MemoryStore::<O>::new();
        let clock = FixedClock::new(t0());
        let credentials = ScriptedCredentials::new(Arc::clone(&clock));
        let engine = Engine::new(
            Arc::clone(&store) as Arc<dyn ObjectStore<O>>,
            Arc::clone(&credentials) as Arc<dyn CredentialSource>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            settings,
        );
        Self {
            store,
            credentials,
            clock,
            engine,
        }
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Option<Duration>, TokenSecretError> {
        self.engine.reconcile(key).await
    }

    pub fn owner(&self, key: &ObjectKey) -> O {
        self.store.owner(key)
    }

    /// Secrets whose controller reference names the owner
    pub fn controlled_secrets(&self, key: &ObjectKey) -> Vec<Secret> {
        let owner = self.owner(key);
        self.store
            .secrets()
            .into_iter()
            .filter(|s| is_controlled_by(s, &owner))
            .collect()
    }

    pub fn ready(&self, key: &ObjectKey) -> Condition {
        self.owner(key).condition("Ready").cloned().unwrap()
    }
}

pub fn token(name: &str, namespace: &str, spec: TokenSpec) -> Token {
    let mut token = Token::new(name, spec);
    token.metadata.namespace = Some(namespace.to_string());
    token
}

pub fn token_spec(refresh: &str, retry: &str) -> TokenSpec {
    TokenSpec {
        refresh_interval: refresh.to_string(),
        retry_interval: retry.to_string(),
        ..TokenSpec::default()
    }
}

/// A Secret nobody owns
pub fn foreign_secret(namespace: &str, name: &str) -> Secret {
    let mut secret = Secret::default();
    secret.metadata.namespace = Some(namespace.to_string());
    secret.metadata.name = Some(name.to_string());
    secret.type_ = Some("Opaque".to_string());
    secret.data = Some(BTreeMap::from([(
        "token".to_string(),
        k8s_openapi::ByteString(b"hand-made".to_vec()),
    )]));
    secret
}

pub fn data(secret: &Secret, key: &str) -> String {
    let value = &secret.data.as_ref().unwrap()[key];
    String::from_utf8(value.0.clone()).unwrap()
}

pub fn data_keys(secret: &Secret) -> Vec<String> {
    secret.data.as_ref().unwrap().keys().cloned().collect()
}
