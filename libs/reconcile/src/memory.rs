//! In-memory inventory gateway for testing and development.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{GatewayError, WriteError, WriteOp};
use crate::gateway::{InventoryGateway, ScopeStatus};
use crate::record::{Attributes, EntityRecord, Identity, Scope};

#[derive(Default)]
struct Store {
    scopes: BTreeMap<Scope, BTreeMap<u64, EntityRecord>>,
    references: Vec<(Identity, String)>,
    detached: Vec<String>,
    operations: Vec<(WriteOp, Identity)>,
    failures: HashSet<(Identity, WriteOp)>,
}

/// Inventory kept in memory.
///
/// Supports back-references (cleared by detach), failure injection per
/// identity and operation, and counts successful writes.
#[derive(Default)]
pub struct InMemoryGateway {
    store: Mutex<Store>,
    next_handle: AtomicU64,
    writes: AtomicUsize,
    fail_fetch: AtomicBool,
}

impl InMemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Create the scope (if needed) and add records to it.
    pub fn seed(&self, scope: &Scope, records: Vec<EntityRecord>) {
        let handles: Vec<u64> = records.iter().map(|_| self.next_handle()).collect();
        let mut store = self.lock();
        let entries = store.scopes.entry(scope.clone()).or_default();
        for (record, handle) in records.into_iter().zip(handles) {
            entries.insert(handle, record.with_handle(handle));
        }
    }

    /// Register a reference (e.g. an IP address) held against an identity.
    pub fn add_reference(&self, identity: Identity, reference: impl Into<String>) {
        self.lock().references.push((identity, reference.into()));
    }

    /// Make every `op` on `identity` fail.
    pub fn fail_on(&self, identity: Identity, op: WriteOp) {
        self.lock().failures.insert((identity, op));
    }

    /// Make every fetch fail.
    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn has_scope(&self, scope: &Scope) -> bool {
        self.lock().scopes.contains_key(scope)
    }

    /// Records currently in a scope, ordered by identity.
    pub fn records(&self, scope: &Scope) -> Vec<EntityRecord> {
        let mut records: Vec<_> = self
            .lock()
            .scopes
            .get(scope)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        records
    }

    /// `(identity, name)` pairs of a scope, ordered by identity.
    pub fn names(&self, scope: &Scope) -> Vec<(Identity, String)> {
        self.records(scope)
            .into_iter()
            .map(|r| {
                let name = r.attributes.get_str("name").unwrap_or_default().to_string();
                (r.identity, name)
            })
            .collect()
    }

    pub fn len(&self, scope: &Scope) -> usize {
        self.lock().scopes.get(scope).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, scope: &Scope) -> bool {
        self.len(scope) == 0
    }

    /// Successful create, update and delete calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every successful operation in call order.
    pub fn operations(&self) -> Vec<(WriteOp, Identity)> {
        self.lock().operations.clone()
    }

    /// References cleared so far.
    pub fn detached_references(&self) -> Vec<String> {
        self.lock().detached.clone()
    }

    fn check(&self, store: &Store, identity: &Identity, op: WriteOp) -> Result<(), WriteError> {
        if store.failures.contains(&(identity.clone(), op)) {
            return Err(WriteError::new(identity.clone(), op, "injected failure"));
        }
        Ok(())
    }

    fn handle_of(record: &EntityRecord, op: WriteOp) -> Result<u64, WriteError> {
        record
            .handle
            .ok_or_else(|| WriteError::new(record.identity.clone(), op, "record has no handle"))
    }
}

#[async_trait]
impl InventoryGateway for InMemoryGateway {
    async fn ensure_scope(&self, scope: &Scope) -> Result<ScopeStatus, GatewayError> {
        let mut store = self.lock();
        if store.scopes.contains_key(scope) {
            return Ok(ScopeStatus::Existing);
        }
        store.scopes.insert(scope.clone(), BTreeMap::new());
        debug!(scope = %scope, "[MEMORY] Created scope");
        Ok(ScopeStatus::Created)
    }

    async fn scope_exists(&self, scope: &Scope) -> Result<bool, GatewayError> {
        Ok(self.has_scope(scope))
    }

    async fn fetch_scoped(&self, scope: &Scope) -> Result<Vec<EntityRecord>, GatewayError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(GatewayError::Fetch {
                scope: scope.clone(),
                reason: "injected failure".to_string(),
            });
        }
        let store = self.lock();
        let entries = store.scopes.get(scope).ok_or_else(|| GatewayError::ScopeMissing {
            scope: scope.clone(),
            reason: "not found".to_string(),
        })?;
        Ok(entries.values().cloned().collect())
    }

    async fn create(&self, scope: &Scope, record: &EntityRecord) -> Result<(), WriteError> {
        let handle = self.next_handle();
        let mut store = self.lock();
        self.check(&store, &record.identity, WriteOp::Create)?;
        let stored = EntityRecord {
            scope: scope.clone(),
            handle: Some(handle),
            ..record.clone()
        };
        store.scopes.entry(scope.clone()).or_default().insert(handle, stored);
        store.operations.push((WriteOp::Create, record.identity.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, current: &EntityRecord, changes: &Attributes) -> Result<(), WriteError> {
        let handle = Self::handle_of(current, WriteOp::Update)?;
        let mut store = self.lock();
        self.check(&store, &current.identity, WriteOp::Update)?;
        let stored = store
            .scopes
            .get_mut(&current.scope)
            .and_then(|entries| entries.get_mut(&handle))
            .ok_or_else(|| WriteError::new(current.identity.clone(), WriteOp::Update, "not found"))?;
        stored.attributes.merge(changes);
        store.operations.push((WriteOp::Update, current.identity.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, current: &EntityRecord) -> Result<(), WriteError> {
        let handle = Self::handle_of(current, WriteOp::Delete)?;
        let mut store = self.lock();
        self.check(&store, &current.identity, WriteOp::Delete)?;
        store
            .scopes
            .get_mut(&current.scope)
            .and_then(|entries| entries.remove(&handle))
            .ok_or_else(|| WriteError::new(current.identity.clone(), WriteOp::Delete, "not found"))?;
        store.operations.push((WriteOp::Delete, current.identity.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn detach_references(&self, current: &EntityRecord) -> Result<usize, WriteError> {
        let mut store = self.lock();
        self.check(&store, &current.identity, WriteOp::Detach)?;
        let (detached, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut store.references)
            .into_iter()
            .partition(|(identity, _)| identity == &current.identity);
        store.references = kept;
        let count = detached.len();
        store.detached.extend(detached.into_iter().map(|(_, reference)| reference));
        store.operations.push((WriteOp::Detach, current.identity.clone()));
        Ok(count)
    }
}
