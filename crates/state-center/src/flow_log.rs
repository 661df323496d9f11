use std::collections::VecDeque;
use std::sync::Arc;

use listing_core_types::{now_epoch_ms, LockScope};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::StoreError;
use crate::store::KvStore;

pub const DEFAULT_LOG_CAPACITY: usize = 200;

const LOG_KEY: &str = "flowlog";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowLogEntry {
    pub timestamp_ms: i64,
    pub step: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug)]
struct BoundedRing<T> {
    capacity: usize,
    data: VecDeque<T>,
}

impl<T> BoundedRing<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            data: VecDeque::new(),
        }
    }
}

impl<T: Clone> BoundedRing<T> {
    fn push(&mut self, item: T) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    fn snapshot(&self) -> Vec<T> {
        self.data.iter().cloned().collect()
    }
}

/// Append-only diagnostics record for one scope.
///
/// Every append is written through to the store so the record outlives the
/// execution context that produced it (navigation tears contexts down).
pub struct FlowLog {
    scope: LockScope,
    store: Arc<dyn KvStore>,
    local: Mutex<BoundedRing<FlowLogEntry>>,
    capacity: usize,
}

impl FlowLog {
    pub fn new(store: Arc<dyn KvStore>, scope: LockScope, capacity: usize) -> Self {
        Self {
            scope,
            store,
            local: Mutex::new(BoundedRing::new(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    /// Records a named step. Store failures degrade to the local mirror.
    pub async fn append(&self, step: &str, payload: Value) {
        let entry = FlowLogEntry {
            timestamp_ms: now_epoch_ms(),
            step: step.to_string(),
            payload,
        };
        self.local.lock().push(entry.clone());
        if let Err(err) = self.persist(entry).await {
            warn!(scope = %self.scope, step, "diagnostics log not persisted: {}", err);
        }
    }

    async fn persist(&self, entry: FlowLogEntry) -> Result<(), StoreError> {
        let key = self.scope.key(LOG_KEY);
        let mut ring = BoundedRing::new(self.capacity);
        ring.extend(load_entries(self.store.as_ref(), &key).await?);
        ring.push(entry);
        self.store
            .set(&key, serde_json::to_value(ring.snapshot())?)
            .await
    }

    /// Entries appended through this handle (most recent `capacity`).
    pub fn local_entries(&self) -> Vec<FlowLogEntry> {
        self.local.lock().snapshot()
    }

    /// Persisted entries for the scope, merged across contexts.
    pub async fn entries(&self) -> Vec<FlowLogEntry> {
        match load(self.store.as_ref(), &self.scope).await {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => self.local_entries(),
            Err(err) => {
                warn!(scope = %self.scope, "diagnostics log unreadable: {}", err);
                self.local_entries()
            }
        }
    }
}

/// Reads the persisted log of a scope.
pub async fn load(store: &dyn KvStore, scope: &LockScope) -> Result<Vec<FlowLogEntry>, StoreError> {
    load_entries(store, &scope.key(LOG_KEY)).await
}

async fn load_entries(store: &dyn KvStore, key: &str) -> Result<Vec<FlowLogEntry>, StoreError> {
    match store.get(key).await? {
        Some(stored) => Ok(serde_json::from_value(stored.value)?),
        None => Ok(Vec::new()),
    }
}
