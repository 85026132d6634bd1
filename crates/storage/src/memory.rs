use std::sync::{Arc, Mutex, MutexGuard};

use snapshot::Snapshot;

use crate::{RunRecord, SnapshotStore, StoreError};

#[derive(Default)]
struct Inner {
    snapshot: Snapshot,
    saves: usize,
    runs: Vec<RunRecord>,
}

/// Process-local store. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let store = Self::new();
        store.lock().snapshot = snapshot;
        store
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot.clone()
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.lock().runs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.snapshot = snapshot.clone();
        inner.saves += 1;
        Ok(())
    }

    async fn record_run(&self, record: &RunRecord) -> Result<(), StoreError> {
        self.lock().runs.push(record.clone());
        Ok(())
    }
}
