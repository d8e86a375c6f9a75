//! In-memory sync store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::destination::DestinationWrite;
use crate::error::StoreError;
use crate::lock::{KeyedGuard, KeyedLocks};
use crate::record::SyncRecord;
use crate::store::{SyncStore, SyncUnit};

#[derive(Debug, Default)]
struct Inner {
    // Key: sf_id
    records: RwLock<HashMap<String, SyncRecord>>,
    writes: RwLock<Vec<DestinationWrite>>,
    write_failure: RwLock<Option<String>>,
    next_write_failure: RwLock<Option<String>>,
    begin_failure: RwLock<Option<String>>,
    write_delay: RwLock<Option<Duration>>,
    next_id: AtomicI64,
    open_units: AtomicUsize,
    peak_units: AtomicUsize,
    // Stands in for the per-record database lock.
    unit_locks: KeyedLocks,
}

impl Inner {
    fn persist(&self, record: &SyncRecord) -> SyncRecord {
        let mut records = self.records.write().expect("lock poisoned");
        let id = records
            .get(&record.sf_id)
            .and_then(|existing| existing.id)
            .unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::SeqCst) + 1);

        let mut saved = record.clone();
        saved.id = Some(id);
        records.insert(saved.sf_id.clone(), saved.clone());
        saved
    }
}

/// In-memory implementation of `SyncStore` for testing.
///
/// Destination writes become visible only when their unit commits. Units on
/// the same lock key are exclusive across every engine sharing the store.
/// Failures and latency can be injected per store.
#[derive(Debug, Clone, Default)]
pub struct InMemorySyncStore {
    inner: Arc<Inner>,
}

impl InMemorySyncStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make destination writes fail with `cause` (`None` to heal).
    pub fn set_write_failure(&self, cause: Option<String>) {
        *self.inner.write_failure.write().expect("lock poisoned") = cause;
    }

    /// Make only the next destination write fail with `cause`.
    pub fn fail_next_write(&self, cause: impl Into<String>) {
        *self.inner.next_write_failure.write().expect("lock poisoned") = Some(cause.into());
    }

    /// Make only the next attempt to open a unit fail with `cause`.
    pub fn fail_next_begin(&self, cause: impl Into<String>) {
        *self.inner.begin_failure.write().expect("lock poisoned") = Some(cause.into());
    }

    /// Delay every destination write.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.inner.write_delay.write().expect("lock poisoned") = delay;
    }

    /// Committed destination writes (for testing).
    pub fn writes(&self) -> Vec<DestinationWrite> {
        self.inner.writes.read().expect("lock poisoned").clone()
    }

    /// All records (for testing).
    pub fn records(&self) -> Vec<SyncRecord> {
        self.inner
            .records
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Highest number of units open at the same time (for testing).
    pub fn peak_open_units(&self) -> usize {
        self.inner.peak_units.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncStore for InMemorySyncStore {
    async fn begin(&self, lock_key: &str) -> Result<Box<dyn SyncUnit>, StoreError> {
        let failure = self.inner.begin_failure.write().expect("lock poisoned").take();
        if let Some(cause) = failure {
            return Err(StoreError::Unavailable(cause));
        }

        let guard = self.inner.unit_locks.lock(lock_key).await;
        let open = self.inner.open_units.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_units.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(InMemorySyncUnit {
            inner: Arc::clone(&self.inner),
            writes: Vec::new(),
            _guard: guard,
        }))
    }

    async fn find_by_sf_id(&self, sf_id: &str) -> Result<Option<SyncRecord>, StoreError> {
        Ok(self
            .inner
            .records
            .read()
            .expect("lock poisoned")
            .get(sf_id)
            .cloned())
    }
}

struct InMemorySyncUnit {
    inner: Arc<Inner>,
    writes: Vec<DestinationWrite>,
    _guard: KeyedGuard,
}

impl Drop for InMemorySyncUnit {
    fn drop(&mut self) {
        self.inner.open_units.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncUnit for InMemorySyncUnit {
    async fn stage(&mut self, _record: &SyncRecord) -> Result<(), StoreError> {
        Ok(())
    }

    async fn execute(&mut self, write: &DestinationWrite) -> Result<u64, StoreError> {
        let delay = *self.inner.write_delay.read().expect("lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let one_shot = self.inner.next_write_failure.write().expect("lock poisoned").take();
        let failure = one_shot.or_else(|| self.inner.write_failure.read().expect("lock poisoned").clone());
        if let Some(cause) = failure {
            return Err(StoreError::Unavailable(cause));
        }

        self.writes.push(write.clone());
        Ok(1)
    }

    async fn commit(mut self: Box<Self>, record: &SyncRecord) -> Result<SyncRecord, StoreError> {
        let saved = self.inner.persist(record);
        let writes = std::mem::take(&mut self.writes);
        self.inner
            .writes
            .write()
            .expect("lock poisoned")
            .extend(writes);
        Ok(saved)
    }

    async fn fail(self: Box<Self>, record: &SyncRecord) -> Result<SyncRecord, StoreError> {
        Ok(self.inner.persist(record))
    }
}
