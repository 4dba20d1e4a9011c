//! In-memory implementation of the store contract.
//!
//! Suitable for coordinating tasks and threads inside one process, and for
//! tests. Transactions take the store-wide lock for their whole lifetime, so
//! they are serializable; a single-key operation issued while a transaction
//! is open waits for it (or times out when `retry` is false).
//!
//! Expiry is lazy: expired entries read as absent and are physically removed
//! by the next write to the key, by a sweep every
//! [`PURGE_INTERVAL_WRITES`] writes, by `evict` and `len`, or by
//! [`InMemoryStore::purge_expired`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::trace;

use crate::config::WriteOptions;
use crate::constants::DEFAULT_BUSY_TIMEOUT_MS;
use crate::constants::PURGE_INTERVAL_WRITES;
use crate::error::StoreError;
use crate::store::KeyValueStore;
use crate::store::Transaction;

/// Stored value with its write metadata.
#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Option<Instant>,
    tag: Option<String>,
}

impl StoredEntry {
    fn new(value: String, options: &WriteOptions, now: Instant) -> Self {
        Self {
            value,
            expires_at: options.expire().map(|ttl| now + ttl),
            tag: options.tag.clone(),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

#[derive(Debug, Default)]
struct Entries {
    data: BTreeMap<String, StoredEntry>,
    /// Writes since the last sweep.
    writes_since_purge: u64,
}

impl Entries {
    fn get(&self, key: &str, now: Instant) -> Option<&StoredEntry> {
        self.data.get(key).filter(|entry| entry.is_live(now))
    }

    fn insert(&mut self, key: &str, entry: StoredEntry) {
        self.data.insert(key.to_string(), entry);
    }

    /// Drop every expired entry. Returns how many were dropped.
    fn purge(&mut self, now: Instant) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| entry.is_live(now));
        self.writes_since_purge = 0;
        before - self.data.len()
    }

    /// Count a write and sweep once enough have accumulated.
    fn record_write(&mut self, now: Instant) {
        self.writes_since_purge += 1;
        if self.writes_since_purge >= PURGE_INTERVAL_WRITES {
            let purged = self.purge(now);
            trace!(purged, remaining = self.data.len(), "swept expired entries");
        }
    }

    /// Remove a key, reporting the entry only if it was still live.
    fn remove(&mut self, key: &str, now: Instant) -> Option<StoredEntry> {
        self.data.remove(key).filter(|entry| entry.is_live(now))
    }
}

/// A process-local store implementing [`KeyValueStore`].
#[derive(Debug)]
pub struct InMemoryStore {
    entries: Arc<Mutex<Entries>>,
    busy_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new_inner(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }
}

impl InMemoryStore {
    /// Create a new store wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a store that reports [`StoreError::Timeout`] after waiting
    /// `busy_timeout` for a busy store (when `retry` is false).
    pub fn with_busy_timeout(busy_timeout: Duration) -> Arc<Self> {
        Arc::new(Self::new_inner(busy_timeout))
    }

    fn new_inner(busy_timeout: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries::default())),
            busy_timeout,
        }
    }

    async fn lock(&self, retry: bool) -> Result<OwnedMutexGuard<Entries>, StoreError> {
        loop {
            match tokio::time::timeout(self.busy_timeout, Arc::clone(&self.entries).lock_owned()).await {
                Ok(guard) => return Ok(guard),
                Err(_) if retry => {
                    trace!(busy_timeout_ms = self.busy_timeout.as_millis() as u64, "store busy, retrying");
                }
                Err(_) => {
                    return Err(StoreError::Timeout {
                        duration_ms: self.busy_timeout.as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Remove every live entry written with `tag`. Returns how many were removed.
    ///
    /// Expired entries are dropped along the way but not counted.
    pub async fn evict(&self, tag: &str) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.purge(now);
        let before = entries.data.len();
        entries.data.retain(|_, entry| entry.tag.as_deref() != Some(tag));
        before - entries.data.len()
    }

    /// Physically remove expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        entries.purge(Instant::now())
    }

    /// Number of live entries. Drops expired ones first.
    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        entries.purge(Instant::now());
        entries.data.len()
    }

    /// Whether the store holds no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str, retry: bool) -> Result<Option<String>, StoreError> {
        let entries = self.lock(retry).await?;
        Ok(entries.get(key, Instant::now()).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, options: &WriteOptions, retry: bool) -> Result<bool, StoreError> {
        let mut entries = self.lock(retry).await?;
        let now = Instant::now();
        entries.insert(key, StoredEntry::new(value, options, now));
        entries.record_write(now);
        Ok(true)
    }

    async fn add(&self, key: &str, value: String, options: &WriteOptions, retry: bool) -> Result<bool, StoreError> {
        let mut entries = self.lock(retry).await?;
        let now = Instant::now();
        if entries.get(key, now).is_some() {
            return Ok(false);
        }
        entries.insert(key, StoredEntry::new(value, options, now));
        entries.record_write(now);
        Ok(true)
    }

    async fn delete(&self, key: &str, retry: bool) -> Result<bool, StoreError> {
        let mut entries = self.lock(retry).await?;
        Ok(entries.remove(key, Instant::now()).is_some())
    }

    async fn pop(&self, key: &str, retry: bool) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock(retry).await?;
        Ok(entries.remove(key, Instant::now()).map(|entry| entry.value))
    }

    async fn transact(&self, retry: bool) -> Result<Box<dyn Transaction>, StoreError> {
        let entries = self.lock(retry).await?;
        Ok(Box::new(InMemoryTransaction {
            entries,
            staged: BTreeMap::new(),
        }))
    }
}

/// Transaction over an [`InMemoryStore`]. Holds the store lock until it ends.
struct InMemoryTransaction {
    entries: OwnedMutexGuard<Entries>,
    /// `None` stages a delete.
    staged: BTreeMap<String, Option<StoredEntry>>,
}

impl InMemoryTransaction {
    fn read(&self, key: &str) -> Option<&StoredEntry> {
        let now = Instant::now();
        match self.staged.get(key) {
            Some(staged) => staged.as_ref().filter(|entry| entry.is_live(now)),
            None => self.entries.get(key, now),
        }
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(key).map(|entry| entry.value.clone()))
    }

    async fn set(&mut self, key: &str, value: String, options: &WriteOptions) -> Result<(), StoreError> {
        self.staged.insert(key.to_string(), Some(StoredEntry::new(value, options, Instant::now())));
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        let existed = self.read(key).is_some();
        self.staged.insert(key.to_string(), None);
        Ok(existed)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction { mut entries, staged } = *self;
        let wrote = !staged.is_empty();
        for (key, op) in staged {
            match op {
                Some(entry) => {
                    entries.data.insert(key, entry);
                }
                None => {
                    entries.data.remove(&key);
                }
            }
        }
        if wrote {
            entries.record_write(Instant::now());
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
