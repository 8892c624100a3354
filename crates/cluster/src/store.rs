//! Storage layer consumed by a cache.
//!
//! Placement never calls a store directly: the owners it computes decide
//! which node's store a request ends up in. What the cache layer needs is a
//! small key/value surface plus a way to wipe everything when a cache is
//! removed from the cluster.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{StoreConfig, StoreOptions};
use crate::error::StoreError;

/// Key/value store holding the entries of one cache on this node.
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    /// Stores `value`; with a `lifespan` the entry expires after that long.
    fn put(&self, key: Bytes, value: Bytes, lifespan: Option<Duration>) -> Result<(), StoreError>;

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError>;

    /// Returns whether an entry was removed.
    fn remove(&self, key: &[u8]) -> Result<bool, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;

    /// Visits every live entry.
    fn for_each(&self, visitor: &mut dyn FnMut(&Bytes, &Bytes)) -> Result<(), StoreError>;

    fn size(&self) -> usize;

    /// Removes expired entries and returns how many were dropped.
    fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// Which store implementation backs a cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Best backend available on this node.
    #[default]
    Auto,
    Memory,
}

impl StoreBackend {
    /// Instantiates the backend once; callers share the result.
    pub fn resolve(self, name: &str, options: &StoreOptions) -> Arc<dyn Store> {
        match self {
            StoreBackend::Auto | StoreBackend::Memory => {
                debug!(store = name, backend = ?self, "using in-memory store");
                Arc::new(MemoryStore::new(name, options.clone()))
            }
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type EntryMap = DashMap<Bytes, Entry>;

/// In-memory [`Store`] on a concurrent hash map.
///
/// Expired entries are dropped lazily by `get` and in batches by
/// [`purge_expired`](Store::purge_expired).
pub struct MemoryStore {
    name: String,
    options: StoreOptions,
    entries: ArcSwap<EntryMap>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>, options: StoreOptions) -> Self {
        Self {
            name: name.into(),
            options,
            entries: ArcSwap::from_pointee(DashMap::new()),
        }
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn put(&self, key: Bytes, value: Bytes, lifespan: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = lifespan.map(|l| Instant::now() + l);
        self.entries.load().insert(key, Entry { value, expires_at });
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let entries = self.entries.load();
        let now = Instant::now();
        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        entries.remove_if(key, |_, e| e.is_expired(now));
        Ok(None)
    }

    fn remove(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.entries.load().remove(key).is_some())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let entries = self.entries.load();
        let size = entries.len();
        if size > self.options.clear_threshold {
            self.entries.store(Arc::new(DashMap::new()));
        } else {
            entries.retain(|_, _| false);
        }
        debug!(store = %self.name, size, "cleared store");
        Ok(())
    }

    fn for_each(&self, visitor: &mut dyn FnMut(&Bytes, &Bytes)) -> Result<(), StoreError> {
        let now = Instant::now();
        for entry in self.entries.load().iter() {
            if !entry.value().is_expired(now) {
                visitor(entry.key(), &entry.value().value);
            }
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.entries.load().len()
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let entries = self.entries.load();
        let now = Instant::now();
        let expired: Vec<Bytes> = entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .take(self.options.expiry_batch)
            .collect();

        let mut purged = 0;
        for key in expired {
            if entries.remove_if(&key, |_, e| e.is_expired(now)).is_some() {
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(store = %self.name, purged, "purged expired entries");
        }
        Ok(purged)
    }
}

/// Stores attached to one cache.
pub struct PersistenceManager {
    stores: Vec<Arc<dyn Store>>,
    options: StoreOptions,
}

impl PersistenceManager {
    pub fn new(stores: Vec<Arc<dyn Store>>, options: StoreOptions) -> Self {
        Self { stores, options }
    }

    pub fn from_config(cache: &str, config: &StoreConfig) -> Self {
        let store = config.backend.resolve(cache, &config.options);
        Self::new(vec![store], config.options.clone())
    }

    pub fn stores(&self) -> &[Arc<dyn Store>] {
        &self.stores
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Store that writes go through to.
    pub fn primary(&self) -> Option<&Arc<dyn Store>> {
        self.stores.first()
    }

    /// Clears every store, even after one of them fails.
    ///
    /// Each failure is logged; the first one is returned.
    pub fn clear_all_stores(&self) -> Result<(), StoreError> {
        let mut first = None;
        for store in &self.stores {
            if let Err(e) = store.clear() {
                warn!(store = store.name(), error = %e, "failed to clear store");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Runs one expiry sweep over every store.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut purged = 0;
        for store in &self.stores {
            purged += store.purge_expired()?;
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(clear_threshold: usize, expiry_batch: usize) -> MemoryStore {
        MemoryStore::new(
            "test",
            StoreOptions {
                clear_threshold,
                expiry_batch,
                ..StoreOptions::default()
            },
        )
    }

    #[test]
    fn test_put_get_remove() {
        let store = store(10, 10);
        store.put(Bytes::from("k"), Bytes::from("v"), None).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(Bytes::from("v")));
        assert!(store.remove(b"k").unwrap());
        assert!(!store.remove(b"k").unwrap());
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_expired_entry_is_invisible() {
        let store = store(10, 10);
        store.put(Bytes::from("gone"), Bytes::from("v"), Some(Duration::ZERO)).unwrap();
        store.put(Bytes::from("kept"), Bytes::from("v"), None).unwrap();

        assert_eq!(store.get(b"gone").unwrap(), None);
        assert_eq!(store.size(), 1);

        let mut seen = Vec::new();
        store.for_each(&mut |k, _| seen.push(k.clone())).unwrap();
        assert_eq!(seen, vec![Bytes::from("kept")]);
    }

    #[test]
    fn test_purge_respects_batch_size() {
        let store = store(10, 2);
        for i in 0..5 {
            store
                .put(Bytes::from(format!("k{i}")), Bytes::from("v"), Some(Duration::ZERO))
                .unwrap();
        }
        assert_eq!(store.purge_expired().unwrap(), 2);
        assert_eq!(store.purge_expired().unwrap(), 2);
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn test_clear_above_and_below_threshold() {
        for threshold in [0, 100] {
            let store = store(threshold, 10);
            for i in 0..10 {
                store.put(Bytes::from(format!("k{i}")), Bytes::from("v"), None).unwrap();
            }
            store.clear().unwrap();
            assert_eq!(store.size(), 0);
        }
    }

    #[test]
    fn test_auto_backend_resolves() {
        let store = StoreBackend::Auto.resolve("cache", &StoreOptions::default());
        assert_eq!(store.name(), "cache");
        assert_eq!(store.size(), 0);
    }
}
