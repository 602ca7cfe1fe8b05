//! Bounded in-memory tier with least-recently-used eviction

use crate::config::MemoryConfig;
use crate::keys::filter_keys;
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strata_core::{Cache, CacheEntry, CacheStats, CacheTier, Result, MAX_PRIORITY};
use tracing::{debug, trace};

/// Fastest tier: bounded by item count, evicting the entry with the
/// smallest `last_access` when full.
///
/// The backing map keeps insertion order, so eviction ties break
/// deterministically in favor of the oldest insertion. One mutex guards
/// all state; operations never fail.
pub struct MemoryStore {
    max_items: usize,
    entries: Mutex<IndexMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            max_items: config.max_items,
            entries: Mutex::new(IndexMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    pub fn with_max_items(max_items: usize) -> Result<Self> {
        Self::new(MemoryConfig { max_items })
    }

    /// Look up an entry without touching its access statistics.
    ///
    /// An expired entry is dropped and reported absent.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        if Self::drop_if_expired(&mut entries, key, now) {
            return None;
        }
        entries.get(key).cloned()
    }

    /// Look up an entry and record the access: bumps `access_count`
    /// and `last_access` in place, returning the updated entry.
    pub fn touch(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        if Self::drop_if_expired(&mut entries, key, now) {
            return None;
        }
        entries.get_mut(key).map(|entry| {
            entry.touch(now);
            entry.clone()
        })
    }

    /// Remove the key if its entry has expired. Returns whether it did.
    fn drop_if_expired(
        entries: &mut IndexMap<String, CacheEntry>,
        key: &str,
        now: chrono::DateTime<Utc>,
    ) -> bool {
        let expired = matches!(entries.get(key), Some(entry) if entry.is_expired(now));
        if expired {
            trace!(key, "dropping expired entry");
            entries.shift_remove(key);
        }
        expired
    }

    /// Insert an entry, overwriting any existing one for the key.
    ///
    /// When the store is at capacity and the key is new, the entry with
    /// the smallest `last_access` is evicted first; the evicted key is
    /// returned so orchestrators can count it.
    pub fn insert(&self, entry: CacheEntry) -> Option<String> {
        let mut entries = self.entries.lock();
        let mut evicted = None;
        if !entries.contains_key(&entry.key) && entries.len() >= self.max_items {
            let victim = entries
                .values()
                .min_by_key(|e| e.last_access)
                .map(|e| e.key.clone());
            if let Some(victim) = victim {
                entries.shift_remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %victim, "evicted least recently used entry");
                evicted = Some(victim);
            }
        }
        entries.insert(entry.key.clone(), entry);
        evicted
    }

    /// Remove and return an entry.
    pub fn take(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().shift_remove(key)
    }

    /// Drop all entries.
    pub fn purge(&self) {
        self.entries.lock().clear();
    }

    /// Exact live entry count; never exceeds `max_items`.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evictions performed since construction.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl Cache for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.touch(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.data))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        // Anything written directly to this store lives in memory, so
        // it carries the memory-worthy priority.
        let entry = CacheEntry::new(key, value, CacheTier::Memory, ttl, MAX_PRIORITY);
        self.insert(entry);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.take(key).is_some())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.peek(key).is_some())
    }

    fn get_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Utc::now();
        Ok(self.peek(key).and_then(|e| e.remaining_ttl(now)))
    }

    fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        if Self::drop_if_expired(&mut entries, key, now) {
            return Ok(false);
        }
        Ok(match entries.get_mut(key) {
            Some(entry) => {
                entry.extend_ttl(now, ttl);
                true
            }
            None => false,
        })
    }

    fn clear(&self) -> Result<bool> {
        self.purge();
        Ok(true)
    }

    fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries.lock();
        Ok(CacheStats {
            entries: entries.len() as u64,
            size_bytes: entries.values().map(|e| e.payload_size()).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }

    fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let now = Utc::now();
        let live: Vec<String> = self
            .entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();
        filter_keys(live, pattern)
    }
}
