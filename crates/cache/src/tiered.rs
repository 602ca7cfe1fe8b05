//! Single-node orchestrator placing entries across tiers by priority

use crate::config::{PromotionPolicy, TieredConfig};
use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strata_core::{
    Cache, CacheEntry, CacheStats, CacheTier, Result, Source, MAX_PRIORITY, MIN_PRIORITY,
};
use tracing::debug;

/// Priorities at or above this land in the memory tier.
const MEMORY_PRIORITY_THRESHOLD: u8 = 4;

/// The only tier-selection rule: memory for priority 4 and up,
/// persistent otherwise. Deterministic and pure.
pub fn select_tier(priority: u8) -> CacheTier {
    if priority >= MEMORY_PRIORITY_THRESHOLD {
        CacheTier::Memory
    } else {
        CacheTier::Persistent
    }
}

/// Hit counters broken down by the tier that answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierHits {
    pub memory: u64,
    pub sqlite: u64,
    pub api: u64,
}

/// Usage snapshot for a [`TieredCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TieredStats {
    pub hits: TierHits,
    pub misses: u64,
    pub promotions: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    sqlite_hits: AtomicU64,
    api_hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    evictions: AtomicU64,
}

/// Single entry point over the memory and SQLite tiers.
///
/// Reads probe memory first, then SQLite, then the optional upstream
/// source. Writes go through [`select_tier`]. A promotion is any write
/// that lands data in the memory tier, first writes at high priority
/// included. Tier-store errors propagate; nothing is retried here.
pub struct TieredCache {
    memory: MemoryStore,
    sqlite: SqliteStore,
    source: Option<Box<dyn Source>>,
    promotion: Option<PromotionPolicy>,
    default_priority: u8,
    counters: Counters,
}

impl TieredCache {
    pub fn open(config: TieredConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            memory: MemoryStore::new(config.memory)?,
            sqlite: SqliteStore::open(config.sqlite)?,
            source: None,
            promotion: config.promotion,
            default_priority: config.default_priority,
            counters: Counters::default(),
        })
    }

    /// Attach the upstream source of truth consulted on a full miss.
    pub fn with_source(mut self, source: Box<dyn Source>) -> Self {
        self.source = Some(source);
        self
    }

    /// Write a value with an explicit placement priority (1-5, clamped).
    pub fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        priority: u8,
    ) -> Result<()> {
        let priority = priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        let tier = select_tier(priority);
        let entry = CacheEntry::new(key, value, tier, ttl, priority);
        debug!(key, priority, tier = tier.as_str(), "placing entry");
        // A write replaces the entry wherever it currently lives; a
        // stale copy in the other tier would shadow the new value on
        // reads (directly, or after the memory copy is evicted)
        if tier == CacheTier::Memory {
            self.sqlite.remove(key)?;
            self.promote(entry);
        } else {
            self.memory.take(key);
            self.sqlite.insert(&entry)?;
        }
        Ok(())
    }

    /// Read a value, falling through memory, SQLite, and the upstream
    /// source in that order.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(entry) = self.memory.touch(key) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(entry.data));
        }

        if let Some(entry) = self.sqlite.touch(key)? {
            self.counters.sqlite_hits.fetch_add(1, Ordering::Relaxed);
            if self.should_promote(&entry) {
                let mut promoted = entry.clone();
                promoted.tier = CacheTier::Memory;
                debug!(key, access_count = entry.access_count, "promoting to memory tier");
                self.promote(promoted);
            }
            return Ok(Some(entry.data));
        }

        if let Some(source) = &self.source {
            if let Some(value) = source.fetch(key)? {
                self.counters.api_hits.fetch_add(1, Ordering::Relaxed);
                self.put(key, value.clone(), None, self.default_priority)?;
                return Ok(Some(value));
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// Usage snapshot: per-tier hits, misses, promotions, and the
    /// memory-tier evictions observed over this orchestrator's lifetime.
    pub fn get_stats(&self) -> TieredStats {
        TieredStats {
            hits: TierHits {
                memory: self.counters.memory_hits.load(Ordering::Relaxed),
                sqlite: self.counters.sqlite_hits.load(Ordering::Relaxed),
                api: self.counters.api_hits.load(Ordering::Relaxed),
            },
            misses: self.counters.misses.load(Ordering::Relaxed),
            promotions: self.counters.promotions.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Write into the memory tier, counting the promotion and any
    /// eviction it forces.
    fn promote(&self, entry: CacheEntry) {
        if self.memory.insert(entry).is_some() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.promotions.fetch_add(1, Ordering::Relaxed);
    }

    fn should_promote(&self, entry: &CacheEntry) -> bool {
        match &self.promotion {
            Some(policy) => {
                entry.priority >= policy.min_priority
                    || entry.access_count >= policy.min_access_count
            }
            None => false,
        }
    }
}

impl Cache for TieredCache {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        TieredCache::get(self, key)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        self.put(key, value, ttl, self.default_priority)?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let in_memory = self.memory.take(key).is_some();
        let in_sqlite = self.sqlite.remove(key)?;
        Ok(in_memory || in_sqlite)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.memory.peek(key).is_some() || self.sqlite.entry(key)?.is_some())
    }

    fn get_ttl(&self, key: &str) -> Result<Option<Duration>> {
        match Cache::get_ttl(&self.memory, key)? {
            Some(ttl) => Ok(Some(ttl)),
            None if self.memory.peek(key).is_some() => Ok(None),
            None => Cache::get_ttl(&self.sqlite, key),
        }
    }

    fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        // A promoted entry lives in both tiers; re-arm every copy
        let in_memory = Cache::set_ttl(&self.memory, key, ttl)?;
        let in_sqlite = Cache::set_ttl(&self.sqlite, key, ttl)?;
        Ok(in_memory || in_sqlite)
    }

    fn clear(&self) -> Result<bool> {
        self.memory.purge();
        self.sqlite.purge()?;
        Ok(true)
    }

    fn stats(&self) -> Result<CacheStats> {
        let memory = Cache::stats(&self.memory)?;
        let sqlite = Cache::stats(&self.sqlite)?;
        let snapshot = self.get_stats();
        Ok(CacheStats {
            entries: memory.entries + sqlite.entries,
            size_bytes: memory.size_bytes + sqlite.size_bytes,
            hits: snapshot.hits.memory + snapshot.hits.sqlite,
            // An api hit is a cache miss satisfied upstream
            misses: snapshot.misses + snapshot.hits.api,
        })
    }

    fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let mut keys: BTreeSet<String> = self.memory.keys(pattern)?.into_iter().collect();
        keys.extend(Cache::keys(&self.sqlite, pattern)?);
        Ok(keys.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryConfig, SqliteConfig};
    use serde_json::json;
    use tempfile::TempDir;

    fn open_cache(dir: &TempDir) -> TieredCache {
        TieredCache::open(TieredConfig {
            memory: MemoryConfig { max_items: 4 },
            sqlite: SqliteConfig {
                path: dir.path().join("cache.db"),
            },
            default_priority: 3,
            promotion: Some(PromotionPolicy {
                min_priority: 4,
                min_access_count: 3,
            }),
        })
        .unwrap()
    }

    #[test]
    fn test_select_tier_over_all_priorities() {
        for priority in 1..=3 {
            assert_eq!(select_tier(priority), CacheTier::Persistent);
        }
        for priority in 4..=5 {
            assert_eq!(select_tier(priority), CacheTier::Memory);
        }
    }

    #[test]
    fn test_high_priority_put_hits_memory() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache.put("k", json!("v"), None, 5).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(json!("v")));

        let stats = cache.get_stats();
        assert_eq!(stats.hits.memory, 1);
        assert_eq!(stats.promotions, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_low_priority_put_hits_sqlite() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache.put("k", json!("v"), None, 2).unwrap();
        assert!(cache.memory.peek("k").is_none());
        assert_eq!(cache.get("k").unwrap(), Some(json!("v")));

        let stats = cache.get_stats();
        assert_eq!(stats.hits.memory, 0);
        assert_eq!(stats.hits.sqlite, 1);
    }

    #[test]
    fn test_promotion_after_access_threshold() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache.put("hot", json!(1), None, 2).unwrap();

        // Third read crosses min_access_count and lands a memory copy
        cache.get("hot").unwrap();
        cache.get("hot").unwrap();
        assert!(cache.memory.peek("hot").is_none());
        cache.get("hot").unwrap();
        assert!(cache.memory.peek("hot").is_some());

        let stats = cache.get_stats();
        assert_eq!(stats.promotions, 1);
        assert_eq!(stats.hits.sqlite, 3);
        assert_eq!(cache.get_stats().hits.memory, 0);

        cache.get("hot").unwrap();
        assert_eq!(cache.get_stats().hits.memory, 1);
    }

    #[test]
    fn test_no_promotion_without_policy() {
        let dir = TempDir::new().unwrap();
        let cache = TieredCache::open(TieredConfig {
            memory: MemoryConfig { max_items: 4 },
            sqlite: SqliteConfig {
                path: dir.path().join("cache.db"),
            },
            default_priority: 3,
            promotion: None,
        })
        .unwrap();
        cache.put("k", json!(1), None, 2).unwrap();
        for _ in 0..5 {
            cache.get("k").unwrap();
        }
        assert!(cache.memory.peek("k").is_none());
        assert_eq!(cache.get_stats().hits.sqlite, 5);
        assert_eq!(cache.get_stats().promotions, 0);
    }

    #[test]
    fn test_miss_without_source_counts_miss() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        assert_eq!(cache.get("nope").unwrap(), None);
        let stats = cache.get_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits.api, 0);
    }

    struct FixedSource {
        calls: AtomicU64,
    }

    impl Source for FixedSource {
        fn fetch(&self, key: &str) -> Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if key == "known" {
                Ok(Some(json!({"from": "api"})))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn test_full_miss_delegates_to_source() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir).with_source(Box::new(FixedSource {
            calls: AtomicU64::new(0),
        }));

        assert_eq!(cache.get("known").unwrap(), Some(json!({"from": "api"})));
        assert_eq!(cache.get_stats().hits.api, 1);

        // Now cached at the default priority; the source is not asked again
        assert_eq!(cache.get("known").unwrap(), Some(json!({"from": "api"})));
        assert_eq!(cache.get_stats().hits.sqlite, 1);
        assert_eq!(cache.get_stats().hits.api, 1);

        assert_eq!(cache.get("unknown").unwrap(), None);
        assert_eq!(cache.get_stats().misses, 1);
    }

    #[test]
    fn test_eviction_counter_aggregates_memory_evictions() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        for i in 0..6 {
            cache.put(&format!("k{i}"), json!(i), None, 5).unwrap();
        }
        let stats = cache.get_stats();
        assert_eq!(stats.promotions, 6);
        assert_eq!(stats.evictions, 2);
    }

    #[test]
    fn test_overwrite_after_promotion_serves_latest_value() {
        let dir = TempDir::new().unwrap();
        let cache = TieredCache::open(TieredConfig {
            memory: MemoryConfig { max_items: 4 },
            sqlite: SqliteConfig {
                path: dir.path().join("cache.db"),
            },
            default_priority: 2,
            promotion: Some(PromotionPolicy {
                min_priority: 4,
                min_access_count: 1,
            }),
        })
        .unwrap();

        Cache::set(&cache, "k", json!("v1"), None).unwrap();
        // The first read promotes a memory copy of v1
        assert_eq!(cache.get("k").unwrap(), Some(json!("v1")));
        assert!(cache.memory.peek("k").is_some());

        // A low-priority overwrite must not be shadowed by that copy
        Cache::set(&cache, "k", json!("v2"), None).unwrap();
        assert!(cache.memory.peek("k").is_none());
        assert_eq!(cache.get("k").unwrap(), Some(json!("v2")));
    }

    #[test]
    fn test_overwrite_across_tiers_leaves_one_copy() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache.put("k", json!("old"), None, 1).unwrap();
        cache.put("k", json!("new"), None, 5).unwrap();

        // The persistent row is gone, so losing the memory copy cannot
        // resurface the old value
        assert!(cache.sqlite.entry("k").unwrap().is_none());
        cache.memory.take("k");
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_delete_spans_both_tiers() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache.put("mem", json!(1), None, 5).unwrap();
        cache.put("disk", json!(2), None, 1).unwrap();

        assert!(Cache::delete(&cache, "mem").unwrap());
        assert!(Cache::delete(&cache, "disk").unwrap());
        assert!(!Cache::delete(&cache, "disk").unwrap());
        assert!(!Cache::exists(&cache, "mem").unwrap());
    }

    #[test]
    fn test_keys_union_and_trait_stats() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&dir);
        cache.put("mem:1", json!(1), None, 5).unwrap();
        cache.put("disk:1", json!(2), None, 1).unwrap();

        assert_eq!(
            Cache::keys(&cache, None).unwrap(),
            vec!["disk:1", "mem:1"]
        );

        cache.get("mem:1").unwrap();
        cache.get("missing").unwrap();
        let stats = Cache::stats(&cache).unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
