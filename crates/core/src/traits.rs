//! Capability contract implemented by every cache component

use crate::errors::Result;
use crate::stats::CacheStats;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// The cache capability contract.
///
/// Implemented uniformly by the memory tier store, the persistent tier
/// store, the tiered orchestrator, and the layered and distributed
/// compositions, so any of them can stand in as a layer or a node of
/// another (composite pattern). The trait is object safe; compositions
/// hold `Arc<dyn Cache>`.
///
/// Multi-key operations default to key-at-a-time loops; compositions
/// override them with batched fan-out. Their boolean results are the
/// logical AND across keys: `false` means "not all succeeded", and no
/// partial success is rolled back.
pub trait Cache: Send + Sync {
    /// Read a value. A successful read updates the entry's access
    /// statistics; expired entries are treated as absent.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value, overwriting any existing entry for the key.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool>;

    /// Remove a key. Returns whether an entry was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Whether a live (non-expired) entry exists, without touching
    /// access statistics.
    fn exists(&self, key: &str) -> Result<bool>;

    /// Remaining time until expiry, or `None` when the key is absent
    /// or carries no ttl.
    fn get_ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Re-arm the key's expiry to `ttl` from now. Returns whether an
    /// entry was updated.
    fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Drop all entries.
    fn clear(&self) -> Result<bool>;

    /// Usage statistics snapshot.
    fn stats(&self) -> Result<CacheStats>;

    /// Keys of live entries, optionally filtered by a glob pattern.
    fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>>;

    /// Read several keys; absent keys are simply missing from the map.
    fn get_multiple(&self, keys: &[String]) -> Result<BTreeMap<String, Value>> {
        let mut found = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Write several entries with one shared ttl.
    fn set_multiple(&self, items: &BTreeMap<String, Value>, ttl: Option<Duration>) -> Result<bool> {
        let mut all = true;
        for (key, value) in items {
            all &= self.set(key, value.clone(), ttl)?;
        }
        Ok(all)
    }

    /// Remove several keys.
    fn delete_multiple(&self, keys: &[String]) -> Result<bool> {
        let mut all = true;
        for key in keys {
            all &= self.delete(key)?;
        }
        Ok(all)
    }
}

impl std::fmt::Debug for dyn Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Cache")
    }
}

/// Upstream source of truth consulted on a full miss.
///
/// Opaque to the engine: it receives a key and answers with a value,
/// nothing (`None`), or an error. Typically backed by the vendor HTTP
/// client outside this crate.
pub trait Source: Send + Sync {
    fn fetch(&self, key: &str) -> Result<Option<Value>>;
}
