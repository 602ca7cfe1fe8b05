//! Fastest-to-slowest layer composition with back-fill

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Cache, CacheStats, Error, Result};
use tracing::trace;

/// Composes an ordered list of caches, fastest first, behind one
/// [`Cache`] interface.
///
/// Reads fall through and back-fill every faster layer on a hit.
/// Writes fan out to all layers and AND their results; partial success
/// is never rolled back, and a layer error aborts the remaining
/// fan-out for that call.
pub struct LayeredCache {
    layers: Vec<Arc<dyn Cache>>,
}

impl LayeredCache {
    pub fn new(layers: Vec<Arc<dyn Cache>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::configuration(
                "layered cache",
                "at least one layer is required",
            ));
        }
        Ok(Self { layers })
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Copy a value found at `hit_layer` into every faster layer,
    /// carrying the ttl observed where it was found.
    fn back_fill(&self, key: &str, value: &Value, hit_layer: usize) -> Result<()> {
        let ttl = self.layers[hit_layer].get_ttl(key)?;
        for faster in &self.layers[..hit_layer] {
            faster.set(key, value.clone(), ttl)?;
        }
        trace!(key, hit_layer, "back-filled faster layers");
        Ok(())
    }
}

impl Cache for LayeredCache {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        for (i, layer) in self.layers.iter().enumerate() {
            if let Some(value) = layer.get(key)? {
                if i > 0 {
                    self.back_fill(key, &value, i)?;
                }
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let mut all = true;
        for layer in &self.layers {
            all &= layer.set(key, value.clone(), ttl)?;
        }
        Ok(all)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut all = true;
        for layer in &self.layers {
            all &= layer.delete(key)?;
        }
        Ok(all)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        for layer in &self.layers {
            if layer.exists(key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get_ttl(&self, key: &str) -> Result<Option<Duration>> {
        for layer in &self.layers {
            if let Some(ttl) = layer.get_ttl(key)? {
                return Ok(Some(ttl));
            }
        }
        Ok(None)
    }

    fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut all = true;
        for layer in &self.layers {
            all &= layer.set_ttl(key, ttl)?;
        }
        Ok(all)
    }

    fn clear(&self) -> Result<bool> {
        let mut all = true;
        for layer in &self.layers {
            all &= layer.clear()?;
        }
        Ok(all)
    }

    fn stats(&self) -> Result<CacheStats> {
        let mut total = CacheStats::default();
        for layer in &self.layers {
            total.merge(&layer.stats()?);
        }
        Ok(total)
    }

    fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let mut keys = BTreeSet::new();
        for layer in &self.layers {
            keys.extend(layer.keys(pattern)?);
        }
        Ok(keys.into_iter().collect())
    }

    fn get_multiple(&self, keys: &[String]) -> Result<BTreeMap<String, Value>> {
        let mut remaining: Vec<String> = keys.to_vec();
        let mut found = BTreeMap::new();
        for (i, layer) in self.layers.iter().enumerate() {
            if remaining.is_empty() {
                break;
            }
            let hits = layer.get_multiple(&remaining)?;
            for (key, value) in hits {
                if i > 0 {
                    self.back_fill(&key, &value, i)?;
                }
                found.insert(key, value);
            }
            remaining.retain(|k| !found.contains_key(k));
        }
        Ok(found)
    }

    fn set_multiple(&self, items: &BTreeMap<String, Value>, ttl: Option<Duration>) -> Result<bool> {
        let mut all = true;
        for layer in &self.layers {
            all &= layer.set_multiple(items, ttl)?;
        }
        Ok(all)
    }

    fn delete_multiple(&self, keys: &[String]) -> Result<bool> {
        let mut all = true;
        for layer in &self.layers {
            all &= layer.delete_multiple(keys)?;
        }
        Ok(all)
    }
}
