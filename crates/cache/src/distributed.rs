//! Key-partitioned composition over a fixed set of named nodes

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Cache, CacheStats, Error, Result};
use tracing::trace;
use xxhash_rust::xxh3::xxh3_64;

/// Usage snapshot for a [`DistributedCache`]: summed totals plus a
/// per-node breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DistributedStats {
    pub nodes: u64,
    pub totals: CacheStats,
    pub per_node: BTreeMap<String, CacheStats>,
}

impl DistributedStats {
    /// Overall hit rate across all nodes; `0.0` with no accesses.
    pub fn overall_hit_rate(&self) -> f64 {
        self.totals.hit_rate()
    }
}

/// Partitions the keyspace across named nodes.
///
/// Each key is owned by exactly one node:
/// `sorted_names[xxh3_64(key) % node_count]`. The mapping is
/// deterministic for an unchanged node set but reshuffles most keys
/// when the node count changes; this composition does not rebalance.
/// Bulk operations are grouped by owning node, one batched call each.
pub struct DistributedCache {
    // Sorted by name so routing indexes are stable
    nodes: Vec<(String, Arc<dyn Cache>)>,
}

impl DistributedCache {
    pub fn new(nodes: BTreeMap<String, Arc<dyn Cache>>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::configuration(
                "distributed cache",
                "at least one node is required",
            ));
        }
        Ok(Self {
            nodes: nodes.into_iter().collect(),
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Name of the node owning `key`. Pure: the same key always routes
    /// to the same node while the node set is unchanged.
    pub fn node_for(&self, key: &str) -> &str {
        &self.node(key).0
    }

    fn node(&self, key: &str) -> &(String, Arc<dyn Cache>) {
        let index = (xxh3_64(key.as_bytes()) % self.nodes.len() as u64) as usize;
        &self.nodes[index]
    }

    /// Group keys by the index of their owning node.
    fn group_by_node(&self, keys: &[String]) -> BTreeMap<usize, Vec<String>> {
        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for key in keys {
            let index = (xxh3_64(key.as_bytes()) % self.nodes.len() as u64) as usize;
            groups.entry(index).or_default().push(key.clone());
        }
        groups
    }

    /// Per-node and aggregate statistics.
    pub fn get_stats(&self) -> Result<DistributedStats> {
        let mut stats = DistributedStats {
            nodes: self.nodes.len() as u64,
            ..Default::default()
        };
        for (name, node) in &self.nodes {
            let node_stats = node.stats()?;
            stats.totals.merge(&node_stats);
            stats.per_node.insert(name.clone(), node_stats);
        }
        Ok(stats)
    }
}

impl Cache for DistributedCache {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let (name, node) = self.node(key);
        trace!(key, node = %name, "routing get");
        node.get(key)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let (name, node) = self.node(key);
        trace!(key, node = %name, "routing set");
        node.set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.node(key).1.delete(key)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.node(key).1.exists(key)
    }

    fn get_ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.node(key).1.get_ttl(key)
    }

    fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.node(key).1.set_ttl(key, ttl)
    }

    fn clear(&self) -> Result<bool> {
        let mut all = true;
        for (_, node) in &self.nodes {
            all &= node.clear()?;
        }
        Ok(all)
    }

    fn stats(&self) -> Result<CacheStats> {
        Ok(self.get_stats()?.totals)
    }

    fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let mut keys = BTreeSet::new();
        for (_, node) in &self.nodes {
            keys.extend(node.keys(pattern)?);
        }
        Ok(keys.into_iter().collect())
    }

    fn get_multiple(&self, keys: &[String]) -> Result<BTreeMap<String, Value>> {
        let mut found = BTreeMap::new();
        for (index, batch) in self.group_by_node(keys) {
            let mut part = self.nodes[index].1.get_multiple(&batch)?;
            found.append(&mut part);
        }
        Ok(found)
    }

    fn set_multiple(&self, items: &BTreeMap<String, Value>, ttl: Option<Duration>) -> Result<bool> {
        let keys: Vec<String> = items.keys().cloned().collect();
        let mut all = true;
        for (index, batch) in self.group_by_node(&keys) {
            let batch_items: BTreeMap<String, Value> = batch
                .into_iter()
                .filter_map(|k| items.get(&k).map(|v| (k, v.clone())))
                .collect();
            all &= self.nodes[index].1.set_multiple(&batch_items, ttl)?;
        }
        Ok(all)
    }

    fn delete_multiple(&self, keys: &[String]) -> Result<bool> {
        let mut all = true;
        for (index, batch) in self.group_by_node(keys) {
            all &= self.nodes[index].1.delete_multiple(&batch)?;
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use proptest::prelude::*;
    use serde_json::json;

    fn two_nodes() -> (DistributedCache, Arc<MemoryStore>, Arc<MemoryStore>) {
        let a = Arc::new(MemoryStore::with_max_items(100).unwrap());
        let b = Arc::new(MemoryStore::with_max_items(100).unwrap());
        let mut nodes: BTreeMap<String, Arc<dyn Cache>> = BTreeMap::new();
        nodes.insert("node-a".to_string(), a.clone());
        nodes.insert("node-b".to_string(), b.clone());
        (DistributedCache::new(nodes).unwrap(), a, b)
    }

    #[test]
    fn test_empty_node_set_is_rejected() {
        assert!(DistributedCache::new(BTreeMap::new()).is_err());
    }

    #[test]
    fn test_routing_is_deterministic() {
        let (cache, _, _) = two_nodes();
        for key in ["k1", "k2", "device:3", ""] {
            assert_eq!(cache.node_for(key), cache.node_for(key));
        }
    }

    #[test]
    fn test_overwrite_routes_to_same_node() {
        let (cache, a, b) = two_nodes();
        cache.set("k1", json!("v1"), None).unwrap();
        cache.set("k1", json!("v2"), None).unwrap();

        assert_eq!(cache.get("k1").unwrap(), Some(json!("v2")));
        // Exactly one node holds the key
        let on_a = a.exists("k1").unwrap();
        let on_b = b.exists("k1").unwrap();
        assert!(on_a ^ on_b);
    }

    #[test]
    fn test_single_key_ops_stay_on_owner() {
        let (cache, _, _) = two_nodes();
        cache
            .set("k", json!(1), Some(Duration::from_secs(3600)))
            .unwrap();
        assert!(cache.exists("k").unwrap());
        assert!(cache.get_ttl("k").unwrap().is_some());
        assert!(cache.set_ttl("k", Duration::from_secs(60)).unwrap());
        assert!(cache.delete("k").unwrap());
        assert!(!cache.exists("k").unwrap());
    }

    #[test]
    fn test_clear_fans_out_to_all_nodes() {
        let (cache, a, b) = two_nodes();
        for i in 0..20 {
            cache.set(&format!("k{i}"), json!(i), None).unwrap();
        }
        assert!(cache.clear().unwrap());
        assert!(a.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_bulk_ops_group_by_node() {
        let (cache, _, _) = two_nodes();
        let items: BTreeMap<String, Value> =
            (0..20).map(|i| (format!("k{i}"), json!(i))).collect();
        assert!(cache.set_multiple(&items, None).unwrap());

        let keys: Vec<String> = items.keys().cloned().collect();
        let found = cache.get_multiple(&keys).unwrap();
        assert_eq!(found.len(), 20);
        assert_eq!(found.get("k7"), Some(&json!(7)));

        assert!(cache.delete_multiple(&keys).unwrap());
        assert!(cache.get_multiple(&keys).unwrap().is_empty());
    }

    #[test]
    fn test_stats_aggregate_per_node() {
        let (cache, _, _) = two_nodes();
        cache.set("k1", json!(1), None).unwrap();
        cache.get("k1").unwrap();
        cache.get("absent").unwrap();

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.per_node.len(), 2);
        assert_eq!(stats.totals.hits, 1);
        assert_eq!(stats.totals.misses, 1);
        assert!((stats.overall_hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_rate_zero_without_accesses() {
        let (cache, _, _) = two_nodes();
        assert_eq!(cache.get_stats().unwrap().overall_hit_rate(), 0.0);
    }

    proptest! {
        #[test]
        fn prop_routing_is_total_and_stable(key in ".{0,64}") {
            let (cache, _, _) = two_nodes();
            let first = cache.node_for(&key).to_string();
            let second = cache.node_for(&key).to_string();
            prop_assert_eq!(&first, &second);
            prop_assert!(cache.node_names().contains(&first.as_str()));
        }
    }
}
