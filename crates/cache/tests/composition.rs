//! Layered and distributed composition over real tier stores

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_cache::{
    create_cache, Cache, DistributedCache, LayeredCache, MemoryConfig, MemoryStore, SqliteConfig,
    SqliteStore, TieredConfig,
};
use tempfile::TempDir;

#[test]
fn layered_memory_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let fast = Arc::new(MemoryStore::with_max_items(16).unwrap());
    let slow = Arc::new(
        SqliteStore::open(SqliteConfig {
            path: dir.path().join("slow.db"),
        })
        .unwrap(),
    );

    // Seed only the durable layer, as if a previous process wrote it
    slow.set("x", json!(1), None).unwrap();

    let layers: Vec<Arc<dyn Cache>> = vec![fast.clone(), slow.clone()];
    let layered = LayeredCache::new(layers).unwrap();
    assert_eq!(layered.get("x").unwrap(), Some(json!(1)));
    assert_eq!(fast.get("x").unwrap(), Some(json!(1)));

    // Writes reach both layers
    layered.set("y", json!({"nested": [true]}), None).unwrap();
    assert!(fast.exists("y").unwrap());
    assert!(slow.exists("y").unwrap());
}

#[test]
fn distributed_over_tiered_nodes() {
    let dir = TempDir::new().unwrap();
    let mut nodes: BTreeMap<String, Arc<dyn Cache>> = BTreeMap::new();
    for name in ["alpha", "beta"] {
        let config = TieredConfig {
            memory: MemoryConfig { max_items: 8 },
            sqlite: SqliteConfig {
                path: dir.path().join(format!("{name}.db")),
            },
            ..TieredConfig::default()
        };
        nodes.insert(name.to_string(), create_cache("tiered", &config).unwrap());
    }
    let cache = DistributedCache::new(nodes).unwrap();

    let items: BTreeMap<String, Value> = (0..16)
        .map(|i| (format!("device:{i}"), json!({"id": i})))
        .collect();
    let keys: Vec<String> = items.keys().cloned().collect();

    assert!(cache.set_multiple(&items, None).unwrap());
    assert_eq!(cache.get_multiple(&keys).unwrap(), items);

    // Every key has exactly one owner, stable across calls
    for key in &keys {
        assert_eq!(cache.node_for(key), cache.node_for(key));
    }

    let stats = cache.get_stats().unwrap();
    assert_eq!(stats.nodes, 2);
    assert_eq!(stats.totals.entries, 16);

    assert!(cache.clear().unwrap());
    assert_eq!(cache.stats().unwrap().entries, 0);
}

#[test]
fn layered_cache_can_nest_compositions() {
    // A layered cache whose slow layer is itself distributed
    let node_a: Arc<dyn Cache> = Arc::new(MemoryStore::with_max_items(32).unwrap());
    let node_b: Arc<dyn Cache> = Arc::new(MemoryStore::with_max_items(32).unwrap());
    let mut nodes = BTreeMap::new();
    nodes.insert("a".to_string(), node_a);
    nodes.insert("b".to_string(), node_b);
    let distributed = Arc::new(DistributedCache::new(nodes).unwrap());

    let front = Arc::new(MemoryStore::with_max_items(4).unwrap());
    let layers: Vec<Arc<dyn Cache>> = vec![front, distributed.clone()];
    let layered = LayeredCache::new(layers).unwrap();

    layered.set("k", json!("v"), None).unwrap();
    assert_eq!(distributed.get("k").unwrap(), Some(json!("v")));
    assert_eq!(layered.get("k").unwrap(), Some(json!("v")));
}
