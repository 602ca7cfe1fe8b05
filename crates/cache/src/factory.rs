//! Factory for constructing caches by registered type name

use crate::config::TieredConfig;
use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;
use crate::tiered::TieredCache;
use std::sync::Arc;
use strata_core::{Cache, Error, Result};

/// Build a cache of the named kind from `config`, which carries the
/// sections each kind needs.
///
/// Registered kinds: `memory`, `sqlite`, `tiered`. Anything else is an
/// [`Error::UnknownCacheType`]. Callers own the returned handle; there
/// is no process-wide cache instance.
pub fn create_cache(kind: &str, config: &TieredConfig) -> Result<Arc<dyn Cache>> {
    match kind.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new(config.memory.clone())?)),
        "sqlite" => Ok(Arc::new(SqliteStore::open(config.sqlite.clone())?)),
        "tiered" => Ok(Arc::new(TieredCache::open(config.clone())?)),
        _ => Err(Error::UnknownCacheType {
            kind: kind.to_string(),
        }),
    }
}
