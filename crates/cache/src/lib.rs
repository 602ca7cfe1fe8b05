//! Multi-tier cache engine
//!
//! Caches lookups against a slow, rate-limited upstream source with
//! tiered placement, expiry, and eviction:
//!
//! - [`MemoryStore`] — fast, bounded, evicts the least-recently-used entry
//! - [`SqliteStore`] — durable, schema-backed, unbounded
//! - [`TieredCache`] — places entries by priority across the two tiers,
//!   promotes on demand, and counts hits, misses, promotions, and evictions
//! - [`LayeredCache`] — fastest-to-slowest fall-through with back-fill
//! - [`DistributedCache`] — deterministic key partitioning over named nodes
//!
//! Every component implements the same [`Cache`] contract, so any of
//! them can serve as a layer or a node of another. All operations are
//! synchronous; each store guards its state with a single mutex and
//! performs no internal retries or background work.

pub mod config;
pub mod distributed;
pub mod factory;
mod keys;
pub mod layered;
pub mod memory;
pub mod sqlite;
pub mod tiered;

pub use config::{MemoryConfig, PromotionPolicy, SqliteConfig, TieredConfig};
pub use distributed::{DistributedCache, DistributedStats};
pub use factory::create_cache;
pub use layered::LayeredCache;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use tiered::{select_tier, TierHits, TieredCache, TieredStats};

pub use strata_core::{
    Cache, CacheEntry, CacheStats, CacheTier, Error, Result, Source, MAX_PRIORITY, MIN_PRIORITY,
};
