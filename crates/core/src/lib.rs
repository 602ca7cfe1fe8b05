//! Core types and errors for the strata cache engine
//!
//! This crate defines the pieces shared by every cache component:
//! the cache-entry data model, the capability trait implemented by all
//! stores and compositions, the upstream-source boundary, the common
//! statistics record, and the error taxonomy.

pub mod entry;
pub mod errors;
pub mod stats;
pub mod traits;

pub use entry::{CacheEntry, CacheTier, MAX_PRIORITY, MIN_PRIORITY};
pub use errors::{Error, Result};
pub use stats::CacheStats;
pub use traits::{Cache, Source};
