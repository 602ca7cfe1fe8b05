//! Configuration surface for stores and the tiered orchestrator

use std::path::PathBuf;
use strata_core::{Error, Result, MAX_PRIORITY, MIN_PRIORITY};

/// Configuration for the bounded in-memory tier.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of entries held before eviction kicks in
    pub max_items: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_items: 1000 }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_items == 0 {
            return Err(Error::configuration(
                "memory store",
                "max_items must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Configuration for the durable SQLite tier.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Backing database file
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache.db"),
        }
    }
}

impl SqliteConfig {
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::configuration(
                "sqlite store",
                "backing path must not be empty",
            ));
        }
        Ok(())
    }
}

/// When a persistent-tier hit is copied up into the memory tier.
///
/// A hit is promoted when the entry's priority reaches `min_priority`
/// or its accumulated access count reaches `min_access_count`.
#[derive(Debug, Clone, Copy)]
pub struct PromotionPolicy {
    pub min_priority: u8,
    pub min_access_count: u64,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            min_priority: 4,
            min_access_count: 3,
        }
    }
}

impl PromotionPolicy {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.min_priority) {
            return Err(Error::configuration(
                "promotion policy",
                format!(
                    "min_priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}, got {}",
                    self.min_priority
                ),
            ));
        }
        Ok(())
    }
}

/// Configuration for the tiered orchestrator.
#[derive(Debug, Clone)]
pub struct TieredConfig {
    pub memory: MemoryConfig,
    pub sqlite: SqliteConfig,
    /// Priority assumed when a caller writes through the plain
    /// [`Cache`](strata_core::Cache) contract, which carries no priority
    pub default_priority: u8,
    /// `None` disables promotion on persistent-tier hits
    pub promotion: Option<PromotionPolicy>,
}

impl Default for TieredConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            sqlite: SqliteConfig::default(),
            default_priority: 3,
            promotion: Some(PromotionPolicy::default()),
        }
    }
}

impl TieredConfig {
    pub fn validate(&self) -> Result<()> {
        self.memory.validate()?;
        self.sqlite.validate()?;
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.default_priority) {
            return Err(Error::configuration(
                "tiered cache",
                format!(
                    "default_priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}, got {}",
                    self.default_priority
                ),
            ));
        }
        if let Some(promotion) = &self.promotion {
            promotion.validate()?;
        }
        Ok(())
    }
}
