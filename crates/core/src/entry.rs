//! Cache entry data model shared by every tier and composition

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Lowest placement priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest placement priority.
pub const MAX_PRIORITY: u8 = 5;

/// Storage backend an entry currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Fast bounded in-memory tier
    Memory,
    /// Durable embedded-storage tier
    Persistent,
    /// Upstream source of truth
    Source,
}

impl CacheTier {
    /// Stable text form used by the persistent tier's `tier` column.
    pub fn as_str(self) -> &'static str {
        match self {
            CacheTier::Memory => "memory",
            CacheTier::Persistent => "persistent",
            CacheTier::Source => "source",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "memory" => Some(CacheTier::Memory),
            "persistent" => Some(CacheTier::Persistent),
            "source" => Some(CacheTier::Source),
            _ => None,
        }
    }
}

/// A single cached value with its placement and access metadata.
///
/// Exactly one entry exists per key per store; inserting again
/// overwrites. An entry with an elapsed ttl is treated as absent by
/// every component. `priority` is an advisory placement hint (1-5),
/// clamped on construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Opaque payload; serialized to text for the persistent tier
    pub data: Value,
    pub tier: CacheTier,
    /// `None` means no expiry; a zero duration is normalized to `None`
    pub ttl: Option<Duration>,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_access: DateTime<Utc>,
    pub priority: u8,
}

impl CacheEntry {
    /// Build a fresh entry: `created_at == last_access == now`, zero accesses.
    pub fn new(
        key: impl Into<String>,
        data: Value,
        tier: CacheTier,
        ttl: Option<Duration>,
        priority: u8,
    ) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            data,
            tier,
            ttl: ttl.filter(|t| !t.is_zero()),
            created_at: now,
            access_count: 0,
            last_access: now,
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
        }
    }

    /// Instant this entry expires, if a ttl is set.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = ChronoDuration::from_std(self.ttl?).ok()?;
        Some(self.created_at + ttl)
    }

    /// Expired once `now >= created_at + ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(at) => now >= at,
            None => false,
        }
    }

    /// Record a successful read. `last_access` never moves backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        if now > self.last_access {
            self.last_access = now;
        }
    }

    /// Time left until expiry, or `None` when no ttl is set or the
    /// entry is already expired.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        let at = self.expires_at()?;
        (at - now).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Re-arm expiry so the entry expires `ttl` after `now`, keeping
    /// `created_at` intact.
    pub fn extend_ttl(&mut self, now: DateTime<Utc>, ttl: Duration) {
        let elapsed = (now - self.created_at).to_std().unwrap_or_default();
        self.ttl = Some(elapsed + ttl).filter(|t| !t.is_zero());
    }

    /// Approximate payload size, as the persistent tier would store it.
    pub fn payload_size(&self) -> u64 {
        self.data.to_string().len() as u64
    }
}
