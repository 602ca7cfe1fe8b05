//! Durable SQLite tier, surviving process restarts

use crate::config::SqliteConfig;
use crate::keys::filter_keys;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strata_core::{Cache, CacheEntry, CacheStats, CacheTier, Error, Result, MAX_PRIORITY, MIN_PRIORITY};
use tracing::debug;

/// Idempotent schema: entries keyed by `key`, with secondary indexes on
/// `created_at` and `last_access` for eviction scans.
const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key          TEXT PRIMARY KEY,
    data         TEXT NOT NULL,
    tier         TEXT NOT NULL,
    ttl_ms       INTEGER,
    created_at   INTEGER NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_access  INTEGER NOT NULL,
    priority     INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_created_at ON cache_entries (created_at);
CREATE INDEX IF NOT EXISTS idx_cache_entries_last_access ON cache_entries (last_access);
";

/// Rows whose ttl has not elapsed. Bind the current instant in millis.
const LIVE: &str = "(ttl_ms IS NULL OR created_at + ttl_ms > ?1)";

/// Raw column values, decoded into a [`CacheEntry`] outside the
/// rusqlite error domain.
type RawRow = (String, String, String, Option<i64>, i64, i64, i64, i64);

/// Durable tier with no capacity bound other than disk.
///
/// The connection sits behind one mutex (single writer per backing
/// file); every operation runs in its own transaction. Storage errors
/// propagate unchanged, never retried.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SqliteStore {
    /// Open (or create) the backing database and ensure the schema.
    pub fn open(config: SqliteConfig) -> Result<Self> {
        config.validate()?;
        let conn = Connection::open(&config.path).map_err(|e| {
            Error::configuration(
                "sqlite store",
                format!("cannot open '{}': {e}", config.path.display()),
            )
        })?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::storage("create schema", e))?;
        debug!(path = %config.path.display(), "sqlite tier ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path: config.path,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn decode(raw: RawRow) -> Result<CacheEntry> {
        let (key, data, tier, ttl_ms, created_at, access_count, last_access, priority) = raw;
        let data: Value = serde_json::from_str(&data).map_err(|source| Error::Serialization {
            key: key.clone(),
            operation: "decode",
            source,
        })?;
        let tier = CacheTier::parse(&tier)
            .ok_or_else(|| Error::corrupt("read", format!("unknown tier '{tier}' for '{key}'")))?;
        Ok(CacheEntry {
            key,
            data,
            tier,
            ttl: ttl_ms.map(|ms| Duration::from_millis(ms.max(0) as u64)),
            created_at: timestamp(created_at)?,
            access_count: access_count.max(0) as u64,
            last_access: timestamp(last_access)?,
            priority: priority.clamp(MIN_PRIORITY as i64, MAX_PRIORITY as i64) as u8,
        })
    }

    /// Look up an entry without touching its access statistics.
    ///
    /// An expired row is deleted and reported absent.
    pub fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = Utc::now();
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::storage("read", e))?;
        let raw = tx
            .query_row(
                "SELECT key, data, tier, ttl_ms, created_at, access_count, last_access, priority \
                 FROM cache_entries WHERE key = ?1",
                params![key],
                Self::read_row,
            )
            .optional()
            .map_err(|e| Error::storage("read", e))?;
        let entry = match raw.map(Self::decode).transpose()? {
            Some(entry) if entry.is_expired(now) => {
                tx.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                    .map_err(|e| Error::storage("read", e))?;
                None
            }
            other => other,
        };
        tx.commit().map_err(|e| Error::storage("read", e))?;
        Ok(entry)
    }

    /// Look up an entry and record the access in the same transaction.
    pub fn touch(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = Utc::now();
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::storage("touch", e))?;
        let raw = tx
            .query_row(
                "SELECT key, data, tier, ttl_ms, created_at, access_count, last_access, priority \
                 FROM cache_entries WHERE key = ?1",
                params![key],
                Self::read_row,
            )
            .optional()
            .map_err(|e| Error::storage("touch", e))?;
        let entry = match raw.map(Self::decode).transpose()? {
            Some(entry) if entry.is_expired(now) => {
                tx.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                    .map_err(|e| Error::storage("touch", e))?;
                None
            }
            Some(mut entry) => {
                entry.touch(now);
                tx.execute(
                    "UPDATE cache_entries \
                     SET access_count = ?2, last_access = ?3 WHERE key = ?1",
                    params![key, entry.access_count as i64, entry.last_access.timestamp_millis()],
                )
                .map_err(|e| Error::storage("touch", e))?;
                Some(entry)
            }
            None => None,
        };
        tx.commit().map_err(|e| Error::storage("touch", e))?;
        Ok(entry)
    }

    /// Upsert an entry by key.
    pub fn insert(&self, entry: &CacheEntry) -> Result<()> {
        let data = entry.data.to_string();
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO cache_entries \
                 (key, data, tier, ttl_ms, created_at, access_count, last_access, priority) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.key,
                    data,
                    entry.tier.as_str(),
                    entry.ttl.map(|t| t.as_millis() as i64),
                    entry.created_at.timestamp_millis(),
                    entry.access_count as i64,
                    entry.last_access.timestamp_millis(),
                    i64::from(entry.priority),
                ],
            )
            .map_err(|e| Error::storage("write", e))?;
        Ok(())
    }

    /// Remove a key. Returns whether a row was deleted.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .map_err(|e| Error::storage("delete", e))?;
        Ok(deleted > 0)
    }

    /// Drop all rows.
    pub fn purge(&self) -> Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM cache_entries", [])
            .map_err(|e| Error::storage("clear", e))?;
        Ok(())
    }

    /// Exact count of live rows.
    pub fn count(&self) -> Result<u64> {
        let now = Utc::now().timestamp_millis();
        let count: i64 = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT COUNT(*) FROM cache_entries WHERE {LIVE}"),
                params![now],
                |row| row.get(0),
            )
            .map_err(|e| Error::storage("count", e))?;
        Ok(count.max(0) as u64)
    }

    /// Delete every expired row, returning how many went away.
    pub fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now().timestamp_millis();
        let purged = self
            .conn
            .lock()
            .execute(
                "DELETE FROM cache_entries \
                 WHERE ttl_ms IS NOT NULL AND created_at + ttl_ms <= ?1",
                params![now],
            )
            .map_err(|e| Error::storage("purge expired", e))?;
        if purged > 0 {
            debug!(purged, "purged expired entries");
        }
        Ok(purged as u64)
    }
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::corrupt("read", format!("timestamp {ms} out of range")))
}

impl Cache for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.touch(key)? {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.data))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let entry = CacheEntry::new(key, value, CacheTier::Persistent, ttl, MIN_PRIORITY);
        self.insert(&entry)?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.remove(key)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entry(key)?.is_some())
    }

    fn get_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Utc::now();
        Ok(self.entry(key)?.and_then(|e| e.remaining_ttl(now)))
    }

    fn set_ttl(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::storage("set ttl", e))?;
        let raw = tx
            .query_row(
                "SELECT key, data, tier, ttl_ms, created_at, access_count, last_access, priority \
                 FROM cache_entries WHERE key = ?1",
                params![key],
                Self::read_row,
            )
            .optional()
            .map_err(|e| Error::storage("set ttl", e))?;
        let updated = match raw.map(Self::decode).transpose()? {
            Some(entry) if entry.is_expired(now) => {
                tx.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                    .map_err(|e| Error::storage("set ttl", e))?;
                false
            }
            Some(mut entry) => {
                entry.extend_ttl(now, ttl);
                tx.execute(
                    "UPDATE cache_entries SET ttl_ms = ?2 WHERE key = ?1",
                    params![key, entry.ttl.map(|t| t.as_millis() as i64)],
                )
                .map_err(|e| Error::storage("set ttl", e))?;
                true
            }
            None => false,
        };
        tx.commit().map_err(|e| Error::storage("set ttl", e))?;
        Ok(updated)
    }

    fn clear(&self) -> Result<bool> {
        self.purge()?;
        Ok(true)
    }

    fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now().timestamp_millis();
        let (entries, size_bytes): (i64, i64) = self
            .conn
            .lock()
            .query_row(
                &format!(
                    "SELECT COUNT(*), COALESCE(SUM(LENGTH(data)), 0) \
                     FROM cache_entries WHERE {LIVE}"
                ),
                params![now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| Error::storage("stats", e))?;
        Ok(CacheStats {
            entries: entries.max(0) as u64,
            size_bytes: size_bytes.max(0) as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }

    fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>> {
        let now = Utc::now().timestamp_millis();
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT key FROM cache_entries WHERE {LIVE} ORDER BY key"
            ))
            .map_err(|e| Error::storage("list keys", e))?;
        let keys = stmt
            .query_map(params![now], |row| row.get::<_, String>(0))
            .map_err(|e| Error::storage("list keys", e))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| Error::storage("list keys", e))?;
        drop(stmt);
        filter_keys(keys, pattern)
    }
}
