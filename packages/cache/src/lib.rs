#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Namespaced cache store in `DuckDB`.
//!
//! Each screen owns one [`Namespace`]. Inside it, keys are a fixed name or a
//! name with a partition suffix (`exams_3` for March). A key holds exactly
//! one row: raw table markup, a JSON record list, or an "explicitly empty"
//! sentinel. Writing any of them replaces the others in a single upsert, so
//! data and sentinel can never be read back together.
//!
//! The store records when each entry was written but never expires
//! anything itself; callers compare [`CacheEntry::written_at`] against
//! their own [`StalenessHorizon`].

pub mod paths;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, TimeDelta, Utc};
use duckdb::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    Database(#[from] duckdb::Error),

    /// I/O error creating the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record list could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another thread panicked while holding the connection.
    #[error("Cache connection poisoned")]
    Poisoned,
}

/// One logical dataset. Clearing a namespace never touches another.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Namespace {
    /// Exam calendar listings, partitioned by month.
    Calendar,
    /// Home screen: aggregated exam calendar and recent grades.
    Home,
    /// Weekly class schedule.
    Schedule,
}

/// A cache key: namespace, name and optional partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Namespace,
    key: String,
}

impl CacheKey {
    /// A single-document key.
    #[must_use]
    pub fn new(namespace: Namespace, name: &str) -> Self {
        Self {
            namespace,
            key: name.to_owned(),
        }
    }

    /// A partitioned key, stored as `{name}_{partition}`.
    #[must_use]
    pub fn partitioned(namespace: Namespace, name: &str, partition: u32) -> Self {
        Self {
            namespace,
            key: format!("{name}_{partition}"),
        }
    }

    #[must_use]
    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}

/// What an entry holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Table markup, cached verbatim for re-parsing.
    Html(String),
    /// JSON-encoded record list.
    Records(String),
    /// Upstream confirmed there is nothing to show. Carries the portal's
    /// message when it gave one.
    Empty { message: Option<String> },
}

impl Payload {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Html(_) => KIND_HTML,
            Self::Records(_) => KIND_RECORDS,
            Self::Empty { .. } => KIND_EMPTY,
        }
    }

    fn body(&self) -> Option<&str> {
        match self {
            Self::Html(body) | Self::Records(body) => Some(body),
            Self::Empty { message } => message.as_deref(),
        }
    }

    fn from_row(kind: &str, body: Option<String>) -> Option<Self> {
        match kind {
            KIND_HTML => body.map(Self::Html),
            KIND_RECORDS => body.map(Self::Records),
            KIND_EMPTY => Some(Self::Empty { message: body }),
            _ => None,
        }
    }
}

const KIND_HTML: &str = "html";
const KIND_RECORDS: &str = "records";
const KIND_EMPTY: &str = "empty";

/// A stored payload and when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub payload: Payload,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether this is an "explicitly empty" sentinel.
    #[must_use]
    pub const fn is_empty_sentinel(&self) -> bool {
        matches!(self.payload, Payload::Empty { .. })
    }

    #[must_use]
    pub fn is_fresh(&self, horizon: StalenessHorizon, now: DateTime<Utc>) -> bool {
        horizon.is_fresh(self.written_at, now)
    }
}

/// A decoded record list and when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecords<T> {
    pub records: Vec<T>,
    pub written_at: DateTime<Utc>,
}

/// Maximum age before an entry stops being authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessHorizon {
    /// Trusted while younger than the given age.
    Within(TimeDelta),
    /// Trusted until explicitly invalidated.
    Unbounded,
}

impl StalenessHorizon {
    /// Whether something written at `written_at` is still trusted at `now`.
    #[must_use]
    pub fn is_fresh(self, written_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Within(max_age) => now.signed_duration_since(written_at) < max_age,
            Self::Unbounded => true,
        }
    }
}

/// Namespaced key-value cache backed by a single `DuckDB` connection.
///
/// Safe to share across tasks behind an `Arc`; operations are serialized on
/// the connection and every write is a single statement, so the last writer
/// wins per key.
pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Opens (or creates) the cache database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the directory, connection or schema cannot
    /// be created.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }
        log::debug!("Opening cache at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a throwaway in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the connection or schema cannot be created.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT,
                written_at_ms BIGINT NOT NULL,
                PRIMARY KEY (namespace, key)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Stores `payload` under `key`, replacing whatever was there.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write fails.
    pub fn put(
        &self,
        key: &CacheKey,
        payload: &Payload,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cache_entries (namespace, key, kind, payload, written_at_ms)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (namespace, key) DO UPDATE SET
                kind = excluded.kind,
                payload = excluded.payload,
                written_at_ms = excluded.written_at_ms",
            duckdb::params![
                key.namespace.as_ref(),
                key.key,
                payload.kind(),
                payload.body(),
                now.timestamp_millis(),
            ],
        )?;
        log::debug!("Cached {} entry at {key}", payload.kind());
        Ok(())
    }

    /// Stores table markup, clearing any empty sentinel for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write fails.
    pub fn put_html(&self, key: &CacheKey, html: &str, now: DateTime<Utc>) -> Result<(), CacheError> {
        self.put(key, &Payload::Html(html.to_owned()), now)
    }

    /// Stores a record list as JSON, clearing any empty sentinel for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if serialization or the write fails.
    pub fn put_records<T: Serialize>(
        &self,
        key: &CacheKey,
        records: &[T],
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(records)?;
        self.put(key, &Payload::Records(json), now)
    }

    /// Stores the "explicitly empty" sentinel, clearing any data for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the write fails.
    pub fn put_empty(
        &self,
        key: &CacheKey,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.put(
            key,
            &Payload::Empty {
                message: message.map(str::to_owned),
            },
            now,
        )
    }

    /// Reads the entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, payload, written_at_ms
             FROM cache_entries
             WHERE namespace = ? AND key = ?",
        )?;
        stmt.raw_bind_parameter(1, key.namespace.as_ref())?;
        stmt.raw_bind_parameter(2, &key.key)?;
        stmt.raw_execute()?;

        let mut rows = stmt.raw_query();
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let kind: String = row.get(0)?;
        let body: Option<String> = row.get(1)?;
        let written_at_ms: i64 = row.get(2)?;

        let payload = Payload::from_row(&kind, body);
        let written_at = DateTime::from_timestamp_millis(written_at_ms);
        match (payload, written_at) {
            (Some(payload), Some(written_at)) => Ok(Some(CacheEntry {
                payload,
                written_at,
            })),
            _ => {
                log::warn!("Ignoring unreadable cache entry {key} (kind '{kind}')");
                Ok(None)
            }
        }
    }

    /// Reads and decodes a record list. A payload that is not a record list
    /// or does not decode is reported as a miss.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn get_records<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<StoredRecords<T>>, CacheError> {
        let Some(entry) = self.get(key)? else {
            return Ok(None);
        };
        let Payload::Records(json) = entry.payload else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(records) => Ok(Some(StoredRecords {
                records,
                written_at: entry.written_at,
            })),
            Err(e) => {
                log::warn!("Corrupt cache payload at {key}, treating as miss: {e}");
                Ok(None)
            }
        }
    }

    /// Whether `key` holds data (markup or records).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn has_data(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.get(key)?.is_some_and(|entry| !entry.is_empty_sentinel()))
    }

    /// Whether `key` holds the "explicitly empty" sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn is_empty(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.get(key)?.is_some_and(|entry| entry.is_empty_sentinel()))
    }

    /// Removes `key`. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ? AND key = ?",
            duckdb::params![key.namespace.as_ref(), key.key],
        )?;
        Ok(removed > 0)
    }

    /// Removes every entry in `namespace`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    pub fn clear_namespace(&self, namespace: Namespace) -> Result<usize, CacheError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE namespace = ?",
            duckdb::params![namespace.as_ref()],
        )?;
        log::info!("Cleared {removed} cache entries from {namespace}");
        Ok(removed)
    }

    /// Namespaces that currently hold at least one entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn namespaces(&self) -> Result<Vec<Namespace>, CacheError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT namespace FROM cache_entries ORDER BY namespace")?;
        stmt.raw_execute()?;

        let mut namespaces = Vec::new();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            match name.parse::<Namespace>() {
                Ok(namespace) => namespaces.push(namespace),
                Err(_) => log::warn!("Unknown cache namespace '{name}'"),
            }
        }
        Ok(namespaces)
    }

    /// Clears every namespace. Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if a delete fails.
    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for namespace in Namespace::iter() {
            removed += self.clear_namespace(namespace)?;
        }
        Ok(removed)
    }
}
