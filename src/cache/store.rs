//! Durable blob store backed by SQLite.
//!
//! Maps a track id to its audio payload plus expiration metadata. Every
//! mutation runs inside a SQLite transaction, so a concurrent reader sees
//! either the previous row or the new one, never a partial write.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{CacheError, Result};
use crate::types::{expiry_after, from_unix_millis, payload_digest, to_unix_millis, CacheEntry};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS blobs (
        track_id   TEXT PRIMARY KEY NOT NULL,
        payload    BLOB NOT NULL,
        digest     TEXT NOT NULL,
        expires_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_blobs_expires_at ON blobs(expires_at);
";

/// Aggregate numbers about the store contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Rows present, expired or not.
    pub entries: u64,
    /// Sum of payload sizes in bytes.
    pub total_bytes: u64,
    /// Rows already expired but not yet swept.
    pub expired: u64,
}

/// Persistent payload storage with time-based expiration.
///
/// The `*_at` methods take the current time explicitly and report errors;
/// the provided wrappers use the wall clock and degrade to "nothing cached"
/// on failure, because the cache is never a correctness requirement.
pub trait PayloadStore: Send + Sync {
    /// Upserts the payload for `track_id` with `expires_at = now + ttl`.
    fn save_at(&self, track_id: &str, payload: &[u8], ttl: Duration, now: SystemTime) -> Result<()>;

    /// Returns the payload if an entry exists and `expires_at > now`.
    fn get_at(&self, track_id: &str, now: SystemTime) -> Result<Option<Vec<u8>>>;

    /// Returns true if an unexpired entry exists, without reading the payload.
    fn contains_at(&self, track_id: &str, now: SystemTime) -> Result<bool>;

    /// Deletes every entry with `expires_at <= now`. Returns the number removed.
    fn sweep_expired_at(&self, now: SystemTime) -> Result<usize>;

    /// Deletes one entry. Returns true if it existed.
    fn remove(&self, track_id: &str) -> Result<bool>;

    /// Deletes everything. Returns the number of entries removed.
    fn clear(&self) -> Result<usize>;

    /// Returns aggregate numbers, counting entries expired at `now`.
    fn stats_at(&self, now: SystemTime) -> Result<StoreStats>;

    /// Best-effort save: failures are logged and previous state is kept.
    fn save(&self, track_id: &str, payload: &[u8], ttl: Duration) {
        match self.save_at(track_id, payload, ttl, SystemTime::now()) {
            Ok(()) => log::info!("Saved {} bytes for track {}", payload.len(), track_id),
            Err(e) => log::error!("Failed to save payload for track {}: {}", track_id, e),
        }
    }

    /// Wall-clock lookup. Read failures are logged and reported as a miss.
    fn get(&self, track_id: &str) -> Option<Vec<u8>> {
        match self.get_at(track_id, SystemTime::now()) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Failed to read payload for track {}: {}", track_id, e);
                None
            }
        }
    }

    /// Wall-clock existence check. Read failures count as absent.
    fn contains(&self, track_id: &str) -> bool {
        self.contains_at(track_id, SystemTime::now()).unwrap_or_else(|e| {
            log::error!("Failed to look up track {}: {}", track_id, e);
            false
        })
    }

    /// Wall-clock statistics.
    fn stats(&self) -> Result<StoreStats> {
        self.stats_at(SystemTime::now())
    }

    /// Number of rows present, expired or not.
    fn len(&self) -> Result<u64> {
        Ok(self.stats()?.entries)
    }

    /// Wall-clock sweep. Failures are logged and reported as zero removals.
    fn sweep_expired(&self) -> usize {
        match self.sweep_expired_at(SystemTime::now()) {
            Ok(removed) => {
                log::info!("Swept {} expired entries", removed);
                removed
            }
            Err(e) => {
                log::error!("Expiration sweep failed: {}", e);
                0
            }
        }
    }
}

/// [`PayloadStore`] implementation on a single SQLite connection.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
}

impl SqliteBlobStore {
    /// Opens (or creates) the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CacheError::with_source(
                        crate::error::ErrorCode::StorageFailure,
                        format!("Failed to create cache directory {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| CacheError::storage(format!("Failed to open {}", path.display()), e))?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))
            .map_err(|e| CacheError::storage("Failed to enable WAL journal", e))?;
        Self::initialize(conn)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CacheError::storage("Failed to open in-memory store", e))?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| CacheError::storage("Failed to set busy timeout", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| CacheError::storage("Failed to create blob schema", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PayloadStore for SqliteBlobStore {
    fn save_at(&self, track_id: &str, payload: &[u8], ttl: Duration, now: SystemTime) -> Result<()> {
        let created_at = to_unix_millis(now);
        let expires_at = to_unix_millis(expiry_after(now, ttl)?);
        let digest = payload_digest(payload);

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO blobs (track_id, payload, digest, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(track_id) DO UPDATE SET
                payload = excluded.payload,
                digest = excluded.digest,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at",
            params![track_id, payload, digest, expires_at, created_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_at(&self, track_id: &str, now: SystemTime) -> Result<Option<Vec<u8>>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT payload, digest, expires_at, created_at FROM blobs WHERE track_id = ?1",
                params![track_id],
                |row| {
                    Ok((
                        CacheEntry {
                            track_id: track_id.to_string(),
                            payload: row.get(0)?,
                            expires_at: from_unix_millis(row.get(2)?),
                            created_at: from_unix_millis(row.get(3)?),
                        },
                        row.get::<_, String>(1)?,
                    ))
                },
            )
            .optional()?;
        drop(conn);

        let Some((entry, digest)) = row else {
            return Ok(None);
        };

        // Expired rows stay until the next sweep; they are just not served.
        if !entry.is_valid_at(now) {
            log::debug!("Entry for track {} is expired", track_id);
            return Ok(None);
        }

        if entry.digest() != digest {
            log::warn!("Digest mismatch for track {}, ignoring entry", track_id);
            return Ok(None);
        }

        Ok(Some(entry.payload))
    }

    fn contains_at(&self, track_id: &str, now: SystemTime) -> Result<bool> {
        let conn = self.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM blobs WHERE track_id = ?1 AND expires_at > ?2",
                params![track_id, to_unix_millis(now)],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn sweep_expired_at(&self, now: SystemTime) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM blobs WHERE expires_at <= ?1",
            params![to_unix_millis(now)],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    fn remove(&self, track_id: &str) -> Result<bool> {
        let conn = self.lock();
        let removed = conn.execute("DELETE FROM blobs WHERE track_id = ?1", params![track_id])?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.lock();
        Ok(conn.execute("DELETE FROM blobs", [])?)
    }

    fn stats_at(&self, now: SystemTime) -> Result<StoreStats> {
        let conn = self.lock();
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(LENGTH(payload)), 0),
                    COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0)
             FROM blobs",
            params![to_unix_millis(now)],
            |row| {
                Ok(StoreStats {
                    entries: row.get::<_, i64>(0)? as u64,
                    total_bytes: row.get::<_, i64>(1)? as u64,
                    expired: row.get::<_, i64>(2)? as u64,
                })
            },
        )?;
        Ok(stats)
    }
}
