//! CacheEntry type for persisted audio payloads.
//!
//! One entry exists per track id. Saving again for the same id replaces the
//! payload and resets both timestamps.

use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{CacheError, ErrorCode, Result};

/// A persisted audio payload with its expiration metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Key: the track identifier.
    pub track_id: String,

    /// Raw audio bytes exactly as received from the origin.
    pub payload: Vec<u8>,

    /// Absolute time after which the entry must not be served.
    pub expires_at: SystemTime,

    /// When the entry was written.
    pub created_at: SystemTime,
}

impl CacheEntry {
    /// Creates an entry written at `now` that expires after `ttl`.
    pub fn new(
        track_id: impl Into<String>,
        payload: Vec<u8>,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<Self> {
        Ok(Self {
            track_id: track_id.into(),
            payload,
            expires_at: expiry_after(now, ttl)?,
            created_at: now,
        })
    }

    /// Returns true if the entry may be served at `now`.
    ///
    /// Valid iff `expires_at > now`; an entry is already expired at the
    /// exact instant of its expiration.
    pub fn is_valid_at(&self, now: SystemTime) -> bool {
        self.expires_at > now
    }

    /// Returns the SHA-256 digest of the payload as hex.
    pub fn digest(&self) -> String {
        payload_digest(&self.payload)
    }
}

/// Returns `now + ttl`, refusing lifetimes the clock cannot represent.
pub fn expiry_after(now: SystemTime, ttl: Duration) -> Result<SystemTime> {
    now.checked_add(ttl).ok_or_else(|| {
        CacheError::new(
            ErrorCode::StorageFailure,
            format!("Entry lifetime of {}s is out of range", ttl.as_secs()),
        )
    })
}

/// Computes the hex SHA-256 digest stored next to every payload.
pub fn payload_digest(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(&hasher.finalize())
}

/// Converts a timestamp into milliseconds since the Unix epoch.
pub fn to_unix_millis(time: SystemTime) -> i64 {
    let millis = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis();
    i64::try_from(millis).unwrap_or(i64::MAX)
}

/// Converts milliseconds since the Unix epoch into a timestamp.
pub fn from_unix_millis(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}

/// Encode bytes as hex string.
mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut s = String::with_capacity(bytes.len() * 2);
        for &b in bytes {
            s.push(HEX_CHARS[(b >> 4) as usize] as char);
            s.push(HEX_CHARS[(b & 0xf) as usize] as char);
        }
        s
    }
}
