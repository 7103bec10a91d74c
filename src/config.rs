//! Cache configuration module.
//!
//! Contains the runtime configuration for the cache and playback pipeline:
//! storage location, origin endpoint, expiration policy, payload ceiling,
//! timeouts and retry bounds.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default lifetime of a cached payload (30 days).
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Shortest lifetime accepted for a cached payload.
pub const MIN_ENTRY_TTL: Duration = Duration::from_secs(60 * 60);

/// Longest lifetime accepted for a cached payload (100 years).
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Default payload ceiling (50 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Default ceiling for the initial connection and the size probe.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between expiration sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default delay between playback start attempts.
pub const DEFAULT_PLAY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default number of playback start attempts.
pub const DEFAULT_MAX_PLAY_ATTEMPTS: u32 = 15;

/// Runtime configuration for the cache pipeline.
///
/// Typically loaded from environment variables by the composition root
/// and handed to each component at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path of the SQLite database holding cached payloads.
    /// If None, uses the platform-specific default cache location.
    pub db_path: Option<PathBuf>,

    /// Base URL of the origin media server.
    pub origin_base_url: String,

    /// Lifetime applied to every saved payload.
    pub entry_ttl: Duration,

    /// Payloads above this size are never cached.
    pub max_payload_bytes: u64,

    /// Ceiling for establishing the origin connection and for the size probe.
    pub connect_timeout: Duration,

    /// Interval between expiration sweeps. One sweep also runs at startup.
    pub sweep_interval: Duration,

    /// Delay between playback start attempts.
    pub play_retry_delay: Duration,

    /// Total playback start attempts before giving up.
    pub max_play_attempts: u32,
}

impl CacheConfig {
    /// Creates a new CacheConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a CacheConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `TUNECACHE_DB_PATH` - Path to the blob database file
    /// - `TUNECACHE_ORIGIN_URL` - Base URL of the origin media server
    /// - `TUNECACHE_TTL_SECS` - Entry lifetime in seconds (3600 to 100 years)
    /// - `TUNECACHE_MAX_PAYLOAD_MB` - Payload ceiling in MiB
    /// - `TUNECACHE_CONNECT_TIMEOUT_SECS` - Connection and probe timeout
    /// - `TUNECACHE_SWEEP_INTERVAL_SECS` - Seconds between expiration sweeps
    /// - `TUNECACHE_MAX_PLAY_ATTEMPTS` - Playback start attempts
    ///
    /// Falls back to defaults for unset or invalid variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("TUNECACHE_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Ok(url) = std::env::var("TUNECACHE_ORIGIN_URL") {
            let url = url.trim_end_matches('/');
            if !url.is_empty() {
                config.origin_base_url = url.to_string();
            }
        }

        if let Some(ttl) = env_u64("TUNECACHE_TTL_SECS").and_then(ttl_in_range) {
            config.entry_ttl = ttl;
        }

        if let Some(mb) = env_u64("TUNECACHE_MAX_PAYLOAD_MB") {
            if mb > 0 {
                config.max_payload_bytes = mb * 1024 * 1024;
            }
        }

        if let Some(secs) = env_u64("TUNECACHE_CONNECT_TIMEOUT_SECS") {
            if secs > 0 {
                config.connect_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(secs) = env_u64("TUNECACHE_SWEEP_INTERVAL_SECS") {
            if secs > 0 {
                config.sweep_interval = Duration::from_secs(secs);
            }
        }

        if let Some(attempts) = env_u64("TUNECACHE_MAX_PLAY_ATTEMPTS") {
            if (1..=100).contains(&attempts) {
                config.max_play_attempts = attempts as u32;
            }
        }

        config
    }

    /// Returns the effective database path, using platform defaults if not specified.
    pub fn effective_db_path(&self) -> PathBuf {
        if let Some(ref path) = self.db_path {
            path.clone()
        } else {
            default_db_path()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_bytes == 0 {
            return Err(CacheError::invalid_config("max_payload_bytes must be > 0"));
        }
        if self.entry_ttl < MIN_ENTRY_TTL {
            return Err(CacheError::invalid_config(format!(
                "entry_ttl too short: {}s (minimum {}s)",
                self.entry_ttl.as_secs(),
                MIN_ENTRY_TTL.as_secs()
            )));
        }
        if self.entry_ttl > MAX_ENTRY_TTL {
            return Err(CacheError::invalid_config(format!(
                "entry_ttl too long: {}s (maximum {}s)",
                self.entry_ttl.as_secs(),
                MAX_ENTRY_TTL.as_secs()
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(CacheError::invalid_config("sweep_interval must be > 0"));
        }
        if self.max_play_attempts == 0 {
            return Err(CacheError::invalid_config("max_play_attempts must be > 0"));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            origin_base_url: "http://localhost:8000".to_string(),
            entry_ttl: DEFAULT_ENTRY_TTL,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            play_retry_delay: DEFAULT_PLAY_RETRY_DELAY,
            max_play_attempts: DEFAULT_MAX_PLAY_ATTEMPTS,
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse::<u64>().ok()
}

fn ttl_in_range(secs: u64) -> Option<Duration> {
    let ttl = Duration::from_secs(secs);
    (MIN_ENTRY_TTL..=MAX_ENTRY_TTL).contains(&ttl).then_some(ttl)
}

/// Returns the platform-specific default database path.
///
/// - macOS: ~/Library/Caches/tunecache/blobs.sqlite3
/// - Linux: ~/.cache/tunecache/blobs.sqlite3
/// - Windows: C:\Users\<user>\AppData\Local\tunecache\cache\blobs.sqlite3
fn default_db_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "tunecache") {
        proj_dirs.cache_dir().join("blobs.sqlite3")
    } else {
        // Fallback to current directory
        PathBuf::from("./blobs.sqlite3")
    }
}
