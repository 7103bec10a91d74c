//! Error types for tunecache.
//!
//! Defines the error codes shared by the blob store, the fetch worker and
//! the playback driver. Cache-layer errors never reach the playback path;
//! they are logged and the caller falls back to the origin URL.

use std::fmt;

/// Error codes attached to every [`CacheError`].
///
/// Callers match on these to decide between "fall back to origin" and
/// "surface to the user".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Declared or actual payload is larger than the configured ceiling.
    /// Trigger: Content-Length probe or downloaded body above the limit.
    SizeLimitExceeded,

    /// The origin could not be reached or the transfer did not complete.
    /// Trigger: Timeout, abort, connection reset, non-success HTTP status.
    NetworkFailure,

    /// The durable blob store could not persist, read or sweep.
    /// Trigger: Disk full, locked database, corrupt file.
    StorageFailure,

    /// The audio output refused to start after every retry.
    /// Trigger: Autoplay policy, unsupported source, device unavailable.
    PlaybackStartFailure,

    /// No background fetch worker is running to accept the request.
    /// Trigger: Worker task stopped or was never started.
    WorkerUnavailable,

    /// Configuration value out of range.
    /// Trigger: Zero payload limit, TTL below one hour, zero sweep interval.
    InvalidConfig,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SizeLimitExceeded => "SIZE_LIMIT_EXCEEDED",
            ErrorCode::NetworkFailure => "NETWORK_FAILURE",
            ErrorCode::StorageFailure => "STORAGE_FAILURE",
            ErrorCode::PlaybackStartFailure => "PLAYBACK_START_FAILURE",
            ErrorCode::WorkerUnavailable => "WORKER_UNAVAILABLE",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::SizeLimitExceeded => "Audio payload exceeds the maximum cacheable size",
            ErrorCode::NetworkFailure => "Audio payload could not be fetched from the origin",
            ErrorCode::StorageFailure => "Durable blob store operation failed",
            ErrorCode::PlaybackStartFailure => "Audio output failed to start playback",
            ErrorCode::WorkerUnavailable => "No background fetch worker is active",
            ErrorCode::InvalidConfig => "Configuration value is out of range",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::SizeLimitExceeded => {
                "The track keeps streaming from the origin. Raise TUNECACHE_MAX_PAYLOAD_MB \
                 to cache larger tracks"
            }
            ErrorCode::NetworkFailure => {
                "Check connectivity to the origin server; the next request for this track \
                 will try again"
            }
            ErrorCode::StorageFailure => {
                "Check free disk space and permissions on TUNECACHE_DB_PATH, \
                 or delete the database file to start with an empty cache"
            }
            ErrorCode::PlaybackStartFailure => {
                "Interact with the player to satisfy autoplay policy, or skip to another track"
            }
            ErrorCode::WorkerUnavailable => {
                "Restart the session so the fetch worker is spawned again"
            }
            ErrorCode::InvalidConfig => {
                "Use a TTL between one hour and 100 years, and non-zero limits and intervals"
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for cache and playback operations.
#[derive(Debug)]
pub struct CacheError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CacheError {
    /// Creates a new CacheError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new CacheError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a SIZE_LIMIT_EXCEEDED error.
    pub fn size_limit_exceeded(size: u64, limit: u64) -> Self {
        Self::new(
            ErrorCode::SizeLimitExceeded,
            format!("Payload size {} bytes exceeds limit of {} bytes", size, limit),
        )
    }

    /// Creates a NETWORK_FAILURE error.
    pub fn network(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::NetworkFailure,
            format!("Fetch failed: {}", reason.into()),
        )
    }

    /// Creates a STORAGE_FAILURE error wrapping a SQLite error.
    pub fn storage(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::with_source(ErrorCode::StorageFailure, context, source)
    }

    /// Creates a PLAYBACK_START_FAILURE error.
    pub fn playback_start(track_id: &str, attempts: u32) -> Self {
        Self::new(
            ErrorCode::PlaybackStartFailure,
            format!(
                "Playback of {} did not start after {} attempts",
                track_id, attempts
            ),
        )
    }

    /// Creates a WORKER_UNAVAILABLE error.
    pub fn worker_unavailable() -> Self {
        Self::new(ErrorCode::WorkerUnavailable, "No active fetch worker")
    }

    /// Creates an INVALID_CONFIG error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, reason)
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        Self::storage("SQLite operation failed", err)
    }
}

/// Result type alias using CacheError.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_as_str() {
        assert_eq!(ErrorCode::SizeLimitExceeded.as_str(), "SIZE_LIMIT_EXCEEDED");
        assert_eq!(ErrorCode::NetworkFailure.as_str(), "NETWORK_FAILURE");
        assert_eq!(ErrorCode::StorageFailure.as_str(), "STORAGE_FAILURE");
        assert_eq!(ErrorCode::PlaybackStartFailure.as_str(), "PLAYBACK_START_FAILURE");
        assert_eq!(ErrorCode::WorkerUnavailable.as_str(), "WORKER_UNAVAILABLE");
        assert_eq!(ErrorCode::InvalidConfig.as_str(), "INVALID_CONFIG");
    }

    #[test]
    fn error_code_recovery_hints_not_empty() {
        for code in [
            ErrorCode::SizeLimitExceeded,
            ErrorCode::NetworkFailure,
            ErrorCode::StorageFailure,
            ErrorCode::PlaybackStartFailure,
            ErrorCode::WorkerUnavailable,
            ErrorCode::InvalidConfig,
        ] {
            assert!(!code.recovery_hint().is_empty());
            assert!(!code.description().is_empty());
        }
    }

    #[test]
    fn cache_error_display() {
        let err = CacheError::size_limit_exceeded(60, 50);
        let text = err.to_string();
        assert!(text.contains("SIZE_LIMIT_EXCEEDED"));
        assert!(text.contains("60"));
        assert!(text.contains("Recovery:"));
    }

    #[test]
    fn sqlite_errors_map_to_storage_failure() {
        let err: CacheError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.code, ErrorCode::StorageFailure);
        assert!(std::error::Error::source(&err).is_some());
    }
}
