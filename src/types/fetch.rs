//! Message types exchanged with the background fetch worker.
//!
//! Every request carries a correlation id assigned by the worker handle. The
//! worker answers with exactly one terminal [`FetchOutcome`] and may emit any
//! number of [`FetchProgress`] updates before it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CacheError, ErrorCode};

/// Identifier pairing a request with its terminal reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// A download request for one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// URL the payload is downloaded from.
    pub url: String,
    /// Track the payload belongs to.
    pub track_id: String,
    /// Title, used only for log messages.
    pub track_title: String,
}

impl FetchRequest {
    pub fn new(
        url: impl Into<String>,
        track_id: impl Into<String>,
        track_title: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            track_id: track_id.into(),
            track_title: track_title.into(),
        }
    }
}

/// Terminal reply to a [`FetchRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The payload was downloaded and staged under a local object URL.
    Complete {
        correlation_id: CorrelationId,
        track_id: String,
        blob_url: String,
    },
    /// The download was refused or did not complete.
    Failed {
        correlation_id: CorrelationId,
        track_id: String,
        code: ErrorCode,
        message: String,
    },
}

impl FetchOutcome {
    /// Builds a failure reply from a cache error.
    pub fn failed(correlation_id: CorrelationId, track_id: impl Into<String>, err: &CacheError) -> Self {
        FetchOutcome::Failed {
            correlation_id,
            track_id: track_id.into(),
            code: err.code,
            message: err.message.clone(),
        }
    }

    /// Returns the correlation id of the originating request.
    pub fn correlation_id(&self) -> CorrelationId {
        match self {
            FetchOutcome::Complete { correlation_id, .. }
            | FetchOutcome::Failed { correlation_id, .. } => *correlation_id,
        }
    }

    /// Returns the track id of the originating request.
    pub fn track_id(&self) -> &str {
        match self {
            FetchOutcome::Complete { track_id, .. } | FetchOutcome::Failed { track_id, .. } => {
                track_id
            }
        }
    }

    /// Returns the staged object URL on success.
    pub fn blob_url(&self) -> Option<&str> {
        match self {
            FetchOutcome::Complete { blob_url, .. } => Some(blob_url),
            FetchOutcome::Failed { .. } => None,
        }
    }

    /// Returns the error code on failure.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            FetchOutcome::Complete { .. } => None,
            FetchOutcome::Failed { code, .. } => Some(*code),
        }
    }
}

/// Non-terminal download progress. Best effort only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchProgress {
    /// Bytes received so far.
    pub loaded: u64,
    /// Declared total size, if the origin sent one.
    pub total: Option<u64>,
    /// 0-100 when the total is known.
    pub percent_complete: Option<u8>,
}

impl FetchProgress {
    pub fn new(loaded: u64, total: Option<u64>) -> Self {
        let percent_complete = total.filter(|t| *t > 0).map(|t| {
            let percent = loaded.saturating_mul(100) / t;
            percent.min(100) as u8
        });
        Self {
            loaded,
            total,
            percent_complete,
        }
    }
}
