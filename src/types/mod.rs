//! Core types for tunecache.
//!
//! This module re-exports the data types shared across the pipeline:
//! - [`Track`]: A unit of playable audio with a stable identifier
//! - [`CacheEntry`]: A persisted payload with expiration metadata
//! - [`FetchRequest`], [`FetchOutcome`], [`FetchProgress`]: Fetch worker messages

mod entry;
mod fetch;
mod track;

pub use entry::{expiry_after, from_unix_millis, payload_digest, to_unix_millis, CacheEntry};
pub use fetch::{CorrelationId, FetchOutcome, FetchProgress, FetchRequest};
pub use track::{origin_stream_url, Track};
