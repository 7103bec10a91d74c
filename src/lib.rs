//! tunecache: local audio cache with next-track prefetch.
//!
//! Decides, for each track a player is about to play, whether the audio can
//! come from a local cache or must stream from the origin server, downloads
//! misses in the background without delaying playback, and warms the cache
//! for the track that plays next.
//!
//! # Modules
//!
//! - [`types`]: Core data types (Track, CacheEntry, fetch messages)
//! - [`cache`]: Durable blob store, processing set, sweeper, object URLs
//! - [`worker`]: Background fetch worker and origin access
//! - [`orchestrator`]: Cache-or-origin resolution and prefetch
//! - [`queue`]: Play queue and the peek interface the cache relies on
//! - [`playback`]: Playback driver with bounded start retries
//! - [`config`]: Runtime configuration (CacheConfig)
//! - [`error`]: Error types and codes (CacheError, ErrorCode)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tunecache::{
//!     cache::{ObjectUrlRegistry, SqliteBlobStore},
//!     config::CacheConfig,
//!     orchestrator::CacheOrchestrator,
//!     queue::PlayQueue,
//!     types::Track,
//!     worker::{spawn_worker, HttpOrigin, WorkerLimits},
//! };
//!
//! let config = CacheConfig::from_env();
//! let store = Arc::new(SqliteBlobStore::open(&config.effective_db_path())?);
//! let objects = ObjectUrlRegistry::new();
//! let worker = spawn_worker(
//!     HttpOrigin::new(config.connect_timeout)?,
//!     objects.clone(),
//!     WorkerLimits::from(&config),
//! );
//! let queue = Arc::new(PlayQueue::new());
//! let orchestrator = CacheOrchestrator::new(store, worker, queue, objects, &config)?;
//!
//! let track = Track::from_origin_base(&config.origin_base_url, "dQw4w9WgXcQ", "Title", "Artist");
//! // Returns the origin URL now; the next call returns a local URL.
//! let url = orchestrator.resolve_playable_url(&track, true);
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod playback;
pub mod queue;
pub mod types;
pub mod worker;

// Re-export commonly used types at crate root for convenience
pub use config::CacheConfig;
pub use error::{CacheError, ErrorCode, Result};
pub use orchestrator::{CacheOrchestrator, PlayableUrl, UrlSource};
pub use playback::{AudioOutput, PlaybackDriver, PlaybackState, PlaybackStatus};
pub use queue::{PlayQueue, QueueSource};
pub use types::{CacheEntry, Track};
