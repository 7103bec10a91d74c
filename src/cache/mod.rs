//! Cache module for audio payload storage.
//!
//! Provides the durable blob store, the in-flight download set, local object
//! URLs and the periodic expiration sweep.

pub mod object_url;
pub mod processing;
pub mod store;
pub mod sweeper;

// Re-export commonly used types
pub use object_url::{is_object_url, ObjectUrlRegistry};
pub use processing::{ProcessingClaim, ProcessingSet};
pub use store::{PayloadStore, SqliteBlobStore, StoreStats};
pub use sweeper::{spawn_sweeper, SweeperHandle};
