//! In-flight download tracking.
//!
//! A track id is in the set from the moment its download is claimed until
//! the [`ProcessingClaim`] is dropped, which happens on every exit path of
//! the owning task, including early returns and panics.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of track ids currently being downloaded by this session.
#[derive(Debug, Clone, Default)]
pub struct ProcessingSet {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl ProcessingSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a download for `track_id` is in flight.
    pub fn contains(&self, track_id: &str) -> bool {
        self.lock().contains(track_id)
    }

    /// Atomically checks and inserts `track_id`.
    ///
    /// Returns `None` if the id is already claimed.
    pub fn try_claim(&self, track_id: &str) -> Option<ProcessingClaim> {
        let inserted = self.lock().insert(track_id.to_string());
        if !inserted {
            return None;
        }
        Some(ProcessingClaim {
            ids: Arc::clone(&self.ids),
            track_id: track_id.to_string(),
        })
    }

    /// Returns the number of in-flight downloads.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the in-flight ids in sorted order.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Membership of one track id in a [`ProcessingSet`]. Removed on drop.
#[derive(Debug)]
pub struct ProcessingClaim {
    ids: Arc<Mutex<HashSet<String>>>,
    track_id: String,
}

impl ProcessingClaim {
    /// Returns the claimed track id.
    pub fn track_id(&self) -> &str {
        &self.track_id
    }
}

impl Drop for ProcessingClaim {
    fn drop(&mut self) {
        let mut ids = self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.remove(&self.track_id);
    }
}
