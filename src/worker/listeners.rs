//! Progress listener registry.
//!
//! At most one listener per track id. A listener is registered when a
//! download starts and removed by dropping its [`ListenerGuard`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::{CorrelationId, FetchProgress};

/// Callback receiving `(track_id, progress)`.
pub type ProgressListener = Arc<dyn Fn(&str, FetchProgress) + Send + Sync>;

type ListenerMap = HashMap<String, (CorrelationId, ProgressListener)>;

/// Track id to listener mapping shared by a worker handle and its dispatcher.
#[derive(Clone, Default)]
pub struct ProgressListeners {
    listeners: Arc<Mutex<ListenerMap>>,
}

impl ProgressListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `track_id`, replacing any previous one.
    pub fn register(
        &self,
        track_id: &str,
        correlation_id: CorrelationId,
        listener: ProgressListener,
    ) -> ListenerGuard {
        self.lock()
            .insert(track_id.to_string(), (correlation_id, listener));
        ListenerGuard {
            listeners: Arc::clone(&self.listeners),
            track_id: track_id.to_string(),
            correlation_id,
        }
    }

    /// Delivers `progress` to the listener for `track_id`, if any.
    pub fn notify(&self, track_id: &str, correlation_id: CorrelationId, progress: FetchProgress) {
        let listener = match self.lock().get(track_id) {
            Some((id, listener)) if *id == correlation_id => Arc::clone(listener),
            _ => return,
        };
        // Called outside the lock so listeners may touch the registry.
        listener(track_id, progress);
    }

    /// Returns true if a listener is registered for `track_id`.
    pub fn contains(&self, track_id: &str) -> bool {
        self.lock().contains_key(track_id)
    }

    /// Returns the number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, ListenerMap> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Registration of one listener. Unregisters on drop.
pub struct ListenerGuard {
    listeners: Arc<Mutex<ListenerMap>>,
    track_id: String,
    correlation_id: CorrelationId,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let mut map = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // A newer registration for the same track stays in place.
        if matches!(map.get(&self.track_id), Some((id, _)) if *id == self.correlation_id) {
            map.remove(&self.track_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn noop() -> ProgressListener {
        Arc::new(|_: &str, _: FetchProgress| {})
    }

    fn counting_listener(counter: Arc<AtomicU64>) -> ProgressListener {
        Arc::new(move |_: &str, progress: FetchProgress| {
            counter.store(progress.loaded, Ordering::SeqCst);
        })
    }

    #[test]
    fn notify_reaches_registered_listener() {
        let listeners = ProgressListeners::new();
        let seen = Arc::new(AtomicU64::new(0));
        let _guard = listeners.register("t1", CorrelationId(1), counting_listener(seen.clone()));

        listeners.notify("t1", CorrelationId(1), FetchProgress::new(42, Some(100)));
        assert_eq!(seen.load(Ordering::SeqCst), 42);

        // Stale correlation ids and other tracks are ignored.
        listeners.notify("t1", CorrelationId(2), FetchProgress::new(7, None));
        listeners.notify("t2", CorrelationId(1), FetchProgress::new(9, None));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn guard_drop_unregisters() {
        let listeners = ProgressListeners::new();
        let guard = listeners.register("t1", CorrelationId(1), noop());
        assert!(listeners.contains("t1"));
        drop(guard);
        assert!(listeners.is_empty());
    }

    #[test]
    fn stale_guard_keeps_newer_registration() {
        let listeners = ProgressListeners::new();
        let old = listeners.register("t1", CorrelationId(1), noop());
        let _new = listeners.register("t1", CorrelationId(2), noop());

        drop(old);
        assert!(listeners.contains("t1"));
        assert_eq!(listeners.len(), 1);
    }
}
