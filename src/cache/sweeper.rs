//! Periodic expiration sweep.
//!
//! Runs one sweep immediately and then one per interval until stopped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::store::PayloadStore;

/// Handle to the background sweep task. The task stops when the handle is dropped.
pub struct SweeperHandle {
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stops the sweep task.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Returns true while the sweep task is scheduled.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns the sweep loop on the current tokio runtime.
pub fn spawn_sweeper(store: Arc<dyn PayloadStore>, interval: Duration) -> SweeperHandle {
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            // First tick completes immediately: the startup sweep.
            ticker.tick().await;
            let store = Arc::clone(&store);
            let swept = tokio::task::spawn_blocking(move || store.sweep_expired()).await;
            if let Err(e) = swept {
                log::error!("Expiration sweep task failed: {}", e);
            }
        }
    });

    SweeperHandle {
        handle: Some(handle),
    }
}
