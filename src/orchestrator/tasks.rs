//! Counting of background downloads, so callers can wait for quiescence.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub(super) struct TaskCounter {
    running: Arc<watch::Sender<usize>>,
}

impl TaskCounter {
    pub(super) fn new() -> Self {
        let (running, _) = watch::channel(0);
        Self {
            running: Arc::new(running),
        }
    }

    pub(super) fn running(&self) -> usize {
        *self.running.borrow()
    }

    /// Resolves once no guard is alive.
    pub(super) async fn wait_idle(&self) {
        let mut idle = self.running.subscribe();
        // The sender lives in `self`, so this only ends when the count hits zero.
        idle.wait_for(|running| *running == 0).await.ok();
    }
}

/// Counts one task as running until dropped.
pub(super) struct TaskGuard {
    counter: TaskCounter,
}

impl TaskGuard {
    pub(super) fn new(counter: &TaskCounter) -> Self {
        counter.running.send_modify(|running| *running += 1);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.counter
            .running
            .send_modify(|running| *running = running.saturating_sub(1));
    }
}
