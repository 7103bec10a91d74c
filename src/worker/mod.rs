//! Background fetch worker.
//!
//! The worker is a resident tokio task reached only through message passing.
//! Each request carries its own reply channel and correlation id, so
//! concurrent requests for different tracks never receive each other's
//! replies. Progress flows back on a per-request channel that the caller
//! drains into its listener before the terminal reply is handed out, so no
//! update is lost to scheduling.
//!
//! Every failure (network, size limit, missing worker) resolves to a
//! [`FetchOutcome::Failed`]; nothing is thrown across the boundary.

pub mod listeners;
pub mod origin;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::cache::ObjectUrlRegistry;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::types::{CorrelationId, FetchOutcome, FetchProgress, FetchRequest};

pub use listeners::{ListenerGuard, ProgressListener, ProgressListeners};
pub use origin::{HttpOrigin, Origin};

/// Limits enforced by the worker on every download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimits {
    /// Payloads above this size are refused.
    pub max_payload_bytes: u64,
    /// Ceiling for the size probe.
    pub probe_timeout: Duration,
}

impl From<&CacheConfig> for WorkerLimits {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_payload_bytes: config.max_payload_bytes,
            probe_timeout: config.connect_timeout,
        }
    }
}

/// Message sent to the worker task.
#[derive(Debug)]
enum WorkerMessage {
    /// Download a payload and answer on `reply`.
    Process {
        correlation_id: CorrelationId,
        request: FetchRequest,
        reply: oneshot::Sender<FetchOutcome>,
        progress: mpsc::UnboundedSender<FetchProgress>,
    },
    /// Stop accepting requests.
    Shutdown,
}

/// Caller-side handle to the worker. Cheap to clone.
#[derive(Clone)]
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<WorkerMessage>,
    next_id: Arc<AtomicU64>,
    listeners: ProgressListeners,
}

/// Spawns the worker and its progress dispatcher on the current runtime.
///
/// The worker stages downloaded payloads in `objects` and replies with the
/// resulting object URL.
pub fn spawn_worker<O: Origin>(
    origin: O,
    objects: ObjectUrlRegistry,
    limits: WorkerLimits,
) -> WorkerHandle {
    let (sender, receiver) = mpsc::unbounded_channel::<WorkerMessage>();
    tokio::spawn(worker_loop(Arc::new(origin), objects, limits, receiver));

    WorkerHandle {
        sender,
        next_id: Arc::new(AtomicU64::new(1)),
        listeners: ProgressListeners::new(),
    }
}

impl WorkerHandle {
    /// Sends `request` to the worker and waits for its terminal reply.
    ///
    /// `on_progress`, if given, is registered for the request's track id and
    /// removed before this returns, whatever the outcome. Every progress
    /// update the worker emitted is delivered before this returns.
    pub async fn process(
        &self,
        request: FetchRequest,
        on_progress: Option<ProgressListener>,
    ) -> FetchOutcome {
        let correlation_id = CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let track_id = request.track_id.clone();
        let _listener = on_progress
            .map(|listener| self.listeners.register(&track_id, correlation_id, listener));

        let (reply, mut response) = oneshot::channel();
        let (progress, mut updates) = mpsc::unbounded_channel();
        let message = WorkerMessage::Process {
            correlation_id,
            request,
            reply,
            progress,
        };

        if self.sender.send(message).is_err() {
            log::warn!("No active fetch worker for track {}", track_id);
            return FetchOutcome::failed(correlation_id, track_id, &CacheError::worker_unavailable());
        }

        let reply = loop {
            tokio::select! {
                Some(update) = updates.recv() => {
                    self.listeners.notify(&track_id, correlation_id, update);
                }
                reply = &mut response => break reply,
            }
        };
        // Updates are sent before the reply, so whatever is left is already queued.
        while let Ok(update) = updates.try_recv() {
            self.listeners.notify(&track_id, correlation_id, update);
        }

        match reply {
            Ok(outcome) => {
                if outcome.correlation_id() != correlation_id {
                    log::error!(
                        "Reply {} does not match request {} for track {}",
                        outcome.correlation_id(),
                        correlation_id,
                        track_id
                    );
                }
                outcome
            }
            Err(_) => {
                log::warn!("Fetch worker dropped request {} for track {}", correlation_id, track_id);
                FetchOutcome::failed(correlation_id, track_id, &CacheError::worker_unavailable())
            }
        }
    }

    /// Returns true while the worker accepts requests.
    pub fn is_active(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Asks the worker to stop. Requests already running finish normally.
    pub fn shutdown(&self) {
        self.sender.send(WorkerMessage::Shutdown).ok();
    }

    /// Returns the listener registry, mainly for inspection.
    pub fn listeners(&self) -> &ProgressListeners {
        &self.listeners
    }
}

/// The resident loop: one task per request so slow downloads do not block others.
async fn worker_loop<O: Origin>(
    origin: Arc<O>,
    objects: ObjectUrlRegistry,
    limits: WorkerLimits,
    mut receiver: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    log::debug!("Fetch worker started");
    while let Some(message) = receiver.recv().await {
        match message {
            WorkerMessage::Process {
                correlation_id,
                request,
                reply,
                progress,
            } => {
                let origin = Arc::clone(&origin);
                let objects = objects.clone();
                tokio::spawn(async move {
                    let track_id = request.track_id.clone();
                    let outcome = match download(origin.as_ref(), &request, limits, &progress).await {
                        Ok(payload) => FetchOutcome::Complete {
                            correlation_id,
                            track_id: track_id.clone(),
                            blob_url: objects.create(payload),
                        },
                        Err(e) => {
                            log::warn!(
                                "Download of {} ({}) failed: {}",
                                request.track_title,
                                track_id,
                                e
                            );
                            FetchOutcome::failed(correlation_id, track_id, &e)
                        }
                    };

                    if let Err(unsent) = reply.send(outcome) {
                        // Caller went away; do not leak the staged payload.
                        if let Some(url) = unsent.blob_url() {
                            objects.revoke(url);
                        }
                    }
                });
            }
            WorkerMessage::Shutdown => {
                receiver.close();
            }
        }
    }
    log::debug!("Fetch worker stopped");
}

/// Probes, downloads and validates one payload.
async fn download<O: Origin>(
    origin: &O,
    request: &FetchRequest,
    limits: WorkerLimits,
    progress: &mpsc::UnboundedSender<FetchProgress>,
) -> Result<Vec<u8>> {
    log::debug!("Processing payload for {} ({})", request.track_title, request.track_id);

    let declared = match tokio::time::timeout(limits.probe_timeout, origin.probe(&request.url)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(CacheError::network(format!(
                "size probe for {} timed out after {:?}",
                request.url, limits.probe_timeout
            )))
        }
    };

    if let Some(size) = declared {
        if size > limits.max_payload_bytes {
            return Err(CacheError::size_limit_exceeded(size, limits.max_payload_bytes));
        }
    }

    let mut on_progress = |update: FetchProgress| {
        log::trace!("Progress for {}: {} bytes", request.track_id, update.loaded);
        // The caller may have gone away; progress is best effort.
        progress.send(update).ok();
    };
    let payload = origin
        .fetch(&request.url, limits.max_payload_bytes, &mut on_progress)
        .await?;

    // The declared length may be missing or wrong.
    let actual = payload.len() as u64;
    if actual > limits.max_payload_bytes {
        return Err(CacheError::size_limit_exceeded(actual, limits.max_payload_bytes));
    }

    log::debug!("Downloaded {} bytes for {}", actual, request.track_title);
    Ok(payload)
}
