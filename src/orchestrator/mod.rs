//! Cache orchestrator.
//!
//! Decides, per track, whether playback gets a local URL backed by a cached
//! payload or the origin URL, and keeps the cache warm for the track that
//! plays next. Resolution never waits on the network: misses return the
//! origin URL at once and download in the background.

mod tasks;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::cache::{ObjectUrlRegistry, PayloadStore, ProcessingClaim, ProcessingSet};
use crate::config::CacheConfig;
use crate::error::{CacheError, ErrorCode, Result};
use crate::queue::QueueSource;
use crate::types::{FetchRequest, Track};
use crate::worker::{ProgressListener, WorkerHandle};

use tasks::{TaskCounter, TaskGuard};

/// Where a resolved URL points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlSource {
    /// A local object URL backed by a cached payload.
    Cache,
    /// The track's origin URL.
    Origin,
}

/// URL handed to the audio output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayableUrl {
    pub url: String,
    pub source: UrlSource,
}

impl PlayableUrl {
    fn origin(track: &Track) -> Self {
        Self {
            url: track.origin_url.clone(),
            source: UrlSource::Origin,
        }
    }

    /// Returns true if the URL is backed by the local cache.
    pub fn is_cached(&self) -> bool {
        self.source == UrlSource::Cache
    }
}

/// Why a track is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    /// The URL will be played; a hit mints a local URL.
    Playback,
    /// Only the cache is being warmed; a hit needs no URL.
    Warm,
}

/// Result of a cache lookup.
enum Lookup {
    /// Cached. Carries a local URL when one was requested.
    Hit(Option<String>),
    /// Not cached; a download is running or was just started.
    Pending,
}

struct Inner {
    store: Arc<dyn PayloadStore>,
    worker: WorkerHandle,
    queue: Arc<dyn QueueSource>,
    objects: ObjectUrlRegistry,
    processing: ProcessingSet,
    entry_ttl: Duration,
    on_progress: RwLock<Option<ProgressListener>>,
    runtime: Handle,
    tasks: TaskCounter,
}

/// Resolves playable URLs and runs background downloads. Cheap to clone.
#[derive(Clone)]
pub struct CacheOrchestrator {
    inner: Arc<Inner>,
}

impl CacheOrchestrator {
    /// Creates an orchestrator bound to the current tokio runtime.
    ///
    /// `objects` must be the registry the worker stages payloads in.
    pub fn new(
        store: Arc<dyn PayloadStore>,
        worker: WorkerHandle,
        queue: Arc<dyn QueueSource>,
        objects: ObjectUrlRegistry,
        config: &CacheConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            CacheError::with_source(
                ErrorCode::WorkerUnavailable,
                "Cache orchestrator needs a tokio runtime",
                e,
            )
        })?;

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                worker,
                queue,
                objects,
                processing: ProcessingSet::new(),
                entry_ttl: config.entry_ttl,
                on_progress: RwLock::new(None),
                runtime,
                tasks: TaskCounter::new(),
            }),
        })
    }

    /// Installs (or with `None` removes) the listener for download progress
    /// of every background fetch started from now on. Shared by all clones.
    pub fn set_progress_listener(&self, listener: Option<ProgressListener>) {
        *self
            .inner
            .on_progress
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = listener;
    }

    fn progress_listener(&self) -> Option<ProgressListener> {
        self.inner
            .on_progress
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns a URL playback can start on immediately.
    ///
    /// A cache hit yields a local URL; anything else yields the origin URL
    /// and, if no download is in flight for the track, starts one in the
    /// background. With `prefetch_next`, the queue's upcoming track is warmed
    /// as well, one track deep.
    pub fn resolve_playable_url(&self, track: &Track, prefetch_next: bool) -> PlayableUrl {
        match self.resolve(track, prefetch_next, Purpose::Playback) {
            Lookup::Hit(Some(url)) => PlayableUrl {
                url,
                source: UrlSource::Cache,
            },
            _ => PlayableUrl::origin(track),
        }
    }

    /// Warms the cache for `track` without producing a playable URL.
    ///
    /// Returns true if the track was already cached.
    pub fn warm(&self, track: &Track) -> bool {
        matches!(self.resolve(track, false, Purpose::Warm), Lookup::Hit(_))
    }

    fn resolve(&self, track: &Track, prefetch_next: bool, purpose: Purpose) -> Lookup {
        let inner = &self.inner;
        let track_id = track.track_id.as_str();

        if inner.processing.contains(track_id) {
            log::debug!("{} ({}) is already downloading, using origin", track.title, track_id);
            return Lookup::Pending;
        }

        let hit = match purpose {
            Purpose::Playback => blocking_lookup(|| inner.store.get(track_id))
                .map(|payload| Some(inner.objects.create(payload))),
            Purpose::Warm => blocking_lookup(|| inner.store.contains(track_id)).then_some(None),
        };

        if let Some(url) = hit {
            log::debug!("Cache hit for {} ({})", track.title, track_id);
            if prefetch_next {
                self.prefetch_next();
            }
            return Lookup::Hit(url);
        }

        // Lost a race with a concurrent resolve between the check and here.
        let Some(claim) = inner.processing.try_claim(track_id) else {
            return Lookup::Pending;
        };

        log::debug!("Cache miss for {} ({}), downloading in background", track.title, track_id);
        self.spawn_download(track.clone(), claim, prefetch_next);
        Lookup::Pending
    }

    fn spawn_download(&self, track: Track, claim: ProcessingClaim, prefetch_next: bool) {
        let guard = TaskGuard::new(&self.inner.tasks);
        let this = self.clone();
        self.inner.runtime.spawn(async move {
            let _guard = guard;
            this.download_and_store(&track, claim).await;
            if prefetch_next {
                this.prefetch_next();
            }
        });
    }

    /// Fetches through the worker and persists the payload. The claim is
    /// released when this returns, on every path.
    async fn download_and_store(&self, track: &Track, claim: ProcessingClaim) {
        let inner = &self.inner;
        let request = FetchRequest::new(&track.origin_url, &track.track_id, &track.title);
        let outcome = inner.worker.process(request, self.progress_listener()).await;

        let Some(blob_url) = outcome.blob_url() else {
            log::debug!(
                "No payload for {} ({:?}), playback stays on origin",
                claim.track_id(),
                outcome.error_code()
            );
            return;
        };

        let Some(payload) = inner.objects.take(blob_url) else {
            log::warn!("Staged payload for {} vanished before it was stored", claim.track_id());
            return;
        };

        let store = Arc::clone(&inner.store);
        let track_id = track.track_id.clone();
        let ttl = inner.entry_ttl;
        if let Err(e) = tokio::task::spawn_blocking(move || store.save(&track_id, &payload, ttl)).await {
            log::error!("Storing payload for {} failed: {}", track.track_id, e);
        }
    }

    /// Warms the queue's upcoming track without moving the play position.
    fn prefetch_next(&self) {
        if let Some(next) = self.inner.queue.peek_next(false) {
            log::debug!("Prefetching next track {} ({})", next.title, next.track_id);
            self.resolve(&next, false, Purpose::Warm);
        }
    }

    /// Waits until every background download started so far has finished.
    pub async fn settled(&self) {
        self.inner.tasks.wait_idle().await;
    }

    /// Revokes a local URL previously returned by [`Self::resolve_playable_url`].
    pub fn release(&self, url: &PlayableUrl) {
        if url.is_cached() {
            self.inner.objects.revoke(&url.url);
        }
    }

    /// Number of background downloads not yet finished.
    pub fn background_tasks(&self) -> usize {
        self.inner.tasks.running()
    }

    /// Track ids with a download in flight.
    pub fn in_flight(&self) -> Vec<String> {
        self.inner.processing.snapshot()
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn PayloadStore> {
        &self.inner.store
    }

    /// Returns the object URL registry.
    pub fn objects(&self) -> &ObjectUrlRegistry {
        &self.inner.objects
    }
}

/// Runs a store lookup, moving other tasks off this worker thread first when
/// called from a multi-thread runtime. Payload reads can be large.
fn blocking_lookup<T>(lookup: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(lookup),
        _ => lookup(),
    }
}

#[cfg(test)]
mod tests;
