use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use super::*;
use crate::cache::{is_object_url, SqliteBlobStore};
use crate::queue::PlayQueue;
use crate::types::FetchProgress;
use crate::worker::testing::FakeOrigin;
use crate::worker::{spawn_worker, WorkerLimits};

fn track(id: &str) -> Track {
    Track::new(id, format!("Title {}", id), "Artist", FakeOrigin::url(id))
}

struct Fixture {
    orchestrator: CacheOrchestrator,
    store: Arc<SqliteBlobStore>,
    queue: Arc<PlayQueue>,
    worker: WorkerHandle,
}

fn fixture(origin: FakeOrigin, config: &CacheConfig) -> Fixture {
    let store = Arc::new(SqliteBlobStore::open_in_memory().unwrap());
    let queue = Arc::new(PlayQueue::new());
    let objects = ObjectUrlRegistry::new();
    let worker = spawn_worker(origin, objects.clone(), WorkerLimits::from(config));
    let orchestrator = CacheOrchestrator::new(
        store.clone(),
        worker.clone(),
        queue.clone(),
        objects,
        config,
    )
    .unwrap();
    Fixture {
        orchestrator,
        store,
        queue,
        worker,
    }
}

fn cached(store: &SqliteBlobStore, id: &str) -> bool {
    store.contains_at(id, SystemTime::now()).unwrap()
}

#[tokio::test]
async fn miss_streams_from_origin_then_hit_is_local() {
    let origin = FakeOrigin::new().with_track("a", vec![7u8; 64]);
    let f = fixture(origin.clone(), &CacheConfig::default());

    let first = f.orchestrator.resolve_playable_url(&track("a"), false);
    assert_eq!(first.source, UrlSource::Origin);
    assert_eq!(first.url, FakeOrigin::url("a"));

    f.orchestrator.settled().await;
    assert!(cached(&f.store, "a"));
    assert!(f.orchestrator.in_flight().is_empty());

    let second = f.orchestrator.resolve_playable_url(&track("a"), false);
    assert!(second.is_cached());
    assert!(is_object_url(&second.url));
    let payload = f.orchestrator.objects().resolve(&second.url).unwrap();
    assert_eq!(payload.as_slice(), &[7u8; 64][..]);
    assert_eq!(origin.fetches("a"), 1);
}

#[tokio::test]
async fn back_to_back_requests_download_once() {
    let origin = FakeOrigin::new()
        .with_track("a", vec![1u8; 32])
        .with_delay("a", Duration::from_millis(50));
    let f = fixture(origin.clone(), &CacheConfig::default());

    let first = f.orchestrator.resolve_playable_url(&track("a"), false);
    let second = f.orchestrator.resolve_playable_url(&track("a"), false);
    assert_eq!(first.source, UrlSource::Origin);
    assert_eq!(second.source, UrlSource::Origin);
    assert_eq!(f.orchestrator.in_flight(), vec!["a".to_string()]);

    f.orchestrator.settled().await;
    assert_eq!(origin.fetches("a"), 1);
    assert!(f.orchestrator.in_flight().is_empty());
    assert_eq!(f.orchestrator.background_tasks(), 0);
}

#[tokio::test]
async fn hit_prefetches_exactly_one_track_ahead() {
    let origin = FakeOrigin::new()
        .with_track("b", vec![2u8; 16])
        .with_track("c", vec![3u8; 16]);
    let f = fixture(origin.clone(), &CacheConfig::default());
    f.queue.add([track("a"), track("b"), track("c")]);
    f.store
        .save_at("a", &[1u8; 16], Duration::from_secs(3600), SystemTime::now())
        .unwrap();

    let url = f.orchestrator.resolve_playable_url(&track("a"), true);
    assert!(url.is_cached());

    f.orchestrator.settled().await;
    assert!(cached(&f.store, "b"));
    assert!(!cached(&f.store, "c"));
    assert_eq!(origin.fetches("c"), 0);
    assert_eq!(origin.probes("c"), 0);
    assert_eq!(f.queue.current_index(), Some(0));
}

#[tokio::test]
async fn miss_prefetches_next_after_download() {
    let origin = FakeOrigin::new()
        .with_track("a", vec![1u8; 16])
        .with_track("b", vec![2u8; 16])
        .with_track("c", vec![3u8; 16]);
    let f = fixture(origin.clone(), &CacheConfig::default());
    f.queue.add([track("a"), track("b"), track("c")]);

    let url = f.orchestrator.resolve_playable_url(&track("a"), true);
    assert_eq!(url.source, UrlSource::Origin);

    f.orchestrator.settled().await;
    assert!(cached(&f.store, "a"));
    assert!(cached(&f.store, "b"));
    assert!(!cached(&f.store, "c"));
    assert_eq!(f.queue.current_index(), Some(0));
}

#[tokio::test]
async fn prefetch_of_cached_next_track_mints_no_url() {
    let origin = FakeOrigin::new();
    let f = fixture(origin.clone(), &CacheConfig::default());
    f.queue.add([track("a"), track("b")]);
    for id in ["a", "b"] {
        f.store
            .save_at(id, &[9u8; 8], Duration::from_secs(3600), SystemTime::now())
            .unwrap();
    }

    let url = f.orchestrator.resolve_playable_url(&track("a"), true);
    f.orchestrator.settled().await;

    assert!(url.is_cached());
    assert_eq!(f.orchestrator.objects().len(), 1);
    assert_eq!(origin.total_fetches(), 0);
}

#[tokio::test]
async fn oversized_track_is_never_stored() {
    let config = CacheConfig {
        max_payload_bytes: 1024,
        ..CacheConfig::default()
    };
    let origin = FakeOrigin::new().with_track("big", vec![0u8; 2048]);
    let f = fixture(origin.clone(), &config);

    let url = f.orchestrator.resolve_playable_url(&track("big"), false);
    assert_eq!(url.source, UrlSource::Origin);

    f.orchestrator.settled().await;
    assert!(!cached(&f.store, "big"));
    assert_eq!(origin.fetches("big"), 0);
    assert!(f.orchestrator.in_flight().is_empty());
    assert!(f.orchestrator.objects().is_empty());

    // Nothing was stored, so the next request tries again.
    f.orchestrator.resolve_playable_url(&track("big"), false);
    f.orchestrator.settled().await;
    assert_eq!(origin.probes("big"), 2);
}

#[tokio::test]
async fn network_failure_releases_the_track() {
    let f = fixture(FakeOrigin::new(), &CacheConfig::default());

    let url = f.orchestrator.resolve_playable_url(&track("missing"), false);
    assert_eq!(url.source, UrlSource::Origin);

    f.orchestrator.settled().await;
    assert!(f.orchestrator.in_flight().is_empty());
    assert!(!cached(&f.store, "missing"));
}

#[tokio::test]
async fn stopped_worker_leaves_playback_on_origin() {
    let origin = FakeOrigin::new().with_track("a", vec![1u8; 16]);
    let f = fixture(origin.clone(), &CacheConfig::default());

    f.worker.shutdown();
    tokio::time::timeout(Duration::from_secs(1), async {
        while f.worker.is_active() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("worker should stop");

    let url = f.orchestrator.resolve_playable_url(&track("a"), false);
    assert_eq!(url.source, UrlSource::Origin);

    f.orchestrator.settled().await;
    assert!(!cached(&f.store, "a"));
    assert!(f.orchestrator.in_flight().is_empty());
    assert_eq!(origin.total_fetches(), 0);
}

#[tokio::test]
async fn warm_reports_cached_tracks() {
    let origin = FakeOrigin::new().with_track("a", vec![1u8; 16]);
    let f = fixture(origin, &CacheConfig::default());

    assert!(!f.orchestrator.warm(&track("a")));
    f.orchestrator.settled().await;
    assert!(f.orchestrator.warm(&track("a")));
    assert!(f.orchestrator.objects().is_empty());
}

#[tokio::test]
async fn release_revokes_local_urls_only() {
    let f = fixture(FakeOrigin::new(), &CacheConfig::default());
    f.store
        .save_at("a", &[1u8; 4], Duration::from_secs(3600), SystemTime::now())
        .unwrap();

    let local = f.orchestrator.resolve_playable_url(&track("a"), false);
    assert_eq!(f.orchestrator.objects().len(), 1);
    f.orchestrator.release(&local);
    assert!(f.orchestrator.objects().is_empty());

    let remote = PlayableUrl::origin(&track("b"));
    f.orchestrator.release(&remote);
}

#[tokio::test]
async fn progress_listener_sees_every_background_download() {
    let origin = FakeOrigin::new()
        .with_track("a", vec![1u8; 16])
        .with_track("b", vec![2u8; 16])
        .with_delay("a", Duration::from_millis(20));
    let f = fixture(origin, &CacheConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    // Installed on a clone: every handle shares it.
    f.orchestrator
        .clone()
        .set_progress_listener(Some(Arc::new(move |id: &str, p: FetchProgress| {
            sink.lock().unwrap().push((id.to_string(), p.percent_complete));
        })));

    f.orchestrator.resolve_playable_url(&track("a"), false);
    f.orchestrator.resolve_playable_url(&track("b"), false);
    assert_eq!(f.orchestrator.background_tasks(), 2);
    f.orchestrator.settled().await;

    let seen = seen.lock().unwrap();
    for id in ["a", "b"] {
        assert!(seen.contains(&(id.to_string(), Some(100))), "no final update for {}", id);
    }
    drop(seen);

    f.orchestrator.set_progress_listener(None);
    assert!(f.orchestrator.progress_listener().is_none());
}

/// Store whose writes always fail, delegating everything else.
struct ReadOnlyStore {
    inner: SqliteBlobStore,
}

impl PayloadStore for ReadOnlyStore {
    fn save_at(&self, _: &str, _: &[u8], _: Duration, _: SystemTime) -> crate::error::Result<()> {
        Err(CacheError::new(ErrorCode::StorageFailure, "disk full"))
    }

    fn get_at(&self, track_id: &str, now: SystemTime) -> crate::error::Result<Option<Vec<u8>>> {
        self.inner.get_at(track_id, now)
    }

    fn contains_at(&self, track_id: &str, now: SystemTime) -> crate::error::Result<bool> {
        self.inner.contains_at(track_id, now)
    }

    fn sweep_expired_at(&self, now: SystemTime) -> crate::error::Result<usize> {
        self.inner.sweep_expired_at(now)
    }

    fn remove(&self, track_id: &str) -> crate::error::Result<bool> {
        self.inner.remove(track_id)
    }

    fn clear(&self) -> crate::error::Result<usize> {
        self.inner.clear()
    }

    fn stats_at(&self, now: SystemTime) -> crate::error::Result<crate::cache::StoreStats> {
        self.inner.stats_at(now)
    }
}

#[tokio::test]
async fn storage_failure_never_reaches_playback() {
    let inner = SqliteBlobStore::open_in_memory().unwrap();
    inner
        .save_at("old", b"kept", Duration::from_secs(3600), SystemTime::now())
        .unwrap();
    let store: Arc<dyn PayloadStore> = Arc::new(ReadOnlyStore { inner });

    let config = CacheConfig::default();
    let origin = FakeOrigin::new().with_track("new", vec![5u8; 16]);
    let objects = ObjectUrlRegistry::new();
    let worker = spawn_worker(origin.clone(), objects.clone(), WorkerLimits::from(&config));
    let orchestrator = CacheOrchestrator::new(
        Arc::clone(&store),
        worker,
        Arc::new(PlayQueue::new()),
        objects,
        &config,
    )
    .unwrap();

    let url = orchestrator.resolve_playable_url(&track("new"), false);
    assert_eq!(url.source, UrlSource::Origin);
    assert_eq!(url.url, FakeOrigin::url("new"));

    orchestrator.settled().await;
    assert_eq!(origin.fetches("new"), 1);
    assert!(orchestrator.in_flight().is_empty());
    assert!(!store.contains("new"));
    // Staged payload is not leaked when the write fails.
    assert!(orchestrator.objects().is_empty());

    // The failed write left the existing entry alone.
    let kept = orchestrator.resolve_playable_url(&track("old"), false);
    assert!(kept.is_cached());
    assert_eq!(
        orchestrator.objects().resolve(&kept.url).unwrap().as_slice(),
        b"kept"
    );

    // Still uncached, so the next request downloads again.
    let again = orchestrator.resolve_playable_url(&track("new"), false);
    assert_eq!(again.source, UrlSource::Origin);
    orchestrator.settled().await;
    assert_eq!(origin.fetches("new"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hit_resolves_on_a_multi_thread_runtime() {
    let origin = FakeOrigin::new().with_track("a", vec![4u8; 1024]);
    let f = fixture(origin, &CacheConfig::default());

    assert_eq!(
        f.orchestrator.resolve_playable_url(&track("a"), false).source,
        UrlSource::Origin
    );
    f.orchestrator.settled().await;

    let url = f.orchestrator.resolve_playable_url(&track("a"), false);
    assert!(url.is_cached());
    assert!(f.orchestrator.warm(&track("a")));
}

#[test]
fn construction_requires_a_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let objects = ObjectUrlRegistry::new();
    let config = CacheConfig::default();
    let worker = runtime.block_on(async {
        spawn_worker(FakeOrigin::new(), objects.clone(), WorkerLimits::from(&config))
    });

    let err = CacheOrchestrator::new(
        Arc::new(SqliteBlobStore::open_in_memory().unwrap()),
        worker,
        Arc::new(PlayQueue::new()),
        objects,
        &config,
    )
    .err()
    .unwrap();
    assert_eq!(err.code, ErrorCode::WorkerUnavailable);
}
