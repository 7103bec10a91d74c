//! tunecache: command-line front end for the local audio cache.
//!
//! Composition root: builds the blob store, fetch worker and orchestrator
//! from configuration and runs one subcommand against them.

use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{anyhow, bail, Context};

use tunecache::cache::{spawn_sweeper, ObjectUrlRegistry, PayloadStore, SqliteBlobStore};
use tunecache::cli::{Cli, Command};
use tunecache::config::CacheConfig;
use tunecache::orchestrator::CacheOrchestrator;
use tunecache::queue::PlayQueue;
use tunecache::types::{FetchProgress, Track};
use tunecache::worker::{spawn_worker, HttpOrigin, WorkerLimits};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let mut config = CacheConfig::from_env();
    cli.apply_to(&mut config);
    config.validate()?;

    let db_path = config.effective_db_path();
    log::debug!("Using blob store at {}", db_path.display());
    let store: Arc<dyn PayloadStore> = Arc::new(SqliteBlobStore::open(&db_path)?);

    match &cli.command {
        Command::Warm { .. } => {
            let track = cli
                .command
                .warm_track(&config.origin_base_url)
                .ok_or_else(|| anyhow!("not a warm command"))?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
            runtime.block_on(warm(store, &config, track))
        }
        Command::Sweep => {
            let removed = store.sweep_expired_at(SystemTime::now())?;
            println!("Removed {} expired entries", removed);
            Ok(())
        }
        Command::Stats => {
            let stats = store.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Export { id, out } => {
            let payload = store
                .get_at(id, SystemTime::now())?
                .ok_or_else(|| anyhow!("Track {} is not cached", id))?;
            std::fs::write(out, &payload)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Wrote {} bytes to {}", payload.len(), out.display());
            Ok(())
        }
    }
}

/// Downloads `track` through the orchestrator and waits for it to settle.
async fn warm(store: Arc<dyn PayloadStore>, config: &CacheConfig, track: Track) -> anyhow::Result<()> {
    if let Some(reason) = track.validate() {
        bail!("Invalid track: {}", reason);
    }

    let mut sweeper = spawn_sweeper(Arc::clone(&store), config.sweep_interval);

    let objects = ObjectUrlRegistry::new();
    let origin = HttpOrigin::new(config.connect_timeout)?;
    let worker = spawn_worker(origin, objects.clone(), WorkerLimits::from(config));

    let queue = Arc::new(PlayQueue::new());
    queue.add([track.clone()]);

    let orchestrator =
        CacheOrchestrator::new(Arc::clone(&store), worker.clone(), queue, objects, config)?;
    orchestrator.set_progress_listener(Some(Arc::new(|track_id: &str, progress: FetchProgress| {
        if let Some(percent) = progress.percent_complete {
            log::info!("{}: {}%", track_id, percent);
        }
    })));

    if orchestrator.warm(&track) {
        println!("{} is already cached", track.track_id);
    } else {
        orchestrator.settled().await;
        if !store.contains(&track.track_id) {
            bail!("Download of {} did not complete; see log for the cause", track.track_id);
        }
        println!("Cached {}", track.track_id);
    }

    worker.shutdown();
    sweeper.stop();
    Ok(())
}
