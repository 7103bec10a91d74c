//! Playback driver.
//!
//! Binds resolved URLs to an [`AudioOutput`], retries refused starts a
//! bounded number of times, and walks the play queue. The driver owns no
//! cache state; every track change goes through
//! [`CacheOrchestrator::resolve_playable_url`] with next-track prefetch on.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::orchestrator::{CacheOrchestrator, PlayableUrl, UrlSource};
use crate::queue::{PlayQueue, QueueSource};
use crate::types::Track;

/// The device or element that actually renders audio.
pub trait AudioOutput: Send {
    /// Replaces the current source. Playback stops until [`Self::play`].
    fn set_source(&mut self, url: &str);

    /// Starts or resumes playback. May be refused, e.g. by autoplay policy.
    fn play(&mut self) -> Result<()>;

    /// Pauses playback.
    fn pause(&mut self);

    /// Current position in the source.
    fn position(&self) -> Duration;

    /// Length of the source, once known.
    fn duration(&self) -> Option<Duration>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
    /// Start was refused on every attempt.
    Failed,
}

/// Snapshot of the driver for display.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub track: Option<Track>,
    pub elapsed_sec: f64,
    pub duration_sec: Option<f64>,
    /// Whether the current source is local or streamed.
    pub source: Option<UrlSource>,
}

struct Loaded {
    track: Track,
    url: PlayableUrl,
}

/// Drives an [`AudioOutput`] from a [`PlayQueue`].
pub struct PlaybackDriver<A: AudioOutput> {
    orchestrator: CacheOrchestrator,
    queue: Arc<PlayQueue>,
    output: A,
    loaded: Option<Loaded>,
    status: PlaybackStatus,
    retry_delay: Duration,
    max_attempts: u32,
}

impl<A: AudioOutput> PlaybackDriver<A> {
    pub fn new(
        orchestrator: CacheOrchestrator,
        queue: Arc<PlayQueue>,
        output: A,
        config: &CacheConfig,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            output,
            loaded: None,
            status: PlaybackStatus::Stopped,
            retry_delay: config.play_retry_delay,
            max_attempts: config.max_play_attempts.max(1),
        }
    }

    /// Plays `track`, or toggles play/pause if it is already loaded.
    ///
    /// If the track is queued it becomes the queue's current entry, so the
    /// prefetch and end-of-track advance follow it.
    pub async fn play_track(&mut self, track: Track) -> Result<()> {
        if self.current_track() == Some(&track) {
            return self.toggle_play_pause().await;
        }

        if let Some(index) = self.queue.tracks().iter().position(|t| *t == track) {
            self.queue.select(index);
        }
        self.load_and_start(track).await
    }

    /// Plays the queue's current entry from the start.
    pub async fn play_queue_current(&mut self) -> Result<()> {
        match self.queue.current() {
            Some(track) => self.load_and_start(track).await,
            None => {
                self.stop();
                Ok(())
            }
        }
    }

    pub async fn toggle_play_pause(&mut self) -> Result<()> {
        match self.status {
            PlaybackStatus::Playing => {
                self.pause();
                Ok(())
            }
            _ if self.loaded.is_some() => self.start().await,
            _ => self.play_queue_current().await,
        }
    }

    pub fn pause(&mut self) {
        if self.status == PlaybackStatus::Playing {
            self.output.pause();
            self.status = PlaybackStatus::Paused;
        }
    }

    /// Skips to the following queue entry. Stops at the end of the queue.
    pub async fn next(&mut self) -> Result<()> {
        match self.queue.peek_next(true) {
            Some(track) => self.load_and_start(track).await,
            None => {
                log::debug!("End of queue");
                self.stop();
                Ok(())
            }
        }
    }

    /// Goes back to the preceding queue entry.
    pub async fn previous(&mut self) -> Result<()> {
        match self.queue.previous() {
            Some(track) => self.load_and_start(track).await,
            None => Ok(()),
        }
    }

    /// Called by the output when the current source finished naturally.
    pub async fn on_track_ended(&mut self) -> Result<()> {
        if let Some(loaded) = &self.loaded {
            log::debug!("Finished {} ({})", loaded.track.title, loaded.track.track_id);
        }
        self.next().await
    }

    pub fn state(&self) -> PlaybackState {
        let loaded = self.loaded.as_ref();
        PlaybackState {
            status: self.status,
            track: loaded.map(|l| l.track.clone()),
            elapsed_sec: loaded.map_or(0.0, |_| self.output.position().as_secs_f64()),
            duration_sec: loaded.and_then(|_| self.output.duration()).map(|d| d.as_secs_f64()),
            source: loaded.map(|l| l.url.source),
        }
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.loaded.as_ref().map(|l| &l.track)
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn output(&self) -> &A {
        &self.output
    }

    async fn load_and_start(&mut self, track: Track) -> Result<()> {
        self.load(track);
        self.start().await
    }

    fn load(&mut self, track: Track) {
        self.output.pause();
        if let Some(previous) = self.loaded.take() {
            self.orchestrator.release(&previous.url);
        }

        let url = self.orchestrator.resolve_playable_url(&track, true);
        log::info!(
            "Loading {} ({}) from {:?}",
            track.title,
            track.track_id,
            url.source
        );
        self.output.set_source(&url.url);
        self.loaded = Some(Loaded { track, url });
        self.status = PlaybackStatus::Stopped;
    }

    /// Starts the loaded source, retrying refused starts with a fixed delay.
    async fn start(&mut self) -> Result<()> {
        let Some(track_id) = self.loaded.as_ref().map(|l| l.track.track_id.clone()) else {
            return Ok(());
        };

        for attempt in 1..=self.max_attempts {
            match self.output.play() {
                Ok(()) => {
                    if attempt > 1 {
                        log::debug!("Playback of {} started on attempt {}", track_id, attempt);
                    }
                    self.status = PlaybackStatus::Playing;
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "Playback of {} refused (attempt {}/{}): {}",
                        track_id,
                        attempt,
                        self.max_attempts,
                        e.message
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        let err = CacheError::playback_start(&track_id, self.max_attempts);
        log::error!("{}", err);
        self.status = PlaybackStatus::Failed;
        Err(err)
    }

    fn stop(&mut self) {
        self.output.pause();
        self.status = PlaybackStatus::Stopped;
    }
}
