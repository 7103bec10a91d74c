//! Track type representing a unit of playable audio.
//!
//! Tracks are created by the search and queue layers and handed to the cache
//! as plain values. The cache never owns them; it only keys payloads by
//! `track_id`.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Path on the origin server that streams a track by id.
const ORIGIN_STREAM_PATH: &str = "/v1/youtube/stream";

/// A playable track.
///
/// Immutable once constructed. Two tracks are equal when their ids are equal,
/// regardless of the remaining metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Stable, globally unique identifier of the underlying media.
    pub track_id: String,

    /// Display title.
    pub title: String,

    /// Primary artist name.
    pub artist: String,

    /// URL the raw audio bytes can always be streamed from.
    pub origin_url: String,

    /// Optional cover art URL.
    #[serde(default)]
    pub artwork_url: Option<String>,

    /// Duration in seconds, when known.
    #[serde(default)]
    pub duration_sec: Option<f32>,
}

impl Track {
    /// Creates a new Track with an explicit origin URL.
    pub fn new(
        track_id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        origin_url: impl Into<String>,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            title: title.into(),
            artist: artist.into(),
            origin_url: origin_url.into(),
            artwork_url: None,
            duration_sec: None,
        }
    }

    /// Creates a Track whose origin URL is derived from the origin server base URL.
    pub fn from_origin_base(
        base_url: &str,
        track_id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        let track_id = track_id.into();
        let origin_url = origin_stream_url(base_url, &track_id);
        Self::new(track_id, title, artist, origin_url)
    }

    /// Sets the artwork URL.
    pub fn with_artwork(mut self, url: impl Into<String>) -> Self {
        self.artwork_url = Some(url.into());
        self
    }

    /// Sets the duration in seconds.
    pub fn with_duration(mut self, duration_sec: f32) -> Self {
        self.duration_sec = Some(duration_sec);
        self
    }

    /// Validates that the track can be cached.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.track_id.trim().is_empty() {
            return Some("Track ID cannot be empty".to_string());
        }

        if !(self.origin_url.starts_with("http://") || self.origin_url.starts_with("https://")) {
            return Some(format!(
                "Origin URL must be http(s), got {:?}",
                self.origin_url
            ));
        }

        if let Some(duration) = self.duration_sec {
            if !duration.is_finite() || duration < 0.0 {
                return Some(format!("Invalid duration: {}", duration));
            }
        }

        None
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.track_id == other.track_id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.track_id.hash(state);
    }
}

/// Builds the origin stream URL for a track id.
pub fn origin_stream_url(base_url: &str, track_id: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let mut url = String::with_capacity(base.len() + ORIGIN_STREAM_PATH.len() + track_id.len() + 3);
    url.push_str(base);
    url.push_str(ORIGIN_STREAM_PATH);
    url.push_str("?v=");
    for b in track_id.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                url.push(b as char)
            }
            _ => url.push_str(&format!("%{:02X}", b)),
        }
    }
    url
}
