//! Command-line interface for the tunecache binary.
//!
//! Exposes the blob store and the download path without a player attached:
//! warming the cache for a track, sweeping expired entries, reporting store
//! statistics and exporting a cached payload to a file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CacheConfig;
use crate::types::Track;

/// tunecache: local audio cache with next-track prefetch
#[derive(Parser, Debug)]
#[command(name = "tunecache")]
#[command(about = "Local audio cache for streamed music playback")]
#[command(version)]
pub struct Cli {
    /// Path of the blob database (overrides TUNECACHE_DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Base URL of the origin media server (overrides TUNECACHE_ORIGIN_URL)
    #[arg(long, global = true)]
    pub origin: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Download a track into the cache unless it is already there
    Warm {
        /// Track identifier
        id: String,

        /// Stream URL; derived from the origin base URL if omitted
        #[arg(long)]
        url: Option<String>,

        /// Title used in log output
        #[arg(long)]
        title: Option<String>,
    },

    /// Delete expired entries
    Sweep,

    /// Print store statistics as JSON
    Stats,

    /// Write a cached payload to a file
    Export {
        /// Track identifier
        id: String,

        /// Output file path
        out: PathBuf,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Applies the global flags on top of `config`.
    pub fn apply_to(&self, config: &mut CacheConfig) {
        if let Some(ref db) = self.db {
            config.db_path = Some(db.clone());
        }
        if let Some(ref origin) = self.origin {
            config.origin_base_url = origin.trim_end_matches('/').to_string();
        }
    }
}

impl Command {
    /// Builds the track to warm, if this is a warm command.
    pub fn warm_track(&self, origin_base_url: &str) -> Option<Track> {
        let Command::Warm { id, url, title } = self else {
            return None;
        };
        let title = title.clone().unwrap_or_else(|| id.clone());
        Some(match url {
            Some(url) => Track::new(id.clone(), title, "", url.clone()),
            None => Track::from_origin_base(origin_base_url, id.clone(), title, ""),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn warm_defaults_to_origin_base() {
        let cli = parse(&["tunecache", "warm", "abc123"]);

        let track = cli.command.warm_track("http://localhost:8000").unwrap();
        assert_eq!(track.track_id, "abc123");
        assert_eq!(track.title, "abc123");
        assert_eq!(
            track.origin_url,
            "http://localhost:8000/v1/youtube/stream?v=abc123"
        );
    }

    #[test]
    fn warm_with_explicit_url() {
        let cli = parse(&[
            "tunecache",
            "warm",
            "abc123",
            "--url",
            "https://cdn.test/a.mp3",
            "--title",
            "Song",
        ]);
        let track = cli.command.warm_track("http://unused").unwrap();
        assert_eq!(track.origin_url, "https://cdn.test/a.mp3");
        assert_eq!(track.title, "Song");
    }

    #[test]
    fn global_flags_override_config() {
        let cli = parse(&[
            "tunecache",
            "stats",
            "--db",
            "/tmp/x.sqlite3",
            "--origin",
            "http://media.test/",
        ]);
        assert_eq!(cli.command, Command::Stats);

        let mut config = CacheConfig::default();
        cli.apply_to(&mut config);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/x.sqlite3")));
        assert_eq!(config.origin_base_url, "http://media.test");
    }

    #[test]
    fn export_takes_id_and_path() {
        let cli = parse(&["tunecache", "export", "t1", "out.mp3"]);
        assert_eq!(
            cli.command,
            Command::Export {
                id: "t1".to_string(),
                out: PathBuf::from("out.mp3"),
            }
        );
        assert!(cli.command.warm_track("http://x").is_none());
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["tunecache"]).is_err());
    }
}
