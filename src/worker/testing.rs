//! In-memory origin used by unit tests across the crate.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::origin::Origin;
use crate::error::{CacheError, Result};
use crate::types::FetchProgress;

#[derive(Default)]
struct FakeTrack {
    declared: Option<u64>,
    body: Vec<u8>,
    hang_probe: bool,
    delay: Duration,
}

#[derive(Default)]
struct State {
    tracks: HashMap<String, FakeTrack>,
    probes: HashMap<String, usize>,
    fetches: HashMap<String, usize>,
}

/// Scriptable origin keyed by `http://origin.test/<id>` URLs.
#[derive(Clone, Default)]
pub(crate) struct FakeOrigin {
    state: Arc<Mutex<State>>,
}

impl FakeOrigin {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn url(id: &str) -> String {
        format!("http://origin.test/{}", id)
    }

    fn id_of(url: &str) -> String {
        url.rsplit('/').next().unwrap_or_default().to_string()
    }

    fn edit(self, id: &str, f: impl FnOnce(&mut FakeTrack)) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            f(state.tracks.entry(id.to_string()).or_default());
        }
        self
    }

    /// Serves `body` with a correct declared length.
    pub(crate) fn with_track(self, id: &str, body: Vec<u8>) -> Self {
        self.edit(id, |t| {
            t.declared = Some(body.len() as u64);
            t.body = body;
        })
    }

    /// Serves `body` but declares `declared` bytes.
    pub(crate) fn with_declared(self, id: &str, declared: u64, body: Vec<u8>) -> Self {
        self.edit(id, |t| {
            t.declared = Some(declared);
            t.body = body;
        })
    }

    /// Serves `body` without declaring a length.
    pub(crate) fn with_undeclared(self, id: &str, body: Vec<u8>) -> Self {
        self.edit(id, |t| {
            t.declared = None;
            t.body = body;
        })
    }

    /// Never answers the probe for `id`.
    pub(crate) fn with_hanging_probe(self, id: &str) -> Self {
        self.edit(id, |t| t.hang_probe = true)
    }

    /// Delays the body download for `id`.
    pub(crate) fn with_delay(self, id: &str, delay: Duration) -> Self {
        self.edit(id, |t| t.delay = delay)
    }

    pub(crate) fn probes(&self, id: &str) -> usize {
        self.state.lock().unwrap().probes.get(id).copied().unwrap_or(0)
    }

    pub(crate) fn fetches(&self, id: &str) -> usize {
        self.state.lock().unwrap().fetches.get(id).copied().unwrap_or(0)
    }

    pub(crate) fn total_fetches(&self) -> usize {
        self.state.lock().unwrap().fetches.values().sum()
    }
}

impl Origin for FakeOrigin {
    fn probe(&self, url: &str) -> impl Future<Output = Result<Option<u64>>> + Send {
        let state = Arc::clone(&self.state);
        let id = Self::id_of(url);
        async move {
            let found = {
                let mut state = state.lock().unwrap();
                *state.probes.entry(id.clone()).or_default() += 1;
                state.tracks.get(&id).map(|t| (t.hang_probe, t.declared))
            };
            match found {
                Some((true, _)) => std::future::pending().await,
                Some((false, declared)) => Ok(declared),
                None => Err(CacheError::network(format!("404 for {}", id))),
            }
        }
    }

    fn fetch(
        &self,
        url: &str,
        _limit: u64,
        on_progress: &mut (dyn FnMut(FetchProgress) + Send),
    ) -> impl Future<Output = Result<Vec<u8>>> + Send {
        let state = Arc::clone(&self.state);
        let id = Self::id_of(url);
        async move {
            let found = {
                let mut state = state.lock().unwrap();
                *state.fetches.entry(id.clone()).or_default() += 1;
                state
                    .tracks
                    .get(&id)
                    .map(|t| (t.body.clone(), t.declared, t.delay))
            };
            let Some((body, declared, delay)) = found else {
                return Err(CacheError::network(format!("404 for {}", id)));
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let half = body.len() as u64 / 2;
            on_progress(FetchProgress::new(half, declared));
            on_progress(FetchProgress::new(body.len() as u64, declared));
            Ok(body)
        }
    }
}
