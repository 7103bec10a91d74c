//! Play queue.
//!
//! [`QueueSource`] is the only thing the cache needs from the queue: a way to
//! look at the upcoming track, optionally without moving the play position.
//! [`PlayQueue`] is the in-process implementation used by the playback driver.

use std::sync::{Mutex, MutexGuard};

use crate::types::Track;

/// Access to the upcoming track.
pub trait QueueSource: Send + Sync {
    /// Returns the track after the current one.
    ///
    /// With `consume = false` the play position is left untouched, which is
    /// what prefetching relies on. With `consume = true` the position moves
    /// to the returned track.
    fn peek_next(&self, consume: bool) -> Option<Track>;
}

#[derive(Debug, Default)]
struct QueueState {
    tracks: Vec<Track>,
    current: Option<usize>,
    looping: bool,
    shuffling: bool,
    /// Shuffle pick made by a non-consuming peek, honoured by the next consume.
    reserved: Option<usize>,
}

impl QueueState {
    fn next_index(&mut self) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        if self.shuffling {
            if let Some(index) = self.reserved.filter(|i| *i < len) {
                return Some(index);
            }
            let index = match (self.current, len) {
                (_, 1) => 0,
                (Some(current), _) => {
                    // Never repeat the current track when there is a choice.
                    let offset = rand::random::<usize>() % (len - 1);
                    (current + 1 + offset) % len
                }
                (None, _) => rand::random::<usize>() % len,
            };
            self.reserved = Some(index);
            return Some(index);
        }

        match self.current {
            None => Some(0),
            Some(current) if current + 1 < len => Some(current + 1),
            Some(_) if self.looping => Some(0),
            Some(_) => None,
        }
    }
}

/// Ordered list of tracks with a play position.
#[derive(Debug, Default)]
pub struct PlayQueue {
    state: Mutex<QueueState>,
}

impl PlayQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends tracks not already queued, preserving their order.
    ///
    /// If nothing was selected yet, the first track becomes current.
    /// Returns the number of tracks added.
    pub fn add(&self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let mut state = self.lock();
        let before = state.tracks.len();
        for track in tracks {
            if !state.tracks.contains(&track) {
                state.tracks.push(track);
            }
        }
        if state.current.is_none() && !state.tracks.is_empty() {
            state.current = Some(0);
        }
        state.reserved = None;
        state.tracks.len() - before
    }

    /// Removes the track at `index`. Returns it if the index was valid.
    pub fn remove(&self, index: usize) -> Option<Track> {
        let mut state = self.lock();
        if index >= state.tracks.len() {
            return None;
        }
        let removed = state.tracks.remove(index);
        state.reserved = None;
        state.current = match state.current {
            _ if state.tracks.is_empty() => None,
            Some(current) if index < current => Some(current - 1),
            Some(current) if current >= state.tracks.len() => Some(state.tracks.len() - 1),
            other => other,
        };
        Some(removed)
    }

    /// Empties the queue and resets the play position.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.tracks.clear();
        state.current = None;
        state.reserved = None;
    }

    /// Makes the track at `index` current and returns it.
    pub fn select(&self, index: usize) -> Option<Track> {
        let mut state = self.lock();
        let track = state.tracks.get(index).cloned()?;
        state.current = Some(index);
        state.reserved = None;
        Some(track)
    }

    /// Moves to the following track and returns it.
    pub fn next(&self) -> Option<Track> {
        self.peek_next(true)
    }

    /// Moves to the previous track and returns it.
    ///
    /// At the start of the queue this wraps when looping and stays on the
    /// first track otherwise.
    pub fn previous(&self) -> Option<Track> {
        let mut state = self.lock();
        let len = state.tracks.len();
        if len == 0 {
            return None;
        }
        let index = match state.current {
            Some(current) if current > 0 => current - 1,
            _ if state.looping => len - 1,
            _ => 0,
        };
        state.current = Some(index);
        state.reserved = None;
        state.tracks.get(index).cloned()
    }

    /// Returns the current track.
    pub fn current(&self) -> Option<Track> {
        let state = self.lock();
        state.current.and_then(|i| state.tracks.get(i).cloned())
    }

    /// Returns the current position.
    pub fn current_index(&self) -> Option<usize> {
        self.lock().current
    }

    /// Returns a copy of the queued tracks.
    pub fn tracks(&self) -> Vec<Track> {
        self.lock().tracks.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tracks.is_empty()
    }

    pub fn set_looping(&self, looping: bool) {
        self.lock().looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.lock().looping
    }

    pub fn set_shuffling(&self, shuffling: bool) {
        let mut state = self.lock();
        state.shuffling = shuffling;
        state.reserved = None;
    }

    pub fn is_shuffling(&self) -> bool {
        self.lock().shuffling
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl QueueSource for PlayQueue {
    fn peek_next(&self, consume: bool) -> Option<Track> {
        let mut state = self.lock();
        let index = state.next_index()?;
        if consume {
            state.current = Some(index);
            state.reserved = None;
        }
        state.tracks.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track::new(id, format!("Title {}", id), "Artist", format!("http://origin/{}", id))
    }

    fn queue_of(ids: &[&str]) -> PlayQueue {
        let queue = PlayQueue::new();
        queue.add(ids.iter().map(|id| track(id)));
        queue
    }

    #[test]
    fn add_dedupes_and_selects_first() {
        let queue = PlayQueue::new();
        assert_eq!(queue.add(vec![track("a"), track("b")]), 2);
        assert_eq!(queue.add(vec![track("b"), track("c")]), 1);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.current().unwrap().track_id, "a");
    }

    #[test]
    fn peek_without_consume_keeps_position() {
        let queue = queue_of(&["a", "b", "c"]);

        assert_eq!(queue.peek_next(false).unwrap().track_id, "b");
        assert_eq!(queue.peek_next(false).unwrap().track_id, "b");
        assert_eq!(queue.current_index(), Some(0));

        assert_eq!(queue.peek_next(true).unwrap().track_id, "b");
        assert_eq!(queue.current_index(), Some(1));
    }

    #[test]
    fn end_of_queue_stops_unless_looping() {
        let queue = queue_of(&["a", "b"]);
        queue.next();
        assert!(queue.peek_next(false).is_none());
        assert!(queue.next().is_none());
        assert_eq!(queue.current().unwrap().track_id, "b");

        queue.set_looping(true);
        assert_eq!(queue.next().unwrap().track_id, "a");
    }

    #[test]
    fn previous_clamps_or_wraps() {
        let queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.previous().unwrap().track_id, "a");

        queue.set_looping(true);
        assert_eq!(queue.previous().unwrap().track_id, "c");
        assert_eq!(queue.previous().unwrap().track_id, "b");
    }

    #[test]
    fn shuffled_peek_is_honoured_by_consume() {
        let queue = queue_of(&["a", "b", "c", "d", "e"]);
        queue.set_shuffling(true);

        for _ in 0..20 {
            let peeked = queue.peek_next(false).unwrap();
            let current = queue.current().unwrap();
            assert_ne!(peeked, current);
            assert_eq!(queue.peek_next(false).unwrap(), peeked);
            assert_eq!(queue.next().unwrap(), peeked);
        }
    }

    #[test]
    fn remove_adjusts_position() {
        let queue = queue_of(&["a", "b", "c"]);
        queue.select(2);

        assert_eq!(queue.remove(0).unwrap().track_id, "a");
        assert_eq!(queue.current().unwrap().track_id, "c");

        assert_eq!(queue.remove(1).unwrap().track_id, "c");
        assert_eq!(queue.current().unwrap().track_id, "b");

        assert!(queue.remove(5).is_none());
        queue.remove(0);
        assert!(queue.current().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_resets() {
        let queue = queue_of(&["a", "b"]);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.peek_next(false).is_none());
        assert!(queue.current().is_none());
    }
}
