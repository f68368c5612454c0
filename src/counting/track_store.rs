// src/counting/track_store.rs
//
// Per-track memory for the crossing classifier. Owned by the ingestion
// path only; nothing here is shared across threads.

use std::collections::HashMap;
use tracing::debug;

/// Flags the classifier reads and mutates for a single track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrossingFlags {
    /// Seen above (numerically less than) the exit line since the last exit.
    pub above_exit_threshold: bool,
    /// Set once on ENTER, never cleared.
    pub has_entered: bool,
    /// Set once on EXIT, never cleared.
    pub has_exited: bool,
}

#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub last_position: f32,
    pub flags: CrossingFlags,
    pub last_seen_ms: f64,
}

pub struct TrackStore {
    exit_line: f32,
    idle_timeout_ms: f64,
    tracks: HashMap<u64, TrackedObject>,
}

impl TrackStore {
    pub fn new(exit_line: f32, idle_timeout_ms: f64) -> Self {
        Self {
            exit_line,
            idle_timeout_ms,
            tracks: HashMap::new(),
        }
    }

    /// Record `position` for `id` and return the position it replaced, or
    /// `None` for a new track.
    ///
    /// `last_position` is overwritten unconditionally. The exit-threshold flag
    /// is armed whenever the position is above the exit line, including on the
    /// very first sample; it is never cleared here.
    pub fn observe(&mut self, id: u64, position: f32, now_ms: f64) -> Option<f32> {
        let exit_line = self.exit_line;
        let mut is_first = false;

        let track = self.tracks.entry(id).or_insert_with(|| {
            is_first = true;
            TrackedObject {
                last_position: position,
                flags: CrossingFlags::default(),
                last_seen_ms: now_ms,
            }
        });

        let previous = if is_first {
            None
        } else {
            Some(track.last_position)
        };

        track.last_position = position;
        track.last_seen_ms = now_ms;
        if position < exit_line {
            track.flags.above_exit_threshold = true;
        }

        previous
    }

    pub fn flags_mut(&mut self, id: u64) -> Option<&mut CrossingFlags> {
        self.tracks.get_mut(&id).map(|t| &mut t.flags)
    }

    #[cfg(test)]
    pub fn get(&self, id: u64) -> Option<&TrackedObject> {
        self.tracks.get(&id)
    }

    /// Drop every track not observed within the idle timeout. Returns how many
    /// were removed. A later observation of an evicted id starts a fresh track.
    pub fn evict_idle(&mut self, now_ms: f64) -> usize {
        let before = self.tracks.len();
        let timeout = self.idle_timeout_ms;
        self.tracks
            .retain(|_, track| now_ms - track.last_seen_ms <= timeout);
        let evicted = before - self.tracks.len();
        if evicted > 0 {
            debug!(
                "Evicted {} idle track(s), {} still live",
                evicted,
                self.tracks.len()
            );
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }
}
