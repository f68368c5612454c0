// src/counting/types.rs

use serde::{Deserialize, Serialize};

/// Horizontal reference lines in frame coordinates (y grows downward).
///
/// A person walking into the vehicle moves up the frame and crosses
/// `enter_line`; a person leaving moves down and crosses `exit_line`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boundaries {
    pub enter_line: f32,
    pub exit_line: f32,
    /// Read from configuration but not consulted by the crossing decision.
    /// Kept so that a future re-arming rule has a home; changing it has no effect.
    #[serde(default)]
    pub exit_reset_margin: f32,
}

impl Default for Boundaries {
    fn default() -> Self {
        Self {
            enter_line: 200.0,
            exit_line: 280.0,
            exit_reset_margin: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Enter,
    Exit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "ENTER",
            Self::Exit => "EXIT",
        }
    }
}

/// Cumulative crossing totals. Both fields only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounts {
    pub entered: u64,
    pub exited: u64,
}

impl AggregateCounts {
    pub fn new(entered: u64, exited: u64) -> Self {
        Self { entered, exited }
    }

    /// People currently on board. Can go negative when the camera missed entries.
    pub fn occupancy(&self) -> i64 {
        self.entered as i64 - self.exited as i64
    }
}

/// One usable (track id, vertical position) sample from a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub track_id: u64,
    pub position: f32,
}

impl Observation {
    pub fn new(track_id: u64, position: f32) -> Self {
        Self { track_id, position }
    }
}

/// A counted crossing, attributed to one track at one frame.
#[derive(Debug, Clone, Serialize)]
pub struct CrossingEvent {
    pub kind: EventKind,
    pub track_id: u64,
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub previous_position: f32,
    pub position: f32,
    pub counts: AggregateCounts,
}
