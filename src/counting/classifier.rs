// src/counting/classifier.rs
//
// Crossing decision for one track between two consecutive samples.
//
// Screen y grows downward, so "moving up" means the position decreases.
//
//   ENTER: moving up, was strictly below enter_line, now at or above it.
//   EXIT:  moving down, has been seen above exit_line since the last exit,
//          was strictly above exit_line, now at or below it.
//
// Landing exactly on a line counts as reaching it, so a sparse frame rate
// cannot skip a crossing. Each direction can fire at most once per track:
// has_entered / has_exited latch permanently.

use super::track_store::CrossingFlags;
use super::types::{Boundaries, EventKind};

/// Decide whether the move `previous -> current` is a crossing, latching the
/// relevant flags when it is. Pure apart from `flags`.
pub fn classify(
    boundaries: &Boundaries,
    previous: f32,
    current: f32,
    flags: &mut CrossingFlags,
) -> Option<EventKind> {
    let moving_up = current < previous;
    let moving_down = current > previous;

    let mut fired = None;

    if moving_up
        && previous > boundaries.enter_line
        && current <= boundaries.enter_line
        && !flags.has_entered
    {
        flags.has_entered = true;
        fired = Some(EventKind::Enter);
    }

    if moving_down
        && flags.above_exit_threshold
        && previous < boundaries.exit_line
        && current >= boundaries.exit_line
        && !flags.has_exited
    {
        // Motion tests are exclusive, so ENTER cannot have fired on this sample
        debug_assert!(fired.is_none(), "ENTER and EXIT on the same sample");
        flags.has_exited = true;
        flags.above_exit_threshold = false;
        fired = Some(EventKind::Exit);
    }

    fired
}
