// src/counting/ingestion.rs
//
// Drives the track store, classifier and counter for every usable detection
// in a frame, and notifies the delivery sink whenever the totals change.
//
// Frames must be fed in arrival order. Within one frame detections are
// applied in the order the tracker listed them.

use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use super::classifier::classify;
use super::counter::EventCounter;
use super::track_store::TrackStore;
use super::types::{AggregateCounts, Boundaries, CrossingEvent, EventKind, Observation};
use crate::delivery::CountSink;
use crate::pipeline::PipelineMetrics;
use crate::types::TrackingConfig;

// ============================================================================
// UPSTREAM RECORDS
// ============================================================================

/// One frame as emitted by the upstream detector/tracker.
///
/// Detections are decoded one by one: an entry that does not fit
/// `DetectionRecord` (negative id, `null` class, partial box) becomes `None`
/// and is dropped on its own, leaving the rest of the frame intact.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameRecord {
    #[serde(default)]
    pub frame_id: Option<u64>,
    #[serde(default)]
    pub timestamp_ms: Option<f64>,
    #[serde(default, deserialize_with = "detections_lenient")]
    pub detections: Vec<Option<DetectionRecord>>,
}

impl FrameRecord {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

fn detections_lenient<'de, D>(deserializer: D) -> Result<Vec<Option<DetectionRecord>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .iter()
        .map(|value| match DetectionRecord::deserialize(value) {
            Ok(detection) => Some(detection),
            Err(e) => {
                debug!("Dropping unreadable detection {}: {}", value, e);
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectionRecord {
    /// Absent when the tracker was not confident enough to assign one.
    #[serde(default)]
    pub track_id: Option<u64>,
    #[serde(default, alias = "class")]
    pub class_name: String,
    /// [x1, y1, x2, y2] pixels
    #[serde(default)]
    pub bbox: Option<[f32; 4]>,
    /// Explicit vertical position, used when no bbox is given.
    #[serde(default)]
    pub y: Option<f32>,
}

impl DetectionRecord {
    /// Vertical centre of the box, or the explicit `y`.
    pub fn vertical_position(&self) -> Option<f32> {
        let y = match (self.bbox, self.y) {
            (Some(b), _) => (b[1] + b[3]) * 0.5,
            (None, Some(y)) => y,
            (None, None) => return None,
        };
        y.is_finite().then_some(y)
    }

    /// Usable observation for the target class, or `None` if the record has
    /// to be dropped.
    pub fn to_observation(&self, target_class: &str) -> Option<Observation> {
        if self.class_name != target_class {
            return None;
        }
        let track_id = self.track_id?;
        let position = self.vertical_position()?;
        Some(Observation::new(track_id, position))
    }
}

// ============================================================================
// INGESTOR
// ============================================================================

pub struct FrameIngestor<S: CountSink> {
    boundaries: Boundaries,
    target_class: String,
    frame_interval_ms: f64,
    sweep_interval_frames: u64,
    store: TrackStore,
    counter: EventCounter,
    sink: S,
    metrics: PipelineMetrics,
    frames_seen: u64,
    next_frame_id: u64,
}

impl<S: CountSink> FrameIngestor<S> {
    pub fn new(
        boundaries: Boundaries,
        tracking: &TrackingConfig,
        sink: S,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            boundaries,
            target_class: tracking.target_class.clone(),
            frame_interval_ms: 1000.0 / tracking.nominal_fps.max(1.0),
            sweep_interval_frames: tracking.sweep_interval_frames.max(1),
            store: TrackStore::new(boundaries.exit_line, tracking.idle_timeout_secs * 1000.0),
            counter: EventCounter::new(),
            sink,
            metrics,
            frames_seen: 0,
            next_frame_id: 0,
        }
    }

    /// Process every detection of one frame and return the crossings it produced.
    pub fn process_frame(&mut self, frame: &FrameRecord) -> Vec<CrossingEvent> {
        let frame_id = frame.frame_id.unwrap_or(self.next_frame_id);
        self.next_frame_id = frame_id.saturating_add(1);
        let timestamp_ms = frame
            .timestamp_ms
            .unwrap_or(frame_id as f64 * self.frame_interval_ms);

        self.metrics.inc(&self.metrics.total_frames);

        let mut events = Vec::new();
        for detection in &frame.detections {
            let observation = detection
                .as_ref()
                .and_then(|d| d.to_observation(&self.target_class));
            match observation {
                Some(obs) => {
                    self.metrics.inc(&self.metrics.observations);
                    if let Some(event) = self.process_observation(obs, frame_id, timestamp_ms) {
                        events.push(event);
                    }
                }
                None => self.metrics.inc(&self.metrics.dropped_detections),
            }
        }

        self.frames_seen += 1;
        if self.frames_seen % self.sweep_interval_frames == 0 {
            let evicted = self.store.evict_idle(timestamp_ms);
            self.metrics.add(&self.metrics.tracks_evicted, evicted as u64);
        }

        events
    }

    pub fn process_observation(
        &mut self,
        obs: Observation,
        frame_id: u64,
        timestamp_ms: f64,
    ) -> Option<CrossingEvent> {
        let previous = self.store.observe(obs.track_id, obs.position, timestamp_ms)?;

        let flags = self.store.flags_mut(obs.track_id)?;
        let kind = classify(&self.boundaries, previous, obs.position, flags)?;

        let counts = self.counter.apply(kind);
        self.sink.offer(counts);

        match kind {
            EventKind::Enter => self.metrics.inc(&self.metrics.enter_events),
            EventKind::Exit => self.metrics.inc(&self.metrics.exit_events),
        }

        info!(
            "[{}] track {} {:.0} -> {:.0} | entered={} exited={} occupancy={}",
            kind.as_str(),
            obs.track_id,
            previous,
            obs.position,
            counts.entered,
            counts.exited,
            counts.occupancy()
        );

        Some(CrossingEvent {
            kind,
            track_id: obs.track_id,
            frame_id,
            timestamp_ms,
            previous_position: previous,
            position: obs.position,
            counts,
        })
    }

    pub fn counts(&self) -> AggregateCounts {
        self.counter.snapshot()
    }

    #[cfg(test)]
    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    /// Tear down the ingestor and hand back the sink so it can be flushed.
    pub fn into_sink(self) -> S {
        debug!(
            "Ingestor finished after {} frames with {} live tracks",
            self.frames_seen,
            self.store.len()
        );
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::RecordingSink;

    fn ingestor() -> FrameIngestor<RecordingSink> {
        let tracking = TrackingConfig {
            idle_timeout_secs: 2.0,
            sweep_interval_frames: 1,
            ..Default::default()
        };
        FrameIngestor::new(
            Boundaries::default(),
            &tracking,
            RecordingSink::default(),
            PipelineMetrics::new(),
        )
    }

    fn person(id: u64, y: f32) -> DetectionRecord {
        DetectionRecord {
            track_id: Some(id),
            class_name: "person".to_string(),
            bbox: None,
            y: Some(y),
        }
    }

    fn frame(id: u64, detections: Vec<DetectionRecord>) -> FrameRecord {
        FrameRecord {
            frame_id: Some(id),
            timestamp_ms: Some(id as f64 * 33.0),
            detections: detections.into_iter().map(Some).collect(),
        }
    }

    /// Feed one position per frame for a single track.
    fn feed(ing: &mut FrameIngestor<RecordingSink>, start: u64, id: u64, ys: &[f32]) -> Vec<EventKind> {
        ys.iter()
            .enumerate()
            .flat_map(|(i, y)| ing.process_frame(&frame(start + i as u64, vec![person(id, *y)])))
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn test_enter_then_exit_scenario() {
        let mut ing = ingestor();

        assert_eq!(feed(&mut ing, 0, 1, &[300.0, 195.0]), vec![EventKind::Enter]);
        assert_eq!(feed(&mut ing, 2, 1, &[250.0, 285.0]), vec![EventKind::Exit]);

        assert_eq!(ing.counts(), AggregateCounts::new(1, 1));
        assert_eq!(
            ing.into_sink().offered(),
            vec![AggregateCounts::new(1, 0), AggregateCounts::new(1, 1)]
        );
    }

    #[test]
    fn test_first_seen_below_exit_line_never_counts() {
        let mut ing = ingestor();
        assert!(feed(&mut ing, 0, 2, &[290.0, 285.0, 300.0]).is_empty());
        assert_eq!(ing.counts(), AggregateCounts::default());
        assert!(ing.into_sink().offered().is_empty());
    }

    #[test]
    fn test_monotonic_walk_counts_once_each_way() {
        let mut ing = ingestor();
        let up: Vec<f32> = (0..30).map(|i| 320.0 - i as f32 * 5.0).collect();
        let down: Vec<f32> = (0..40).map(|i| 175.0 + i as f32 * 5.0).collect();

        let mut kinds = feed(&mut ing, 0, 5, &up);
        kinds.extend(feed(&mut ing, 30, 5, &down));

        assert_eq!(kinds, vec![EventKind::Enter, EventKind::Exit]);
    }

    #[test]
    fn test_repeated_position_is_idempotent() {
        let mut ing = ingestor();
        assert_eq!(feed(&mut ing, 0, 1, &[210.0, 200.0]), vec![EventKind::Enter]);
        assert!(feed(&mut ing, 2, 1, &[200.0, 200.0, 200.0]).is_empty());
        assert_eq!(ing.counts(), AggregateCounts::new(1, 0));
    }

    #[test]
    fn test_flicker_around_enter_line_counts_once() {
        let mut ing = ingestor();
        let jitter = [201.0, 199.0, 201.0, 199.0, 201.0, 199.0];
        assert_eq!(feed(&mut ing, 0, 9, &jitter), vec![EventKind::Enter]);
    }

    #[test]
    fn test_jitter_that_never_crosses_is_silent() {
        let mut ing = ingestor();
        // Oscillates but always stays at or above the line in screen space
        let jitter = [200.0, 199.0, 200.0, 199.0, 200.0];
        assert!(feed(&mut ing, 0, 4, &jitter).is_empty());
    }

    #[test]
    fn test_drops_unusable_detections() {
        let mut ing = ingestor();
        let mut no_id = person(1, 300.0);
        no_id.track_id = None;
        let mut not_person = person(2, 300.0);
        not_person.class_name = "car".to_string();
        let mut no_pos = person(3, 0.0);
        no_pos.y = None;

        ing.process_frame(&frame(0, vec![no_id, not_person, no_pos]));
        assert_eq!(ing.store().len(), 0);

        let summary = ing.metrics.summary();
        assert_eq!(summary.dropped_detections, 3);
        assert_eq!(summary.observations, 0);
    }

    #[test]
    fn test_bbox_centre_is_position() {
        let det = DetectionRecord {
            track_id: Some(1),
            class_name: "person".to_string(),
            bbox: Some([10.0, 180.0, 50.0, 220.0]),
            y: Some(999.0),
        };
        assert_eq!(det.vertical_position(), Some(200.0));
    }

    #[test]
    fn test_multiple_tracks_in_one_frame() {
        let mut ing = ingestor();
        ing.process_frame(&frame(0, vec![person(1, 300.0), person(2, 250.0)]));
        let events = ing.process_frame(&frame(1, vec![person(1, 190.0), person(2, 290.0)]));

        let kinds: Vec<_> = events.iter().map(|e| (e.track_id, e.kind)).collect();
        assert_eq!(kinds, vec![(1, EventKind::Enter), (2, EventKind::Exit)]);
        assert_eq!(ing.counts(), AggregateCounts::new(1, 1));
    }

    #[test]
    fn test_idle_track_is_evicted_and_reused_id_counts_again() {
        let mut ing = ingestor();
        assert_eq!(feed(&mut ing, 0, 1, &[300.0, 195.0]), vec![EventKind::Enter]);

        // Another track keeps frames flowing well past the 2s timeout
        ing.process_frame(&frame(200, vec![person(8, 500.0)]));
        assert!(ing.store().get(1).is_none());

        assert_eq!(feed(&mut ing, 201, 1, &[300.0, 195.0]), vec![EventKind::Enter]);
        assert_eq!(ing.counts(), AggregateCounts::new(2, 0));
    }

    #[test]
    fn test_unreadable_detection_is_dropped_alone() {
        let mut ing = ingestor();
        let first = FrameRecord::parse(
            r#"{"frame_id":0,"detections":[{"track_id":1,"class_name":"person","y":300}]}"#,
        )
        .unwrap();
        let second = FrameRecord::parse(
            r#"{"frame_id":1,"detections":[
                {"track_id":-1,"class_name":"person","y":250},
                {"track_id":1,"class_name":"person","y":195},
                {"track_id":3,"class_name":null,"y":250},
                {"track_id":4,"class_name":"person","bbox":[1,2,null,4]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(second.detections.iter().filter(|d| d.is_none()).count(), 3);

        ing.process_frame(&first);
        let events = ing.process_frame(&second);
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].track_id, events[0].kind), (1, EventKind::Enter));

        let summary = ing.metrics.summary();
        assert_eq!(summary.observations, 2);
        assert_eq!(summary.dropped_detections, 3);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::delivery::RecordingSink;
    use proptest::prelude::*;

    const ENTER_LINE: f32 = 200.0;
    const EXIT_LINE: f32 = 280.0;

    fn run(track: &[f32]) -> (Vec<EventKind>, AggregateCounts) {
        let mut ing = FrameIngestor::new(
            Boundaries {
                enter_line: ENTER_LINE,
                exit_line: EXIT_LINE,
                ..Default::default()
            },
            &TrackingConfig::default(),
            RecordingSink::default(),
            PipelineMetrics::new(),
        );
        let kinds: Vec<EventKind> = track
            .iter()
            .enumerate()
            .flat_map(|(i, y)| {
                ing.process_frame(&FrameRecord {
                    frame_id: Some(i as u64),
                    timestamp_ms: None,
                    detections: vec![Some(DetectionRecord {
                        track_id: Some(1),
                        class_name: "person".to_string(),
                        bbox: None,
                        y: Some(*y),
                    })],
                })
            })
            .map(|e| e.kind)
            .collect();
        (kinds, ing.counts())
    }

    /// `n` evenly spaced points from `from` to `to`, both included.
    fn ramp(from: f32, to: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| from + (to - from) * i as f32 / (n - 1) as f32)
            .collect()
    }

    proptest! {
        #[test]
        fn prop_down_then_up_counts_once_each_way(
            start in 201.0f32..400.0,
            low in 50.0f32..199.0,
            high in 281.0f32..450.0,
            up_steps in 2usize..40,
            down_steps in 2usize..40
        ) {
            let mut track = ramp(start, low, up_steps);
            track.extend(ramp(low, high, down_steps));

            let (kinds, counts) = run(&track);
            prop_assert_eq!(kinds, vec![EventKind::Enter, EventKind::Exit]);
            prop_assert_eq!(counts, AggregateCounts::new(1, 1));
        }

        #[test]
        fn prop_at_most_once_per_direction(
            tail in prop::collection::vec(0.0f32..500.0, 0..80)
        ) {
            let mut track = vec![300.0, 195.0];
            track.extend(tail);

            let (kinds, _) = run(&track);
            prop_assert_eq!(kinds.first(), Some(&EventKind::Enter));
            prop_assert_eq!(kinds.iter().filter(|k| **k == EventKind::Enter).count(), 1);
            prop_assert!(kinds.iter().filter(|k| **k == EventKind::Exit).count() <= 1);
        }

        #[test]
        fn prop_jitter_that_never_crosses_is_silent(
            above in any::<bool>(),
            moves in prop::collection::vec(-1i32..=1, 1..80)
        ) {
            // Offsets stay in [-1, 0] (at or past the line) or [1, 2] (short of it)
            let (lo, hi) = if above { (1, 2) } else { (-1, 0) };
            let mut offset = if above { 1 } else { 0 };
            let track: Vec<f32> = moves
                .iter()
                .map(|m| {
                    offset = (offset + m).clamp(lo, hi);
                    ENTER_LINE + offset as f32
                })
                .collect();

            let (kinds, counts) = run(&track);
            prop_assert!(kinds.is_empty());
            prop_assert_eq!(counts, AggregateCounts::default());
        }

        #[test]
        fn prop_first_seen_below_exit_line_never_exits(
            first in 280.5f32..500.0,
            rest in prop::collection::vec(EXIT_LINE..600.0f32, 0..80)
        ) {
            let mut track = vec![first];
            track.extend(rest);

            let (kinds, _) = run(&track);
            prop_assert!(kinds.is_empty());
        }
    }
}
