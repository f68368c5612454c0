// src/pipeline/event_log.rs
//
// Append-only JSONL record of every counted crossing.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::counting::CrossingEvent;

pub struct EventLog {
    writer: BufWriter<File>,
}

impl EventLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open event log {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, event: &CrossingEvent) -> Result<()> {
        let json_line = serde_json::to_string(event)?;
        writeln!(self.writer, "{}", json_line)?;
        // Crossings are rare; flush so a crash never loses a counted event
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::{AggregateCounts, EventKind};

    #[test]
    fn test_appends_one_line_per_event() {
        let dir = std::env::temp_dir().join(format!("event-log-{}", uuid::Uuid::new_v4()));
        let path = dir.join("events.jsonl");

        let mut log = EventLog::open(&path).unwrap();
        for (i, kind) in [EventKind::Enter, EventKind::Exit].into_iter().enumerate() {
            log.append(&CrossingEvent {
                kind,
                track_id: 3,
                frame_id: i as u64,
                timestamp_ms: i as f64 * 33.0,
                previous_position: 210.0,
                position: 190.0,
                counts: AggregateCounts::new(1, i as u64),
            })
            .unwrap();
        }
        drop(log);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "ENTER");
        assert_eq!(first["counts"]["entered"], 1);

        std::fs::remove_dir_all(dir).ok();
    }
}
