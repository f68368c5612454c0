// src/forecast/features.rs

use chrono::{Datelike, Local, TimeZone, Timelike};

use crate::feed::Snapshot;

pub const FEATURE_COUNT: usize = 6;

/// Index of the occupancy column, the one fed back during recursion.
pub const OCCUPANCY: usize = FEATURE_COUNT - 1;

pub type Features = [f64; FEATURE_COUNT];

/// One snapshot expanded into calendar and count features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp: i64,
    pub hour: u32,
    /// Five-minute slot within the hour, 0..=11.
    pub minute_slot: u32,
    /// Monday = 0.
    pub weekday: u32,
    pub entered: u64,
    pub exited: u64,
    pub occupancy: i64,
}

impl FeatureRow {
    pub fn features(&self) -> Features {
        [
            self.hour as f64,
            self.minute_slot as f64,
            self.weekday as f64,
            self.entered as f64,
            self.exited as f64,
            self.occupancy as f64,
        ]
    }
}

/// Build rows using the host's local time zone.
pub fn build_rows(logs: &[Snapshot]) -> Vec<FeatureRow> {
    build_rows_in(logs, &Local)
}

/// Build rows in `tz`. Snapshots whose timestamp cannot be placed in the zone
/// are skipped.
pub fn build_rows_in<Tz: TimeZone>(logs: &[Snapshot], tz: &Tz) -> Vec<FeatureRow> {
    logs.iter()
        .filter_map(|log| {
            let dt = tz.timestamp_opt(log.timestamp, 0).single()?;
            Some(FeatureRow {
                timestamp: log.timestamp,
                hour: dt.hour(),
                minute_slot: dt.minute() / 5,
                weekday: dt.weekday().num_days_from_monday(),
                entered: log.entered,
                exited: log.exited,
                occupancy: log.occupancy(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_calendar_features() {
        // 2024-01-03 is a Wednesday; 14:37:10 UTC
        let ts = Utc.with_ymd_and_hms(2024, 1, 3, 14, 37, 10).unwrap().timestamp();
        let rows = build_rows_in(
            &[Snapshot {
                timestamp: ts,
                entered: 10,
                exited: 13,
            }],
            &Utc,
        );

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.hour, 14);
        assert_eq!(row.minute_slot, 7);
        assert_eq!(row.weekday, 2);
        assert_eq!(row.occupancy, -3);
        assert_eq!(row.features(), [14.0, 7.0, 2.0, 10.0, 13.0, -3.0]);
    }
}
