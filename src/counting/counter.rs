// src/counting/counter.rs

use super::types::{AggregateCounts, EventKind};

/// Running ENTER / EXIT totals. Owned by the ingestion loop; other parts of
/// the system only ever see `AggregateCounts` copies.
#[derive(Debug, Default)]
pub struct EventCounter {
    counts: AggregateCounts,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, kind: EventKind) -> AggregateCounts {
        match kind {
            EventKind::Enter => self.counts.entered = self.counts.entered.saturating_add(1),
            EventKind::Exit => self.counts.exited = self.counts.exited.saturating_add(1),
        }
        self.counts
    }

    pub fn snapshot(&self) -> AggregateCounts {
        self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_returns_new_snapshot() {
        let mut counter = EventCounter::new();
        assert_eq!(counter.apply(EventKind::Enter), AggregateCounts::new(1, 0));
        assert_eq!(counter.apply(EventKind::Enter), AggregateCounts::new(2, 0));
        assert_eq!(counter.apply(EventKind::Exit), AggregateCounts::new(2, 1));
        assert_eq!(counter.snapshot().occupancy(), 1);
    }
}
