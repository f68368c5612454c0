// src/relay/state.rs

use parking_lot::RwLock;
use std::sync::Arc;

use crate::counting::AggregateCounts;
use crate::delivery::CountUpdate;

/// Latest totals received from the counter, shared between the HTTP handlers
/// and the uploader.
#[derive(Clone, Default)]
pub struct RelayState {
    latest: Arc<RwLock<AggregateCounts>>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> AggregateCounts {
        *self.latest.read()
    }

    /// Overwrite whichever fields the update carries; missing fields keep
    /// their previous value.
    pub fn apply(&self, update: CountUpdate) -> AggregateCounts {
        let mut latest = self.latest.write();
        if let Some(entered) = update.people_entered {
            latest.entered = entered;
        }
        if let Some(exited) = update.people_exited {
            latest.exited = exited;
        }
        *latest
    }
}
