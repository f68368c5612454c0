// src/relay/uploader.rs
//
// Re-publishes the latest totals to the snapshot feed on a fixed cadence,
// independent of how often the counter pushes.

use anyhow::Result;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::state::RelayState;
use crate::feed::{SnapshotFeed, UploadEnvelope};

pub struct Uploader {
    state: RelayState,
    feed: SnapshotFeed,
    device_id: String,
    period: Duration,
}

impl Uploader {
    pub fn new(state: RelayState, feed: SnapshotFeed, device_id: String, period: Duration) -> Self {
        Self {
            state,
            feed,
            device_id,
            period,
        }
    }

    /// Publish the current totals once, stamped with `timestamp` (unix seconds).
    pub async fn upload_once(&self, timestamp: i64) -> Result<UploadEnvelope> {
        let envelope = UploadEnvelope::new(&self.device_id, timestamp, self.state.latest());
        self.feed.publish(&envelope).await?;
        Ok(envelope)
    }

    /// Upload forever. Failures are logged and the next tick tries again.
    pub async fn run(self) {
        info!(
            "[UPLOAD] Publishing {} every {}s to {}",
            self.device_id,
            self.period.as_secs(),
            self.feed.describe()
        );
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.upload_once(chrono::Utc::now().timestamp()).await {
                Ok(env) => info!(
                    "[UPLOAD] Sent entered={} exited={}",
                    env.payload.entered, env.payload.exited
                ),
                Err(e) => warn!("[UPLOAD] Failed: {:#}", e),
            }
        }
    }
}
