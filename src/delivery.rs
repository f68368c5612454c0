// src/delivery.rs
//
// Hands updated totals from the ingestion loop to the relay without ever
// blocking it.
//
// The ingestion side only calls `CountSink::offer`, which overwrites a
// single-slot watch channel. A worker task drains that slot and POSTs the
// newest totals. If totals change faster than the network can keep up,
// intermediate values are skipped: each push carries cumulative counts, so
// the latest one supersedes everything before it. Failed pushes are logged
// and dropped, never retried; the next change repairs the relay's view.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::counting::AggregateCounts;
use crate::pipeline::PipelineMetrics;
use crate::types::DeliveryConfig;

/// Receives the new totals after every counted crossing. Must not block.
pub trait CountSink {
    fn offer(&self, counts: AggregateCounts);
}

/// Used when no push endpoint is configured.
pub struct NullSink;

impl CountSink for NullSink {
    fn offer(&self, _counts: AggregateCounts) {}
}

/// Body of a count push, field names as the relay expects them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people_entered: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people_exited: Option<u64>,
}

impl From<AggregateCounts> for CountUpdate {
    fn from(counts: AggregateCounts) -> Self {
        Self {
            people_entered: Some(counts.entered),
            people_exited: Some(counts.exited),
        }
    }
}

// ============================================================================
// PUSH CLIENT
// ============================================================================

pub struct PushClient {
    tx: watch::Sender<Option<AggregateCounts>>,
    worker: JoinHandle<()>,
}

impl PushClient {
    /// Build the HTTP client and start the background push worker.
    /// Must be called from within a tokio runtime.
    pub fn spawn(url: String, config: &DeliveryConfig, metrics: PipelineMetrics) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            // The relay sits on the vehicle's local network
            .no_proxy()
            .build()
            .context("Failed to build HTTP client")?;

        let (tx, rx) = watch::channel(None);

        info!(
            "📡 Pushing counts to {} (timeout {}ms)",
            url, config.timeout_ms
        );
        let worker = tokio::spawn(run_worker(rx, http_client, url, metrics));

        Ok(Self { tx, worker })
    }

    /// Stop accepting counts, push whatever is still pending, and wait for the
    /// worker to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!("Push worker ended abnormally: {}", e);
        }
    }
}

impl CountSink for PushClient {
    fn offer(&self, counts: AggregateCounts) {
        self.tx.send_replace(Some(counts));
    }
}

async fn run_worker(
    mut rx: watch::Receiver<Option<AggregateCounts>>,
    http_client: reqwest::Client,
    url: String,
    metrics: PipelineMetrics,
) {
    // A value sent just before the sender was dropped is still delivered
    while rx.changed().await.is_ok() {
        let latest = *rx.borrow_and_update();
        let Some(counts) = latest else {
            continue;
        };

        if push_once(&http_client, &url, counts).await {
            metrics.inc(&metrics.push_successes);
        } else {
            metrics.inc(&metrics.push_failures);
        }
    }
    debug!("Push worker stopped");
}

async fn push_once(http_client: &reqwest::Client, url: &str, counts: AggregateCounts) -> bool {
    let body = CountUpdate::from(counts);
    match http_client.post(url).json(&body).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(
                "Pushed entered={} exited={} | status {}",
                counts.entered,
                counts.exited,
                response.status()
            );
            true
        }
        Ok(response) => {
            warn!(
                "Count push rejected with {} (entered={} exited={})",
                response.status(),
                counts.entered,
                counts.exited
            );
            false
        }
        Err(e) => {
            warn!("Count push failed: {}", e);
            false
        }
    }
}

// ============================================================================
// TEST SINK
// ============================================================================

/// Keeps every offered snapshot, for tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    offered: parking_lot::Mutex<Vec<AggregateCounts>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn offered(&self) -> Vec<AggregateCounts> {
        self.offered.lock().clone()
    }
}

#[cfg(test)]
impl CountSink for RecordingSink {
    fn offer(&self, counts: AggregateCounts) {
        self.offered.lock().push(counts);
    }
}
