// src/feed.rs
//
// Timestamped count snapshots, keyed by device id.
//
// Every device has an append-only `logs` collection (one entry per upload,
// each under a unique key) and a `latest` entry that is overwritten on every
// upload. The relay writes here; the forecaster reads the logs back.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::counting::AggregateCounts;
use crate::types::FeedConfig;

/// One point of the feed. Missing fields read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub entered: u64,
    #[serde(default)]
    pub exited: u64,
}

impl Snapshot {
    pub fn occupancy(&self) -> i64 {
        self.entered as i64 - self.exited as i64
    }
}

/// What the relay uploads on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEnvelope {
    pub device_id: String,
    pub timestamp: i64,
    pub payload: AggregateCounts,
}

impl UploadEnvelope {
    pub fn new(device_id: &str, timestamp: i64, counts: AggregateCounts) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp,
            payload: counts,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            timestamp: self.timestamp,
            entered: self.payload.entered,
            exited: self.payload.exited,
        }
    }
}

/// Device ids become path components and URL segments.
fn check_device_id(device_id: &str) -> Result<()> {
    if device_id.is_empty()
        || device_id == "."
        || device_id == ".."
        || device_id.contains(['/', '\\'])
    {
        bail!("invalid device id {:?}", device_id);
    }
    Ok(())
}

// ============================================================================
// FEED
// ============================================================================

pub enum SnapshotFeed {
    Http {
        http_client: reqwest::Client,
        ingest_url: String,
        logs_url: Option<String>,
    },
    File(FileFeed),
}

impl SnapshotFeed {
    pub fn from_config(config: &FeedConfig, timeout: Duration) -> Result<Self> {
        match config {
            FeedConfig::Http {
                ingest_url,
                logs_url,
            } => {
                let http_client = reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .context("Failed to build HTTP client")?;
                Ok(Self::Http {
                    http_client,
                    ingest_url: ingest_url.clone(),
                    logs_url: logs_url.clone(),
                })
            }
            FeedConfig::File { dir } => Ok(Self::File(FileFeed::new(dir))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Http { ingest_url, .. } => ingest_url.clone(),
            Self::File(feed) => feed.dir.display().to_string(),
        }
    }

    pub async fn publish(&self, envelope: &UploadEnvelope) -> Result<()> {
        check_device_id(&envelope.device_id)?;
        match self {
            Self::Http {
                http_client,
                ingest_url,
                ..
            } => {
                let response = http_client
                    .post(ingest_url)
                    .json(envelope)
                    .send()
                    .await
                    .context("Snapshot upload failed")?;
                let status = response.status();
                if !status.is_success() {
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "<no body>".to_string());
                    bail!("Snapshot upload returned {}: {}", status, body);
                }
                Ok(())
            }
            Self::File(feed) => feed.append(envelope).await,
        }
    }

    /// All snapshots for `device_id`, oldest first.
    pub async fn fetch_logs(&self, device_id: &str) -> Result<Vec<Snapshot>> {
        check_device_id(device_id)?;
        match self {
            Self::Http {
                http_client,
                logs_url,
                ..
            } => {
                let Some(url) = logs_url else {
                    bail!("HTTP feed has no logs_url configured");
                };
                info!("Fetching snapshot logs from {}", url);
                let response = http_client
                    .get(url)
                    .send()
                    .await
                    .context("Failed to fetch logs")?;
                let status = response.status();
                if !status.is_success() {
                    bail!("Log fetch returned {}", status);
                }
                let value: serde_json::Value =
                    response.json().await.context("Log response is not JSON")?;
                Ok(parse_log_map(&value))
            }
            Self::File(feed) => feed.logs(device_id).await,
        }
    }
}

/// Parse a `{key: {timestamp, entered, exited}}` object into sorted snapshots.
/// `null` means no logs yet; entries that are not objects are skipped.
pub fn parse_log_map(value: &serde_json::Value) -> Vec<Snapshot> {
    let Some(map) = value.as_object() else {
        if !value.is_null() {
            warn!("Log payload is not an object, ignoring");
        }
        return Vec::new();
    };

    let mut logs: Vec<Snapshot> = map
        .iter()
        .filter_map(|(key, entry)| match Snapshot::deserialize(entry) {
            Ok(s) if entry.is_object() => Some(s),
            _ => {
                debug!("Skipping malformed log entry {}", key);
                None
            }
        })
        .collect();
    logs.sort_by_key(|s| s.timestamp);
    logs
}

// ============================================================================
// FILE BACKEND
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct LogRecord {
    key: String,
    #[serde(flatten)]
    snapshot: Snapshot,
}

pub struct FileFeed {
    dir: PathBuf,
}

impl FileFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn device_dir(&self, device_id: &str) -> PathBuf {
        self.dir.join(device_id)
    }

    pub async fn append(&self, envelope: &UploadEnvelope) -> Result<()> {
        check_device_id(&envelope.device_id)?;
        let dir = self.device_dir(&envelope.device_id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let record = LogRecord {
            key: uuid::Uuid::new_v4().to_string(),
            snapshot: envelope.snapshot(),
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("logs.jsonl"))
            .await
            .context("Failed to open logs.jsonl")?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        // Write-then-rename so readers never see a half-written latest.json
        let tmp = dir.join("latest.json.tmp");
        fs::write(&tmp, serde_json::to_vec(&record.snapshot)?).await?;
        fs::rename(&tmp, dir.join("latest.json")).await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn latest(&self, device_id: &str) -> Result<Option<Snapshot>> {
        check_device_id(device_id)?;
        let path = self.device_dir(device_id).join("latest.json");
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Oldest first. Unreadable lines are skipped with a warning.
    pub async fn logs(&self, device_id: &str) -> Result<Vec<Snapshot>> {
        check_device_id(device_id)?;
        let path = self.device_dir(device_id).join("logs.jsonl");
        if !fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut logs = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(line) {
                Ok(record) => logs.push(record.snapshot),
                Err(e) => warn!("{}:{}: skipping bad record: {}", path.display(), line_no + 1, e),
            }
        }
        logs.sort_by_key(|s| s.timestamp);
        Ok(logs)
    }
}
