use serde::{Deserialize, Serialize};

use crate::counting::Boundaries;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifies this vehicle in the snapshot feed.
    pub device_id: String,
    pub boundaries: Boundaries,
    pub tracking: TrackingConfig,
    pub delivery: DeliveryConfig,
    pub relay: RelayConfig,
    pub forecast: ForecastConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: "bus001".to_string(),
            boundaries: Boundaries::default(),
            tracking: TrackingConfig::default(),
            delivery: DeliveryConfig::default(),
            relay: RelayConfig::default(),
            forecast: ForecastConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Detections of any other class are ignored.
    pub target_class: String,
    /// Tracks unseen for longer than this are forgotten.
    pub idle_timeout_secs: f64,
    /// How often (in frames) to sweep for idle tracks.
    pub sweep_interval_frames: u64,
    /// Used to synthesise timestamps for frames that carry none.
    pub nominal_fps: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            target_class: "person".to_string(),
            idle_timeout_secs: 30.0,
            sweep_interval_frames: 30,
            nominal_fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Relay endpoint for count pushes. `None` disables pushing.
    pub push_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            push_url: Some("http://127.0.0.1:5000/update".to_string()),
            timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub upload_interval_secs: u64,
    pub upload_timeout_secs: u64,
    pub feed: FeedConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            upload_interval_secs: 30,
            upload_timeout_secs: 10,
            feed: FeedConfig::default(),
        }
    }
}

/// Where timestamped snapshots are published to and read back from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedConfig {
    /// Remote ingest function plus an optional URL returning the log map.
    Http {
        ingest_url: String,
        #[serde(default)]
        logs_url: Option<String>,
    },
    /// Local directory, one sub-directory per device.
    File { dir: String },
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::File {
            dir: "data/feed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub feed: FeedConfig,
    pub output: PredictionOutput,
    pub neighbors: usize,
    pub min_rows: usize,
    pub horizon_steps: usize,
    pub step_minutes: u32,
    pub clamp_min: f64,
    pub clamp_max: f64,
    pub request_timeout_secs: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            output: PredictionOutput::default(),
            neighbors: 5,
            min_rows: 5,
            horizon_steps: 24,
            step_minutes: 5,
            clamp_min: 0.0,
            clamp_max: 100.0,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionOutput {
    /// PUT the prediction document to this URL.
    Http { url: String },
    File { path: String },
}

impl Default for PredictionOutput {
    fn default() -> Self {
        Self::File {
            path: "data/predictions.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
