// src/forecast/mod.rs
//
// Batch occupancy forecast over the snapshot feed.
//
//   1. Read every snapshot for the device, oldest first.
//   2. Expand each into (hour, 5-min slot, weekday, entered, exited, occupancy).
//   3. Train on consecutive pairs: features of row i -> occupancy of row i+1.
//   4. Starting from the newest row, predict one step, clamp, write it back
//      into the occupancy feature, and repeat for the whole horizon.
//
// Only the occupancy column moves during recursion; the calendar and count
// features stay those of the newest row.

pub mod features;
pub mod knn;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::feed::SnapshotFeed;
use crate::types::{Config, ForecastConfig, PredictionOutput};
use features::{build_rows, FeatureRow, OCCUPANCY};
use knn::KnnRegressor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPrediction {
    pub minutes_ahead: u32,
    pub occupancy: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub steps: Vec<StepPrediction>,
    pub updated_at: i64,
}

impl Forecast {
    /// `{"next_5min": n, ..., "updatedAt": ts}`
    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        for step in &self.steps {
            doc.insert(
                format!("next_{}min", step.minutes_ahead),
                Value::from(step.occupancy),
            );
        }
        doc.insert("updatedAt".to_string(), Value::from(self.updated_at));
        Value::Object(doc)
    }
}

pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// `None` when there are fewer than `min_rows` rows to learn from.
    pub fn forecast(&self, rows: &[FeatureRow], now: i64) -> Option<Forecast> {
        if rows.len() < self.config.min_rows.max(2) {
            warn!(
                "Not enough data yet for KNN ({} rows, need {})",
                rows.len(),
                self.config.min_rows
            );
            return None;
        }

        let samples = rows
            .windows(2)
            .map(|pair| (pair[0].features(), pair[1].occupancy as f64))
            .collect();
        let mut model = KnnRegressor::new(self.config.neighbors);
        model.fit(samples);

        let mut features = rows.last()?.features();
        let mut steps = Vec::with_capacity(self.config.horizon_steps);

        for i in 1..=self.config.horizon_steps {
            let predicted = model
                .predict(&features)?
                .clamp(self.config.clamp_min, self.config.clamp_max);
            steps.push(StepPrediction {
                minutes_ahead: i as u32 * self.config.step_minutes,
                occupancy: predicted as i64,
            });
            features[OCCUPANCY] = predicted;
        }

        info!(
            "Forecast from {} rows ({} training pairs): next {} min -> {}",
            rows.len(),
            model.len(),
            self.config.step_minutes,
            steps.first().map(|s| s.occupancy).unwrap_or_default()
        );

        Some(Forecast {
            steps,
            updated_at: now,
        })
    }
}

/// Fetch logs, forecast, and publish. With `dry_run` the document is printed
/// instead of published.
pub async fn run(config: &Config, dry_run: bool) -> Result<()> {
    let fc = &config.forecast;
    let timeout = Duration::from_secs(fc.request_timeout_secs);

    let feed = SnapshotFeed::from_config(&fc.feed, timeout)?;
    let logs = feed.fetch_logs(&config.device_id).await?;
    if logs.is_empty() {
        info!("No logs found for {}", config.device_id);
        return Ok(());
    }

    let rows = build_rows(&logs);
    let forecaster = Forecaster::new(fc.clone());
    let Some(forecast) = forecaster.forecast(&rows, chrono::Utc::now().timestamp()) else {
        return Ok(());
    };
    let doc = forecast.to_json();

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    match &fc.output {
        PredictionOutput::Http { url } => {
            let response = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("Failed to build HTTP client")?
                .put(url)
                .json(&doc)
                .send()
                .await
                .context("Failed to upload predictions")?;
            info!("Uploaded predictions: {}", response.status());
            if !response.status().is_success() {
                anyhow::bail!("Prediction upload returned {}", response.status());
            }
        }
        PredictionOutput::File { path } => {
            let path = Path::new(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, serde_json::to_vec_pretty(&doc)?)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote predictions to {}", path.display());
        }
    }
    Ok(())
}
