use crate::types::{Config, FeedConfig};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.boundaries;
        if !b.enter_line.is_finite() || !b.exit_line.is_finite() {
            bail!("boundary lines must be finite numbers");
        }
        if b.enter_line >= b.exit_line {
            bail!(
                "enter_line ({}) must be above (less than) exit_line ({})",
                b.enter_line,
                b.exit_line
            );
        }
        if self.device_id.trim().is_empty() {
            bail!("device_id must not be empty");
        }
        if self.tracking.idle_timeout_secs <= 0.0 {
            bail!("tracking.idle_timeout_secs must be positive");
        }
        if self.relay.upload_interval_secs == 0 {
            bail!("relay.upload_interval_secs must be at least 1");
        }
        if self.forecast.neighbors == 0 {
            bail!("forecast.neighbors must be at least 1");
        }
        if self.forecast.clamp_min > self.forecast.clamp_max {
            bail!("forecast.clamp_min must not exceed clamp_max");
        }
        for feed in [&self.relay.feed, &self.forecast.feed] {
            if let FeedConfig::File { dir } = feed {
                if dir.trim().is_empty() {
                    bail!("file feed needs a directory");
                }
            }
        }
        Ok(())
    }
}
