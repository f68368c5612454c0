// src/main.rs

mod config;
mod counting;
mod delivery;
mod feed;
mod forecast;
mod pipeline;
mod relay;
mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use counting::{FrameIngestor, FrameRecord};
use delivery::{CountSink, NullSink, PushClient};
use pipeline::{EventLog, PipelineMetrics};
use types::Config;

#[derive(Parser, Debug)]
#[command(name = "doorway-counter", about = "Doorway people counting, count relay and occupancy forecast")]
struct Cli {
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count crossings from tracker output (JSON lines, one frame per line)
    Count {
        /// Read frames from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
        /// Append every counted crossing to this JSONL file
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Receive count pushes and publish periodic snapshots
    Relay,
    /// Forecast occupancy from the snapshot feed
    Forecast {
        /// Print the prediction instead of publishing it
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("doorway_counter={}", config.logging.level))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("✓ Configuration loaded from {}", cli.config.display());

    match cli.command {
        Command::Count { input, events } => run_count(&config, input, events).await,
        Command::Relay => relay::serve(&config).await,
        Command::Forecast { dry_run } => forecast::run(&config, dry_run).await,
    }
}

async fn run_count(config: &Config, input: Option<PathBuf>, events: Option<PathBuf>) -> Result<()> {
    info!(
        "🚌 {} counter: enter_line={} exit_line={} (reset margin {} unused)",
        config.device_id,
        config.boundaries.enter_line,
        config.boundaries.exit_line,
        config.boundaries.exit_reset_margin
    );

    let metrics = PipelineMetrics::new();
    let mut event_log = events.as_deref().map(EventLog::open).transpose()?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
        Some(path) => Box::new(BufReader::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    match &config.delivery.push_url {
        Some(url) => {
            let client = PushClient::spawn(url.clone(), &config.delivery, metrics.clone())?;
            let client = ingest(reader, client, config, &metrics, event_log.as_mut()).await?;
            client.shutdown().await;
        }
        None => {
            warn!("No push_url configured, counts stay local");
            ingest(reader, NullSink, config, &metrics, event_log.as_mut()).await?;
        }
    }

    let summary = metrics.summary();
    info!("✓ Input exhausted");
    info!("  Frames: {} ({:.1} FPS)", summary.total_frames, summary.fps);
    info!(
        "  Observations: {} | dropped detections: {} | malformed lines: {}",
        summary.observations, summary.dropped_detections, summary.malformed_lines
    );
    info!(
        "  ENTER: {} | EXIT: {} | evicted tracks: {}",
        summary.enter_events, summary.exit_events, summary.tracks_evicted
    );
    info!(
        "  Pushes: {} ok, {} failed",
        summary.push_successes, summary.push_failures
    );
    Ok(())
}

/// Feed every line of `reader` through the ingestor, then hand the sink back.
async fn ingest<S: CountSink>(
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    sink: S,
    config: &Config,
    metrics: &PipelineMetrics,
    mut event_log: Option<&mut EventLog>,
) -> Result<S> {
    let mut ingestor = FrameIngestor::new(config.boundaries, &config.tracking, sink, metrics.clone());
    let mut lines = reader.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let frame = match FrameRecord::parse(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Line {}: skipping malformed frame: {}", line_no, e);
                metrics.inc(&metrics.malformed_lines);
                continue;
            }
        };

        for event in ingestor.process_frame(&frame) {
            if let Some(log) = event_log.as_deref_mut() {
                if let Err(e) = log.append(&event) {
                    error!("Failed to record crossing: {:#}", e);
                }
            }
        }
    }

    let counts = ingestor.counts();
    info!(
        "Final counts: entered={} exited={} occupancy={}",
        counts.entered,
        counts.exited,
        counts.occupancy()
    );
    Ok(ingestor.into_sink())
}
