// src/relay/mod.rs
//
// Receives count pushes from the on-board counter and re-publishes the
// latest totals to the snapshot feed on a fixed cadence.
//
//   POST /update   {"peopleEntered": n, "peopleExited": m}
//   GET  /latest   {"entered": n, "exited": m}

pub mod handlers;
pub mod state;
pub mod uploader;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tracing::{info, warn};

use crate::feed::SnapshotFeed;
use crate::types::Config;

pub use state::RelayState;
pub use uploader::Uploader;

pub fn create_router(state: RelayState) -> Router {
    Router::new()
        .route("/update", post(handlers::update_counts))
        .route("/latest", get(handlers::latest_counts))
        .with_state(state)
}

/// Run the relay until Ctrl+C.
pub async fn serve(config: &Config) -> Result<()> {
    let state = RelayState::new();

    let feed = SnapshotFeed::from_config(
        &config.relay.feed,
        Duration::from_secs(config.relay.upload_timeout_secs),
    )?;
    let uploader = Uploader::new(
        state.clone(),
        feed,
        config.device_id.clone(),
        Duration::from_secs(config.relay.upload_interval_secs),
    );
    let upload_task = tokio::spawn(uploader.run());

    let listener = tokio::net::TcpListener::bind(&config.relay.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.relay.listen_addr))?;
    info!("[RELAY] Listening on {}", config.relay.listen_addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => {
                    warn!("Cannot listen for Ctrl+C ({}), running until killed", e);
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .context("Relay server failed")?;

    upload_task.abort();
    Ok(())
}
