// src/counting/mod.rs

pub mod classifier;
pub mod counter;
pub mod ingestion;
pub mod track_store;
pub mod types;

pub use ingestion::{FrameIngestor, FrameRecord};
pub use types::{AggregateCounts, Boundaries, CrossingEvent, EventKind};
