// src/pipeline/mod.rs

pub mod event_log;
pub mod metrics;

pub use event_log::EventLog;
pub use metrics::PipelineMetrics;
