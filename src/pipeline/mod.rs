// src/pipeline/mod.rs

pub mod metrics;
pub mod orchestrator;
pub mod tick_context;

pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::{EvaluationLoop, TickReport};
pub use tick_context::TickContext;
