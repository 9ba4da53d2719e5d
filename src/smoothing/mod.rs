// src/smoothing/mod.rs

pub mod debounce;
pub mod engine;
pub mod history;
pub mod moving_average;

pub use engine::SmoothingEngine;
pub use history::SignalHistory;

/// Reduces a signal history to one stabilized boolean. Implementations hold
/// only their parameters; all per-signal state lives in the history, so the
/// output is a function of the history alone.
pub trait SmoothingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// History capacity this strategy needs
    fn capacity(&self) -> usize;

    /// Append one raw observation and update any counters.
    fn record(&self, history: &mut SignalHistory, raw: bool);

    fn stabilized(&self, history: &SignalHistory) -> bool;
}
