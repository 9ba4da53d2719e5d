// src/smoothing/moving_average.rs

use super::history::SignalHistory;
use super::SmoothingStrategy;
use crate::types::SmoothingParams;

/// stabilized = (trues in window / window length) > ratio, forced false
/// until `warmup` observations have been seen.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window_size: usize,
    ratio: f32,
    warmup: usize,
}

impl MovingAverage {
    pub fn new(window_size: usize, ratio: f32, warmup: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            ratio,
            warmup,
        }
    }

    pub fn from_params(params: &SmoothingParams) -> Self {
        Self::new(params.window_size, params.ratio, params.warmup)
    }
}

impl SmoothingStrategy for MovingAverage {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn capacity(&self) -> usize {
        self.window_size
    }

    fn record(&self, history: &mut SignalHistory, raw: bool) {
        history.push(raw);
    }

    fn stabilized(&self, history: &SignalHistory) -> bool {
        if history.observed() < self.warmup || history.is_empty() {
            return false;
        }
        history.true_ratio() > self.ratio
    }
}
