// src/smoothing/debounce.rs
//
// Asymmetric enter/exit debounce. A sustained counter rises by 1 on every
// positive observation and falls by `decay_step` on every negative one
// (floored at 0, capped above). The output latches on when the counter
// reaches the enter threshold AND the recent window is positive enough,
// and latches off only once the counter is back at 0 after a run of
// negatives.

use super::history::SignalHistory;
use super::SmoothingStrategy;
use crate::types::SmoothingParams;

#[derive(Debug, Clone)]
pub struct Debounce {
    enter_threshold: u32,
    decay_step: u32,
    exit_false_run: u32,
    recent_window: usize,
    recent_ratio: f32,
    counter_cap: u32,
    warmup: usize,
    capacity: usize,
}

impl Debounce {
    pub fn from_params(params: &SmoothingParams) -> Self {
        let enter_threshold = params.enter_threshold.max(1);
        Self {
            enter_threshold,
            decay_step: params.decay_step,
            exit_false_run: params.exit_false_run,
            recent_window: params.recent_window.max(1),
            recent_ratio: params.recent_ratio,
            counter_cap: params
                .counter_cap
                .unwrap_or(enter_threshold.saturating_mul(2))
                .max(enter_threshold),
            warmup: params.warmup,
            capacity: params.window_size.max(params.recent_window).max(1),
        }
    }

    /// Enter threshold scaled by the sensor's strictness, rounded up.
    pub fn required(&self, strictness: f32) -> u32 {
        let scaled = (self.enter_threshold as f32 * strictness.max(0.0)).ceil() as u32;
        scaled.max(1)
    }
}

impl SmoothingStrategy for Debounce {
    fn name(&self) -> &'static str {
        "debounce"
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn record(&self, history: &mut SignalHistory, raw: bool) {
        history.push(raw);

        let cap = self.counter_cap.max(self.required(history.strictness()));
        history.counter = if raw {
            history.counter.saturating_add(1).min(cap)
        } else {
            history.counter.saturating_sub(self.decay_step)
        };

        if !history.latched {
            history.latched = history.observed() >= self.warmup
                && history.counter >= self.required(history.strictness())
                && history.recent_true_ratio(self.recent_window) > self.recent_ratio;
        } else if history.counter == 0 && history.consecutive_false() >= self.exit_false_run {
            history.latched = false;
        }
    }

    fn stabilized(&self, history: &SignalHistory) -> bool {
        history.latched
    }
}
