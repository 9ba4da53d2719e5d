// src/smoothing/history.rs

use std::collections::VecDeque;

/// Bounded history of raw observations for one signal key, plus the
/// counters the debounce strategy keeps. Everything a strategy needs to
/// produce its output lives here.
#[derive(Debug, Clone)]
pub struct SignalHistory {
    window: VecDeque<bool>,
    capacity: usize,
    observed: usize,
    consecutive_false: u32,
    /// Debounce sustained counter
    pub(crate) counter: u32,
    /// Debounce latched output
    pub(crate) latched: bool,
    /// Multiplier for the debounce enter threshold
    strictness: f32,
}

impl SignalHistory {
    pub fn new(capacity: usize, strictness: f32) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            observed: 0,
            consecutive_false: 0,
            counter: 0,
            latched: false,
            strictness,
        }
    }

    /// Append the newest observation, evicting the oldest at capacity.
    pub fn push(&mut self, raw: bool) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(raw);
        self.observed = self.observed.saturating_add(1);
        self.consecutive_false = if raw {
            0
        } else {
            self.consecutive_false.saturating_add(1)
        };
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total observations ever appended (not capped by capacity)
    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn consecutive_false(&self) -> u32 {
        self.consecutive_false
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn strictness(&self) -> f32 {
        self.strictness
    }

    pub fn true_count(&self) -> usize {
        self.window.iter().filter(|&&v| v).count()
    }

    /// Fraction of true observations in the window, 0 when empty.
    pub fn true_ratio(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.true_count() as f32 / self.window.len() as f32
    }

    /// Fraction of true observations among the newest `k`.
    pub fn recent_true_ratio(&self, k: usize) -> f32 {
        let k = k.min(self.window.len());
        if k == 0 {
            return 0.0;
        }
        let trues = self.window.iter().rev().take(k).filter(|&&v| v).count();
        trues as f32 / k as f32
    }

    pub fn iter(&self) -> impl Iterator<Item = &bool> {
        self.window.iter()
    }
}
