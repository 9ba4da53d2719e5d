// src/smoothing/engine.rs

use super::debounce::Debounce;
use super::history::SignalHistory;
use super::moving_average::MovingAverage;
use super::SmoothingStrategy;
use crate::types::{DetectionKind, SignalKey, SmoothingConfig, SmoothingStrategyKind};
use std::collections::HashMap;
use tracing::debug;

/// Owns one history per signal key. Histories are created on first
/// reference and updated exactly once per raw observation.
pub struct SmoothingEngine {
    presence: Box<dyn SmoothingStrategy>,
    motion: Box<dyn SmoothingStrategy>,
    histories: HashMap<SignalKey, SignalHistory>,
}

impl SmoothingEngine {
    pub fn new(config: &SmoothingConfig) -> Self {
        let build = |kind: &DetectionKind| -> Box<dyn SmoothingStrategy> {
            let params = config.params_for(kind);
            match config.strategy {
                SmoothingStrategyKind::MovingAverage => Box::new(MovingAverage::from_params(params)),
                SmoothingStrategyKind::Debounce => Box::new(Debounce::from_params(params)),
            }
        };

        Self {
            presence: build(&DetectionKind::Presence(String::new())),
            motion: build(&DetectionKind::Motion),
            histories: HashMap::new(),
        }
    }

    fn strategy(&self, kind: &DetectionKind) -> &dyn SmoothingStrategy {
        match kind {
            DetectionKind::Motion => self.motion.as_ref(),
            DetectionKind::Presence(_) => self.presence.as_ref(),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.presence.name()
    }

    /// Create an empty history for `key` if it has none yet.
    pub fn register(&mut self, key: &SignalKey, strictness: f32) {
        if !self.histories.contains_key(key) {
            let capacity = self.strategy(&key.kind).capacity();
            self.histories
                .insert(key.clone(), SignalHistory::new(capacity, strictness));
        }
    }

    /// Record one raw observation and return the new stabilized value.
    pub fn update(&mut self, key: &SignalKey, raw: bool, strictness: f32) -> bool {
        self.register(key, strictness);

        let strategy = match key.kind {
            DetectionKind::Motion => self.motion.as_ref(),
            DetectionKind::Presence(_) => self.presence.as_ref(),
        };
        let Some(history) = self.histories.get_mut(key) else {
            return false;
        };

        strategy.record(history, raw);
        let stabilized = strategy.stabilized(history);
        debug!(
            "{}: raw={} stabilized={} ({}/{} true)",
            key,
            raw,
            stabilized,
            history.true_count(),
            history.len()
        );
        stabilized
    }

    /// Current stabilized value, `None` if the key was never registered.
    pub fn stabilized(&self, key: &SignalKey) -> Option<bool> {
        let history = self.histories.get(key)?;
        Some(self.strategy(&key.kind).stabilized(history))
    }

    pub fn history(&self, key: &SignalKey) -> Option<&SignalHistory> {
        self.histories.get(key)
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}
