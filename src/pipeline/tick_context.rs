// src/pipeline/tick_context.rs
//
// Snapshot taken at the start of a tick: the newest frame of every sensor
// that delivered something since the previous tick. All extraction in the
// tick reads from this snapshot, never from the live slots.

use crate::capture::FrameProvider;
use crate::types::Frame;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Consumed {
    sequence: u64,
    at: Instant,
}

/// Per-sensor record of the last frame a tick consumed.
#[derive(Debug, Default)]
pub struct FreshnessTracker {
    consumed: HashMap<String, Consumed>,
}

impl FreshnessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sensors that have delivered a fresh frame within `window` of `now`.
    pub fn is_recent(&self, sensor_id: &str, now: Instant, window: Duration) -> bool {
        self.consumed
            .get(sensor_id)
            .map(|c| now.saturating_duration_since(c.at) <= window)
            .unwrap_or(false)
    }
}

pub struct TickContext {
    pub tick: u64,
    frames: BTreeMap<String, Arc<Frame>>,
}

impl TickContext {
    /// Take every sensor's newest frame whose sequence is newer than the one
    /// consumed last time.
    pub fn collect<'a>(
        tick: u64,
        now: Instant,
        provider: &dyn FrameProvider,
        sensor_ids: impl IntoIterator<Item = &'a str>,
        tracker: &mut FreshnessTracker,
    ) -> Self {
        let mut frames = BTreeMap::new();

        for id in sensor_ids {
            let Some(frame) = provider.latest(id) else {
                continue;
            };

            let is_fresh = tracker
                .consumed
                .get(id)
                .map(|c| frame.sequence > c.sequence)
                .unwrap_or(true);

            if is_fresh {
                tracker.consumed.insert(
                    id.to_string(),
                    Consumed {
                        sequence: frame.sequence,
                        at: now,
                    },
                );
                frames.insert(id.to_string(), frame);
            }
        }

        Self {
            tick,
            frames,
        }
    }

    pub fn frame(&self, sensor_id: &str) -> Option<&Frame> {
        self.frames.get(sensor_id).map(Arc::as_ref)
    }

    pub fn fresh_count(&self) -> usize {
        self.frames.len()
    }

    /// No sensor produced anything new since the last tick.
    pub fn is_idle(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> Arc<Frame> {
        let mut frame = Frame::new(vec![0u8; 3], 1, 1);
        frame.sequence = sequence;
        Arc::new(frame)
    }

    #[test]
    fn test_only_new_sequences_are_fresh() {
        let mut tracker = FreshnessTracker::new();
        let mut provider: BTreeMap<String, Arc<Frame>> = BTreeMap::new();
        provider.insert("a".to_string(), frame(1));
        let now = Instant::now();

        let ctx = TickContext::collect(1, now, &provider, ["a", "b"], &mut tracker);
        assert_eq!(ctx.fresh_count(), 1);
        assert!(ctx.frame("a").is_some());
        assert!(ctx.frame("b").is_none());

        // Same frame again: idle
        let ctx = TickContext::collect(2, now, &provider, ["a", "b"], &mut tracker);
        assert!(ctx.is_idle());

        provider.insert("a".to_string(), frame(5));
        let ctx = TickContext::collect(3, now, &provider, ["a", "b"], &mut tracker);
        assert_eq!(ctx.frame("a").map(|f| f.sequence), Some(5));
    }

    #[test]
    fn test_recent_window() {
        let mut tracker = FreshnessTracker::new();
        let mut provider: BTreeMap<String, Arc<Frame>> = BTreeMap::new();
        provider.insert("a".to_string(), frame(1));
        let t0 = Instant::now();
        TickContext::collect(1, t0, &provider, ["a"], &mut tracker);

        let window = Duration::from_millis(1000);
        assert!(tracker.is_recent("a", t0 + Duration::from_millis(1000), window));
        assert!(!tracker.is_recent("a", t0 + Duration::from_millis(1001), window));
        assert!(!tracker.is_recent("b", t0, window));
    }
}
