// src/pipeline/orchestrator.rs
//
// The evaluation loop. Each tick:
//   1. snapshot fresh frames (idle tick → nothing else happens)
//   2. extract + smooth every referenced signal with a fresh frame
//   3. evaluate rule sets over the stabilized signals
//   4. hand the decision to the transition controller
// The next tick never starts before the current one (including any
// backend call) has finished.

use super::metrics::PipelineMetrics;
use super::tick_context::{FreshnessTracker, TickContext};
use crate::backend::SceneBackend;
use crate::capture::{CaptureSet, FrameProvider};
use crate::extraction::{ObjectDetector, SignalExtractor};
use crate::rules::{Decision, RuleEvaluator};
use crate::smoothing::SmoothingEngine;
use crate::transition::{TransitionController, TransitionOutcome};
use crate::types::{Config, RuleSet, Sensor, SignalKey};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub fresh_frames: usize,
    /// `None` for idle ticks
    pub decision: Option<Decision>,
    pub outcome: Option<TransitionOutcome>,
}

impl TickReport {
    fn idle() -> Self {
        Self {
            fresh_frames: 0,
            decision: None,
            outcome: None,
        }
    }
}

pub struct EvaluationLoop {
    sensors: BTreeMap<String, Sensor>,
    keys: Vec<SignalKey>,
    extractor: SignalExtractor,
    smoothing: SmoothingEngine,
    evaluator: RuleEvaluator,
    controller: TransitionController,
    backend: Arc<dyn SceneBackend>,
    metrics: PipelineMetrics,
    freshness: FreshnessTracker,
    /// Keys whose last extraction failed, to log each failure streak once
    failing: HashSet<SignalKey>,
    tick_interval: Duration,
    stale_after: Duration,
    tick_count: u64,
    last_decision: Option<Decision>,
}

impl EvaluationLoop {
    pub fn from_config(
        config: &Config,
        sensors: Vec<Sensor>,
        rule_sets: Vec<RuleSet>,
        detector: Option<Arc<dyn ObjectDetector>>,
        backend: Arc<dyn SceneBackend>,
        metrics: PipelineMetrics,
    ) -> Self {
        let sensors: BTreeMap<String, Sensor> =
            sensors.into_iter().map(|s| (s.id.clone(), s)).collect();
        let evaluator = RuleEvaluator::new(rule_sets, config.engine.fallback_scene.clone());

        // Every referenced key gets an empty history up front; keys on
        // unknown sensors are left out and fail closed.
        let mut smoothing = SmoothingEngine::new(&config.smoothing);
        let keys: Vec<SignalKey> = evaluator
            .signal_keys()
            .into_iter()
            .filter(|key| sensors.contains_key(&key.sensor))
            .collect();
        for key in &keys {
            smoothing.register(key, sensors[&key.sensor].strictness);
        }

        Self {
            extractor: SignalExtractor::new(
                detector,
                config.detection.confidence_threshold,
                config.motion.clone(),
            ),
            smoothing,
            evaluator,
            controller: TransitionController::new(
                Duration::from_millis(config.engine.cooldown_ms),
                config.engine.verify_active_scene,
            ),
            backend,
            metrics,
            freshness: FreshnessTracker::new(),
            failing: HashSet::new(),
            tick_interval: Duration::from_millis(config.engine.tick_interval_ms.max(1)),
            stale_after: Duration::from_millis(config.engine.stale_after_ms),
            tick_count: 0,
            last_decision: None,
            sensors,
            keys,
        }
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    pub fn controller(&self) -> &TransitionController {
        &self.controller
    }

    pub fn smoothing(&self) -> &SmoothingEngine {
        &self.smoothing
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Seed the controller with the backend's active scene.
    pub async fn sync_active(&mut self) {
        self.controller.sync_active(self.backend.as_ref()).await;
    }

    pub async fn tick(&mut self, provider: &dyn FrameProvider, now: Instant) -> TickReport {
        let started = std::time::Instant::now();
        self.tick_count += 1;
        self.metrics.inc(&self.metrics.ticks);

        let ctx = TickContext::collect(
            self.tick_count,
            now,
            provider,
            self.sensors.keys().map(String::as_str),
            &mut self.freshness,
        );

        if ctx.is_idle() {
            trace!("Tick {}: idle", ctx.tick);
            self.metrics.inc(&self.metrics.idle_ticks);
            return TickReport::idle();
        }

        self.extractor.begin_tick();
        let mut signals: HashMap<SignalKey, bool> = HashMap::with_capacity(self.keys.len());

        for key in &self.keys {
            let Some(sensor) = self.sensors.get(&key.sensor) else {
                continue;
            };

            match ctx.frame(&key.sensor) {
                Some(frame) => {
                    let extraction = self.extractor.extract(key, sensor, frame).await;
                    self.metrics.inc(&self.metrics.extractions);
                    match &extraction.error {
                        Some(e) => {
                            self.metrics.inc(&self.metrics.extraction_failures);
                            if self.failing.insert(key.clone()) {
                                warn!("Extraction failed for {}: {}", key, e);
                            } else {
                                debug!("Extraction still failing for {}: {}", key, e);
                            }
                        }
                        None => {
                            if self.failing.remove(key) {
                                info!("Extraction for {} recovered", key);
                            }
                        }
                    }

                    let raw = extraction.observation.is_positive();
                    let stabilized = self.smoothing.update(key, raw, sensor.strictness);
                    signals.insert(key.clone(), stabilized);
                }
                None if !self.stale_after.is_zero()
                    && self.freshness.is_recent(&key.sensor, now, self.stale_after) =>
                {
                    if let Some(stabilized) = self.smoothing.stabilized(key) {
                        signals.insert(key.clone(), stabilized);
                    }
                }
                None => debug!("{}: no recent frame", key),
            }
        }

        let decision = self.evaluator.evaluate(&signals);
        if self.last_decision.as_ref() != Some(&decision) {
            debug!("Tick {}: decision changed to {:?}", ctx.tick, decision);
            self.last_decision = Some(decision.clone());
        }

        let outcome = match decision.target() {
            Some(target) => Some(
                self.controller
                    .apply(target, now, self.backend.as_ref(), &self.metrics)
                    .await,
            ),
            None => None,
        };

        self.metrics.set_timing(
            &self.metrics.last_tick_us,
            started.elapsed().as_micros() as u64,
        );

        TickReport {
            fresh_frames: ctx.fresh_count(),
            decision: Some(decision),
            outcome,
        }
    }

    /// Tick until the shutdown flag flips to true (or its sender is dropped),
    /// then stop every capture thread.
    pub async fn run(mut self, capture: CaptureSet, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut next_summary = Instant::now() + SUMMARY_INTERVAL;

        info!(
            "▶ Evaluation loop running every {:?} ({} signal(s), {} smoothing)",
            self.tick_interval,
            self.keys.len(),
            self.smoothing.strategy_name()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let now = Instant::now();
            self.tick(&capture, now).await;

            if now >= next_summary {
                self.log_summary();
                next_summary = now + SUMMARY_INTERVAL;
            }
        }

        info!("⏹ Shutdown requested, stopping capture");
        self.log_summary();

        if let Err(e) = tokio::task::spawn_blocking(move || capture.stop_all()).await {
            warn!("Failed to stop capture threads cleanly: {}", e);
        }
    }

    fn log_summary(&self) {
        let s = self.metrics.summary();
        info!(
            "📊 ticks={} idle={} ({:.1}/s) frames={} acq_failures={} extractions={} extraction_failures={} transitions={} failed={} cooldown_skips={} last_tick={}µs",
            s.ticks,
            s.idle_ticks,
            s.tick_rate,
            s.frames_acquired,
            s.acquisition_failures,
            s.extractions,
            s.extraction_failures,
            s.transitions,
            s.transition_failures,
            s.cooldown_skips,
            s.last_tick_us
        );
    }
}
