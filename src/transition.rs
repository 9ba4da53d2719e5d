// src/transition.rs

use crate::backend::SceneBackend;
use crate::pipeline::metrics::PipelineMetrics;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Target is already the active scene
    AlreadyActive,
    /// Last successful switch is too recent
    CoolingDown,
    Switched,
    /// Backend refused or errored; state untouched
    Failed,
}

/// Cooldown-gated scene switching. Only successful switches move the
/// recorded scene and timestamp.
pub struct TransitionController {
    cooldown: Duration,
    verify_active: bool,
    active: Option<String>,
    last_transition: Option<Instant>,
}

impl TransitionController {
    pub fn new(cooldown: Duration, verify_active: bool) -> Self {
        Self {
            cooldown,
            verify_active,
            active: None,
            last_transition: None,
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn last_transition(&self) -> Option<Instant> {
        self.last_transition
    }

    /// Seed the cached scene from the backend. Does not start a cooldown.
    pub async fn sync_active(&mut self, backend: &dyn SceneBackend) {
        match backend.current_scene().await {
            Ok(scene) => {
                info!("Active scene: {}", scene);
                self.active = Some(scene);
            }
            Err(e) => warn!("Could not read the active scene: {}", e),
        }
    }

    /// A zero cooldown never gates.
    fn in_cooldown(&self, now: Instant) -> bool {
        if self.cooldown.is_zero() {
            return false;
        }
        self.last_transition
            .map(|last| now.saturating_duration_since(last) <= self.cooldown)
            .unwrap_or(false)
    }

    /// Move to `target` if it differs from the active scene and more than
    /// the cooldown has passed since the last switch. At most one backend
    /// switch per call.
    pub async fn apply(
        &mut self,
        target: &str,
        now: Instant,
        backend: &dyn SceneBackend,
        metrics: &PipelineMetrics,
    ) -> TransitionOutcome {
        if self.active.as_deref() == Some(target) {
            return TransitionOutcome::AlreadyActive;
        }

        if self.in_cooldown(now) {
            debug!("Cooldown active, not switching to '{}'", target);
            metrics.inc(&metrics.cooldown_skips);
            return TransitionOutcome::CoolingDown;
        }

        if self.verify_active {
            match backend.current_scene().await {
                Ok(current) if current == target => {
                    info!("Scene '{}' was already active (changed outside the director)", target);
                    self.active = Some(current);
                    return TransitionOutcome::AlreadyActive;
                }
                Ok(current) => {
                    if self.active.as_deref() != Some(current.as_str()) {
                        debug!("Backend reports '{}' as active", current);
                    }
                    self.active = Some(current);
                }
                Err(e) => debug!("Could not verify active scene: {}", e),
            }
        }

        match backend.switch_scene(target).await {
            Ok(()) => {
                info!(
                    "🎬 Switched scene: {} → {}",
                    self.active.as_deref().unwrap_or("<unknown>"),
                    target
                );
                self.active = Some(target.to_string());
                self.last_transition = Some(now);
                metrics.inc(&metrics.transitions);
                TransitionOutcome::Switched
            }
            Err(e) => {
                warn!("Failed to switch to scene '{}': {}", target, e);
                metrics.inc(&metrics.transition_failures);
                TransitionOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn scenes() -> MemoryBackend {
        MemoryBackend::new(vec!["S0".into(), "S1".into(), "S2".into()])
    }

    #[tokio::test]
    async fn test_cooldown_gate() {
        let backend = scenes();
        let metrics = PipelineMetrics::new();
        let mut controller = TransitionController::new(Duration::from_secs(1), false);
        let t0 = Instant::now();

        assert_eq!(
            controller.apply("S1", t0, &backend, &metrics).await,
            TransitionOutcome::Switched
        );
        assert_eq!(
            controller
                .apply("S2", t0 + Duration::from_millis(500), &backend, &metrics)
                .await,
            TransitionOutcome::CoolingDown
        );
        // Exactly on the boundary is still cooling down
        assert_eq!(
            controller
                .apply("S2", t0 + Duration::from_millis(1000), &backend, &metrics)
                .await,
            TransitionOutcome::CoolingDown
        );
        assert_eq!(backend.switches(), vec!["S1"]);

        assert_eq!(
            controller
                .apply("S2", t0 + Duration::from_millis(1100), &backend, &metrics)
                .await,
            TransitionOutcome::Switched
        );
        assert_eq!(backend.switches(), vec!["S1", "S2"]);
        assert_eq!(metrics.summary().cooldown_skips, 2);
    }

    #[tokio::test]
    async fn test_same_target_is_not_reissued() {
        let backend = scenes();
        let metrics = PipelineMetrics::new();
        let mut controller = TransitionController::new(Duration::ZERO, false);
        let t0 = Instant::now();

        controller.apply("S1", t0, &backend, &metrics).await;
        let again = controller
            .apply("S1", t0 + Duration::from_secs(5), &backend, &metrics)
            .await;
        assert_eq!(again, TransitionOutcome::AlreadyActive);
        assert_eq!(backend.switches(), vec!["S1"]);
    }

    #[tokio::test]
    async fn test_zero_cooldown_never_gates() {
        let backend = scenes();
        let metrics = PipelineMetrics::new();
        let mut controller = TransitionController::new(Duration::ZERO, false);
        let t0 = Instant::now();

        controller.apply("S1", t0, &backend, &metrics).await;
        assert_eq!(
            controller.apply("S2", t0, &backend, &metrics).await,
            TransitionOutcome::Switched
        );
        assert_eq!(backend.switches(), vec!["S1", "S2"]);
    }

    #[tokio::test]
    async fn test_failure_leaves_state_untouched() {
        let backend = scenes();
        let metrics = PipelineMetrics::new();
        let mut controller = TransitionController::new(Duration::from_secs(1), false);
        let t0 = Instant::now();

        controller.apply("S1", t0, &backend, &metrics).await;

        backend.set_failing(true);
        let t1 = t0 + Duration::from_secs(2);
        assert_eq!(
            controller.apply("S2", t1, &backend, &metrics).await,
            TransitionOutcome::Failed
        );
        assert_eq!(controller.active(), Some("S1"));
        assert_eq!(controller.last_transition(), Some(t0));

        // Retried on the next tick; the failure did not start a cooldown
        backend.set_failing(false);
        let t2 = t1 + Duration::from_millis(100);
        assert_eq!(
            controller.apply("S2", t2, &backend, &metrics).await,
            TransitionOutcome::Switched
        );
        assert_eq!(metrics.summary().transition_failures, 1);
    }

    #[tokio::test]
    async fn test_verify_picks_up_manual_switch() {
        let backend = scenes();
        let metrics = PipelineMetrics::new();
        let mut controller = TransitionController::new(Duration::from_secs(1), true);
        controller.sync_active(&backend).await;
        assert_eq!(controller.active(), Some("S0"));

        backend.set_active_externally("S2");
        let outcome = controller.apply("S2", Instant::now(), &backend, &metrics).await;
        assert_eq!(outcome, TransitionOutcome::AlreadyActive);
        assert_eq!(controller.active(), Some("S2"));
        assert!(backend.switches().is_empty());
        assert_eq!(controller.last_transition(), None);
    }
}
