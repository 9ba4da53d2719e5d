// src/main.rs

use anyhow::{Context, Result};
use scene_director::backend;
use scene_director::capture::CaptureSet;
use scene_director::config::{warn_unknown_scenes, warn_unknown_sensors};
use scene_director::extraction::ObjectDetector;
use scene_director::pipeline::{EvaluationLoop, PipelineMetrics};
use scene_director::types::{Config, DetectionKind, RuleSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.yaml";
const CONFIG_ENV: &str = "SCENE_DIRECTOR_CONFIG";

fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scene_director={},ort=warn", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path))?;
    init_logging(&config.logging.level);

    info!("🎥 Scene Director starting");
    info!("✓ Configuration loaded from {}", path);

    let sensors = config.sensors()?;
    let rule_sets = config.rule_sets()?;
    info!(
        "Cameras: {} | rule sets: {} | tick {}ms | cooldown {}ms | fallback: {}",
        sensors.len(),
        rule_sets.len(),
        config.engine.tick_interval_ms,
        config.engine.cooldown_ms,
        config.engine.fallback_scene.as_deref().unwrap_or("<keep current>")
    );
    warn_unknown_sensors(&rule_sets, &sensors);

    let backend = backend::connect(&config)?;
    match backend.list_scenes().await {
        Ok(scenes) => {
            info!("Available scenes: {}", scenes.join(", "));
            warn_unknown_scenes(
                &rule_sets,
                config.engine.fallback_scene.as_deref(),
                &scenes,
            );
        }
        Err(e) => warn!("Could not list scenes: {}", e),
    }

    let detector = build_detector(&config, &rule_sets)?;
    let metrics = PipelineMetrics::new();

    let mut evaluation = EvaluationLoop::from_config(
        &config,
        sensors.clone(),
        rule_sets,
        detector,
        backend,
        metrics.clone(),
    );
    for line in evaluation.evaluator().describe() {
        info!("{}", line);
    }
    evaluation.sync_active().await;

    let capture = CaptureSet::start(&sensors, &config.capture, &metrics)
        .context("Failed to start capture threads")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                // Keep the sender alive so the loop is not shut down
                std::future::pending::<()>().await;
            }
        }
    });

    evaluation.run(capture, shutdown_rx).await;
    info!("✓ Scene Director stopped");
    Ok(())
}

/// Object detector for presence conditions; `None` when no rule needs one.
fn build_detector(
    config: &Config,
    rule_sets: &[RuleSet],
) -> Result<Option<Arc<dyn ObjectDetector>>> {
    let needs_detector = rule_sets
        .iter()
        .flat_map(|r| &r.conditions)
        .any(|c| matches!(c.kind, DetectionKind::Presence(_)));

    if !needs_detector {
        return Ok(None);
    }

    #[cfg(feature = "onnx")]
    {
        let detector = scene_director::extraction::yolo::YoloDetector::new(&config.detection)
            .with_context(|| format!("Failed to load model {}", config.detection.model_path))?;
        Ok(Some(Arc::new(detector)))
    }

    #[cfg(not(feature = "onnx"))]
    {
        warn!(
            "Presence conditions need an object detector ({} not loaded: built without the `onnx` feature); they will never detect anything",
            config.detection.model_path
        );
        Ok(None)
    }
}
