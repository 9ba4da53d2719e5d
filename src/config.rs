// src/config.rs

use crate::error::ConfigError;
use crate::types::{
    CameraEntry, Condition, Config, Operator, RuleSet, Sensor,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::warn;

impl Config {
    /// Load from a `.json` file, or YAML for any other extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Normalize camera entries into sensors, validating ROIs.
    pub fn sensors(&self) -> Result<Vec<Sensor>, ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::NoSensors);
        }

        let default_threshold = self.motion.score_threshold;
        let mut sensors = Vec::with_capacity(self.cameras.len());

        for (id, entry) in &self.cameras {
            let sensor = match entry {
                CameraEntry::Url(url) => Sensor {
                    id: id.clone(),
                    url: url.clone(),
                    roi: None,
                    motion_threshold: default_threshold,
                    strictness: 1.0,
                },
                CameraEntry::Detailed(details) => Sensor {
                    id: id.clone(),
                    url: details.url.clone(),
                    roi: details.roi,
                    motion_threshold: details.motion_threshold.unwrap_or(default_threshold),
                    strictness: details.strictness.unwrap_or(1.0),
                },
            };

            if let Some(roi) = sensor.roi {
                if !roi.is_valid() {
                    return Err(ConfigError::InvalidRoi {
                        sensor: id.clone(),
                        roi: roi.to_string(),
                    });
                }
            }
            if !(sensor.strictness.is_finite() && sensor.strictness > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "camera '{}' strictness must be positive, got {}",
                    id, sensor.strictness
                )));
            }

            sensors.push(sensor);
        }

        Ok(sensors)
    }

    /// Convert the configured rule sets, preserving their priority order.
    pub fn rule_sets(&self) -> Result<Vec<RuleSet>, ConfigError> {
        let mut rule_sets = Vec::with_capacity(self.logic_conditions.len());

        for (i, set) in self.logic_conditions.iter().enumerate() {
            let mut conditions = Vec::with_capacity(set.conditions.len());
            for condition in &set.conditions {
                if let Some(roi) = condition.roi {
                    if !roi.is_valid() {
                        return Err(ConfigError::InvalidRoi {
                            sensor: format!("{} (rule set {})", condition.camera, i + 1),
                            roi: roi.to_string(),
                        });
                    }
                }
                conditions.push(Condition {
                    sensor: condition.camera.clone(),
                    kind: condition.detection_type.clone(),
                    polarity: condition.condition_type,
                    operator: condition.operator.unwrap_or(Operator::And),
                    roi: condition.roi,
                });
            }
            rule_sets.push(RuleSet {
                conditions,
                scene: set.scene.clone(),
            });
        }

        Ok(rule_sets)
    }

    /// Backend URL, falling back to the legacy top-level key.
    pub fn backend_url(&self) -> Option<&str> {
        self.backend.url.as_deref().or(self.url.as_deref())
    }

    pub fn backend_password(&self) -> Option<&str> {
        self.backend
            .password
            .as_deref()
            .or(self.password.as_deref())
            .filter(|p| !p.is_empty())
    }
}

/// Log, once, every rule set that references a camera nobody configured.
/// Such rule sets are kept; at runtime they simply never match.
/// Returns the number of offending conditions.
pub fn warn_unknown_sensors(rule_sets: &[RuleSet], sensors: &[Sensor]) -> usize {
    let known: BTreeSet<&str> = sensors.iter().map(|s| s.id.as_str()).collect();
    let mut unknown = 0;

    for (i, set) in rule_sets.iter().enumerate() {
        for condition in &set.conditions {
            if !known.contains(condition.sensor.as_str()) {
                warn!(
                    "Rule set {} (→ \"{}\") references unconfigured camera '{}'; it will never match",
                    i + 1,
                    set.scene,
                    condition.sensor
                );
                unknown += 1;
            }
        }
    }

    unknown
}

/// Log, once, every rule set whose scene the backend does not offer.
pub fn warn_unknown_scenes(rule_sets: &[RuleSet], fallback: Option<&str>, scenes: &[String]) {
    let available: BTreeSet<&str> = scenes.iter().map(String::as_str).collect();

    for (i, set) in rule_sets.iter().enumerate() {
        if !available.contains(set.scene.as_str()) {
            warn!(
                "Rule set {} targets scene \"{}\" which the backend does not list",
                i + 1,
                set.scene
            );
        }
    }
    if let Some(fallback) = fallback {
        if !available.contains(fallback) {
            warn!("Fallback scene \"{}\" is not listed by the backend", fallback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectionKind, Polarity, Roi, SmoothingStrategyKind};
    use std::io::Write;

    const YAML: &str = r#"
engine:
  cooldown_ms: 1500
  fallback_scene: Idle
smoothing:
  strategy: debounce
cameras:
  desk: rtsp://camera-1/stream
  cnc:
    url: rtsp://camera-2/stream
    roi: { left: 10, top: 0, right: 90, bottom: 100 }
    motion_threshold: 15000
    strictness: 1.5
logic_conditions:
  - conditions:
      - { camera: desk, detection_type: person, condition_type: presence }
      - { camera: cnc, detection_type: motion, condition_type: absence, operator: or }
    scene: Desk
"#;

    #[test]
    fn test_both_camera_shapes_normalize() {
        let config = Config::from_yaml(YAML).unwrap();
        let sensors = config.sensors().unwrap();

        assert_eq!(sensors.len(), 2);
        let cnc = sensors.iter().find(|s| s.id == "cnc").unwrap();
        assert_eq!(cnc.roi, Some(Roi::new(10.0, 0.0, 90.0, 100.0)));
        assert_eq!(cnc.motion_threshold, 15000.0);
        assert_eq!(cnc.strictness, 1.5);

        let desk = sensors.iter().find(|s| s.id == "desk").unwrap();
        assert_eq!(desk.url, "rtsp://camera-1/stream");
        assert_eq!(desk.roi, None);
        assert_eq!(desk.motion_threshold, config.motion.score_threshold);
        assert_eq!(desk.strictness, 1.0);
    }

    #[test]
    fn test_defaults_and_overrides() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.engine.cooldown_ms, 1500);
        assert_eq!(config.engine.tick_interval_ms, 100);
        assert_eq!(config.engine.fallback_scene.as_deref(), Some("Idle"));
        assert_eq!(config.smoothing.strategy, SmoothingStrategyKind::Debounce);
        assert_eq!(config.smoothing.presence.ratio, 0.5);
        assert_eq!(config.smoothing.motion.ratio, 0.7);
    }

    #[test]
    fn test_rule_sets_keep_order_and_operators() {
        let config = Config::from_yaml(YAML).unwrap();
        let rule_sets = config.rule_sets().unwrap();

        assert_eq!(rule_sets.len(), 1);
        let conditions = &rule_sets[0].conditions;
        assert_eq!(conditions[0].kind, DetectionKind::Presence("person".into()));
        assert_eq!(conditions[0].operator, Operator::And);
        assert_eq!(conditions[1].kind, DetectionKind::Motion);
        assert_eq!(conditions[1].polarity, Polarity::Absence);
        assert_eq!(conditions[1].operator, Operator::Or);
    }

    #[test]
    fn test_invalid_roi_is_rejected() {
        let yaml = r#"
cameras:
  desk:
    url: rtsp://x
    roi: { left: 60, top: 0, right: 40, bottom: 100 }
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.sensors(),
            Err(ConfigError::InvalidRoi { .. })
        ));
    }

    #[test]
    fn test_no_cameras_is_an_error() {
        let config = Config::from_yaml("logging: { level: debug }").unwrap();
        assert!(matches!(config.sensors(), Err(ConfigError::NoSensors)));
    }

    #[test]
    fn test_legacy_json_layout_loads() {
        let json = r#"{
            "url": "http://localhost:4445",
            "password": "secret",
            "cameras": { "desk": "rtsp://camera-1/stream" },
            "logic_conditions": [
                { "conditions": [
                    { "camera": "desk", "detection_type": "motion", "condition_type": "presence" }
                  ],
                  "scene": "Workbench" }
            ]
        }"#;

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.backend_url(), Some("http://localhost:4445"));
        assert_eq!(config.backend_password(), Some("secret"));
        assert_eq!(config.rule_sets().unwrap()[0].scene, "Workbench");
    }

    #[test]
    fn test_unknown_sensor_is_counted() {
        let config = Config::from_yaml(YAML).unwrap();
        let mut rule_sets = config.rule_sets().unwrap();
        rule_sets[0].conditions[0].sensor = "garage".to_string();

        let sensors = config.sensors().unwrap();
        assert_eq!(warn_unknown_sensors(&rule_sets, &sensors), 1);
    }
}
