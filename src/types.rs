// src/types.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cameras: BTreeMap<String, CameraEntry>,
    #[serde(default)]
    pub logic_conditions: Vec<RuleSetConfig>,

    // Legacy top-level backend connection keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    pub cooldown_ms: u64,
    /// Scene to use when no rule set matches. `None` keeps the current scene.
    pub fallback_scene: Option<String>,
    /// Poll the backend before switching, to pick up manual scene changes.
    pub verify_active_scene: bool,
    /// How long a sensor's last stabilized signals stay usable without a
    /// fresh frame. 0 (the default) means a sensor with nothing new this
    /// tick is absent and its conditions fail closed.
    pub stale_after_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            cooldown_ms: 1000,
            fallback_scene: None,
            verify_active_scene: true,
            stale_after_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    ObsHttp,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub url: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
    /// Scenes offered by the in-memory backend
    pub scenes: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::ObsHttp,
            url: None,
            password: None,
            timeout_ms: 2000,
            scenes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub poll_delay_ms: u64,
    pub failure_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_delay_ms: 10,
            failure_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: String,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub num_threads: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: 0.6,
            iou_threshold: 0.45,
            num_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionScorerKind {
    BackgroundModel,
    FrameDifference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    pub scorer: MotionScorerKind,
    /// Per-pixel intensity delta that counts as foreground
    pub pixel_threshold: u8,
    /// Minimum blob size (pixels) counted as a contour
    pub min_area: usize,
    /// Default pass/fail threshold on the motion score
    pub score_threshold: f64,
    /// Readings are forced negative while the model stabilizes
    pub warmup_frames: u32,
    /// Background model adaptation rate (0..1)
    pub learning_rate: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            scorer: MotionScorerKind::BackgroundModel,
            pixel_threshold: 25,
            min_area: 1000,
            score_threshold: 20000.0,
            warmup_frames: 10,
            learning_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingStrategyKind {
    MovingAverage,
    Debounce,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub strategy: SmoothingStrategyKind,
    pub presence: SmoothingParams,
    pub motion: SmoothingParams,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            strategy: SmoothingStrategyKind::MovingAverage,
            presence: SmoothingParams::default(),
            motion: SmoothingParams {
                ratio: 0.7,
                ..SmoothingParams::default()
            },
        }
    }
}

impl SmoothingConfig {
    pub fn params_for(&self, kind: &DetectionKind) -> &SmoothingParams {
        match kind {
            DetectionKind::Motion => &self.motion,
            DetectionKind::Presence(_) => &self.presence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    /// History capacity (ring buffer size)
    pub window_size: usize,
    /// Moving average: stabilized = true_ratio > ratio
    pub ratio: f32,
    /// Observations required before any positive output
    pub warmup: usize,
    /// Debounce: sustained counter needed to latch on
    pub enter_threshold: u32,
    /// Debounce: counter decrease per negative observation
    pub decay_step: u32,
    /// Debounce: consecutive negatives (with counter at 0) needed to latch off
    pub exit_false_run: u32,
    /// Debounce: size of the recent window checked alongside the counter
    pub recent_window: usize,
    /// Debounce: minimum true ratio in the recent window to latch on
    pub recent_ratio: f32,
    /// Debounce: ceiling for the sustained counter (defaults to 2x the enter threshold)
    pub counter_cap: Option<u32>,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            window_size: 10,
            ratio: 0.5,
            warmup: 10,
            enter_threshold: 5,
            decay_step: 2,
            exit_false_run: 5,
            recent_window: 10,
            recent_ratio: 0.3,
            counter_cap: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A camera is either a bare URL or an object with URL plus options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CameraEntry {
    Url(String),
    Detailed(CameraDetails),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraDetails {
    pub url: String,
    #[serde(default)]
    pub roi: Option<Roi>,
    #[serde(default)]
    pub motion_threshold: Option<f64>,
    #[serde(default)]
    pub strictness: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetConfig {
    pub conditions: Vec<ConditionConfig>,
    pub scene: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub camera: String,
    pub detection_type: DetectionKind,
    pub condition_type: Polarity,
    #[serde(default)]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub roi: Option<Roi>,
}

// ============================================================================
// DOMAIN
// ============================================================================

/// Rectangular region of interest in percent of frame width/height.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Roi {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Roi {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn is_valid(&self) -> bool {
        let in_range = |v: f32| v.is_finite() && (0.0..=100.0).contains(&v);
        in_range(self.left)
            && in_range(self.top)
            && in_range(self.right)
            && in_range(self.bottom)
            && self.left < self.right
            && self.top < self.bottom
    }
}

impl Roi {
    /// Bit patterns with -0.0 folded into 0.0; equality and hashing both
    /// go through this so they agree.
    fn canonical_bits(&self) -> [u32; 4] {
        [self.left, self.top, self.right, self.bottom].map(|v| (v + 0.0).to_bits())
    }
}

impl PartialEq for Roi {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bits() == other.canonical_bits()
    }
}

impl Eq for Roi {}

impl Hash for Roi {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state);
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}%,{}% → {}%,{}%]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// What a condition looks for in a frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DetectionKind {
    /// Presence of an object category (e.g. "person")
    Presence(String),
    /// Motion intensity
    Motion,
}

impl From<String> for DetectionKind {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("motion") {
            Self::Motion
        } else {
            Self::Presence(value)
        }
    }
}

impl From<DetectionKind> for String {
    fn from(kind: DetectionKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presence(category) => f.write_str(category),
            Self::Motion => f.write_str("motion"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Presence,
    Absence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
        }
    }
}

/// A configured camera after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub id: String,
    pub url: String,
    pub roi: Option<Roi>,
    pub motion_threshold: f64,
    /// Multiplier applied to the debounce enter threshold
    pub strictness: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub sensor: String,
    pub kind: DetectionKind,
    pub polarity: Polarity,
    /// How this condition combines with the result so far (ignored on the first)
    pub operator: Operator,
    /// Overrides the sensor's ROI when set
    pub roi: Option<Roi>,
}

impl Condition {
    pub fn signal_key(&self) -> SignalKey {
        SignalKey {
            sensor: self.sensor.clone(),
            kind: self.kind.clone(),
            region: self.roi,
        }
    }

    pub fn is_satisfied_by(&self, stabilized: bool) -> bool {
        match self.polarity {
            Polarity::Presence => stabilized,
            Polarity::Absence => !stabilized,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub conditions: Vec<Condition>,
    pub scene: String,
}

/// Unit of smoothing: one detection kind on one sensor. Conditions that
/// override the ROI get their own key, since they observe a different region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalKey {
    pub sensor: String,
    pub kind: DetectionKind,
    pub region: Option<Roi>,
}

impl SignalKey {
    pub fn new(sensor: impl Into<String>, kind: DetectionKind) -> Self {
        Self {
            sensor: sensor.into(),
            kind,
            region: None,
        }
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(roi) => write!(f, "{}_{}{}", self.sensor, self.kind, roi),
            None => write!(f, "{}_{}", self.sensor, self.kind),
        }
    }
}

/// RGB8 frame, row-major, 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    /// Monotonic per-sensor sequence number (starts at 1)
    pub sequence: u64,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Self {
        Self {
            data,
            width,
            height,
            sequence: 0,
            timestamp_ms: 0.0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() >= self.width * self.height * 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionReading {
    pub detected: bool,
    pub score: f64,
    pub contour_count: usize,
}

impl MotionReading {
    pub fn none() -> Self {
        Self {
            detected: false,
            score: 0.0,
            contour_count: 0,
        }
    }
}

/// One raw per-frame observation, before smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawObservation {
    Presence { detected: bool },
    Motion(MotionReading),
}

impl RawObservation {
    /// The "no detection" observation for a kind.
    pub fn negative(kind: &DetectionKind) -> Self {
        match kind {
            DetectionKind::Presence(_) => Self::Presence { detected: false },
            DetectionKind::Motion => Self::Motion(MotionReading::none()),
        }
    }

    /// Boolean fed into smoothing.
    pub fn is_positive(&self) -> bool {
        match self {
            Self::Presence { detected } => *detected,
            Self::Motion(reading) => reading.detected,
        }
    }
}
