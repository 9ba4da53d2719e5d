// src/error.rs
//
// Error types for each stage of the pipeline. Only configuration errors are
// fatal; everything else is logged by the evaluation loop and absorbed.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("camera '{sensor}' has an invalid ROI {roi}: need 0 <= left < right <= 100 and 0 <= top < bottom <= 100")]
    InvalidRoi { sensor: String, roi: String },

    #[error("no cameras configured")]
    NoSensors,

    #[error("backend '{0}' requires a url")]
    MissingBackendUrl(String),

    #[error("backend url '{0}' must be http:// or https:// (point it at the obs-websocket HTTP bridge)")]
    UnsupportedBackendUrl(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open source {url}: {message}")]
    Open { url: String, message: String },

    #[error("failed to read frame: {0}")]
    Read(String),

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("source returned an empty frame")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("object detector failed: {0}")]
    Detector(String),

    #[error("motion scorer failed: {0}")]
    Motion(String),

    #[error("region of interest is empty for a {width}x{height} frame")]
    EmptyRegion { width: usize, height: usize },

    #[error("no object detector configured")]
    NoDetector,
}

impl ExtractionError {
    pub fn detector(message: impl Into<String>) -> Self {
        Self::Detector(message.into())
    }

    pub fn motion(message: impl Into<String>) -> Self {
        Self::Motion(message.into())
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Malformed(String),

    #[error("backend rejected the request: {0}")]
    Rejected(String),
}

pub type BackendResult<T> = Result<T, BackendError>;
