// src/extraction/mod.rs

pub mod detector;
pub mod extractor;
pub mod motion;
pub mod roi;
pub mod yolo;

pub use detector::ObjectDetector;
pub use extractor::{Extraction, SignalExtractor};
pub use motion::{build_scorer, MotionScorer, PairScorer};
