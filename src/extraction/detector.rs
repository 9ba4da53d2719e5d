// src/extraction/detector.rs

use crate::error::ExtractionError;
use crate::types::Frame;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// External object detector: the set of category labels found in a frame
/// with confidence above the threshold.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(
        &self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<BTreeSet<String>, ExtractionError>;
}
