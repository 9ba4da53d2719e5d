// src/extraction/extractor.rs
//
// Turns one fresh frame into one raw observation for a signal key. Presence
// goes through the object detector, motion through a per-key scorer.

use super::detector::ObjectDetector;
use super::motion::{build_scorer, MotionScorer};
use super::roi::crop;
use crate::error::ExtractionError;
use crate::types::{DetectionKind, Frame, MotionConfig, RawObservation, Roi, Sensor, SignalKey};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Result of one extraction. On failure the observation is the negative one
/// for the key's kind and `error` says why.
#[derive(Debug)]
pub struct Extraction {
    pub observation: RawObservation,
    pub error: Option<ExtractionError>,
}

impl Extraction {
    fn ok(observation: RawObservation) -> Self {
        Self {
            observation,
            error: None,
        }
    }

    fn failed(kind: &DetectionKind, error: ExtractionError) -> Self {
        Self {
            observation: RawObservation::negative(kind),
            error: Some(error),
        }
    }
}

pub struct SignalExtractor {
    detector: Option<Arc<dyn ObjectDetector>>,
    confidence_threshold: f32,
    motion: MotionConfig,
    scorers: HashMap<SignalKey, Box<dyn MotionScorer>>,
    /// Detector results for the current tick, keyed by (sensor, region).
    /// Several categories on the same view share one inference.
    detections: HashMap<(String, Option<Roi>), BTreeSet<String>>,
}

impl SignalExtractor {
    pub fn new(
        detector: Option<Arc<dyn ObjectDetector>>,
        confidence_threshold: f32,
        motion: MotionConfig,
    ) -> Self {
        Self {
            detector,
            confidence_threshold,
            motion,
            scorers: HashMap::new(),
            detections: HashMap::new(),
        }
    }

    /// Forget the previous tick's detector results.
    pub fn begin_tick(&mut self) {
        self.detections.clear();
    }

    pub async fn extract(&mut self, key: &SignalKey, sensor: &Sensor, frame: &Frame) -> Extraction {
        let region = key.region.or(sensor.roi);
        let view = match crop(frame, region.as_ref()) {
            Ok(view) => view,
            Err(e) => return Extraction::failed(&key.kind, e),
        };

        match &key.kind {
            DetectionKind::Presence(category) => {
                let cache_key = (sensor.id.clone(), region);
                if let Some(found) = self.detections.get(&cache_key) {
                    return Extraction::ok(RawObservation::Presence {
                        detected: found.contains(category),
                    });
                }

                let Some(detector) = &self.detector else {
                    return Extraction::failed(&key.kind, ExtractionError::NoDetector);
                };

                match detector.detect(&view, self.confidence_threshold).await {
                    Ok(found) => {
                        debug!("{}: detected {:?}", key, found);
                        let detected = found.contains(category);
                        self.detections.insert(cache_key, found);
                        Extraction::ok(RawObservation::Presence { detected })
                    }
                    Err(e) => Extraction::failed(&key.kind, e),
                }
            }
            DetectionKind::Motion => {
                let scorer = self
                    .scorers
                    .entry(key.clone())
                    .or_insert_with(|| build_scorer(&self.motion));

                match scorer.score(&view, sensor.motion_threshold) {
                    Ok(reading) => Extraction::ok(RawObservation::Motion(reading)),
                    Err(e) => Extraction::failed(&key.kind, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedDetector {
        labels: Vec<&'static str>,
        calls: AtomicUsize,
        /// (width, height) of every frame handed to the detector
        sizes: Mutex<Vec<(usize, usize)>>,
        fail: bool,
    }

    impl FixedDetector {
        fn new(labels: Vec<&'static str>) -> Self {
            Self {
                labels,
                calls: AtomicUsize::new(0),
                sizes: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ObjectDetector for FixedDetector {
        async fn detect(
            &self,
            frame: &Frame,
            _confidence_threshold: f32,
        ) -> Result<BTreeSet<String>, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sizes.lock().unwrap().push((frame.width, frame.height));
            if self.fail {
                return Err(ExtractionError::detector("model crashed"));
            }
            Ok(self.labels.iter().map(|s| s.to_string()).collect())
        }
    }

    fn sensor(roi: Option<Roi>) -> Sensor {
        Sensor {
            id: "desk".to_string(),
            url: "0".to_string(),
            roi,
            motion_threshold: 100.0,
            strictness: 1.0,
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 10 * 10 * 3], 10, 10)
    }

    fn presence(category: &str) -> SignalKey {
        SignalKey::new("desk", DetectionKind::Presence(category.to_string()))
    }

    #[tokio::test]
    async fn test_presence_shares_one_inference_per_tick() {
        let detector = Arc::new(FixedDetector::new(vec!["person"]));
        let mut extractor = SignalExtractor::new(
            Some(detector.clone() as Arc<dyn ObjectDetector>),
            0.6,
            MotionConfig::default(),
        );

        let s = sensor(None);
        let person = extractor.extract(&presence("person"), &s, &frame()).await;
        let cat = extractor.extract(&presence("cat"), &s, &frame()).await;

        assert!(person.observation.is_positive());
        assert!(!cat.observation.is_positive());
        assert!(cat.error.is_none());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

        extractor.begin_tick();
        extractor.extract(&presence("person"), &s, &frame()).await;
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_region_override_is_a_separate_inference() {
        let detector = Arc::new(FixedDetector::new(vec!["person"]));
        let mut extractor = SignalExtractor::new(
            Some(detector.clone() as Arc<dyn ObjectDetector>),
            0.6,
            MotionConfig::default(),
        );

        let s = sensor(None);
        let mut left = presence("person");
        left.region = Some(Roi::new(0.0, 0.0, 50.0, 100.0));

        extractor.extract(&presence("person"), &s, &frame()).await;
        extractor.extract(&left, &s, &frame()).await;
        assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_condition_region_beats_sensor_region() {
        let detector = Arc::new(FixedDetector::new(vec!["person"]));
        let mut extractor = SignalExtractor::new(
            Some(detector.clone() as Arc<dyn ObjectDetector>),
            0.6,
            MotionConfig::default(),
        );

        // Sensor keeps the left half; the condition asks for the top 30%
        let s = sensor(Some(Roi::new(0.0, 0.0, 50.0, 100.0)));
        let mut top = presence("person");
        top.region = Some(Roi::new(0.0, 0.0, 100.0, 30.0));

        extractor.extract(&presence("person"), &s, &frame()).await;
        extractor.extract(&top, &s, &frame()).await;

        assert_eq!(*detector.sizes.lock().unwrap(), vec![(5, 10), (10, 3)]);
    }

    #[tokio::test]
    async fn test_failures_yield_negative_observation() {
        let mut detector = FixedDetector::new(vec!["person"]);
        detector.fail = true;
        let mut extractor =
            SignalExtractor::new(Some(Arc::new(detector)), 0.6, MotionConfig::default());

        let result = extractor.extract(&presence("person"), &sensor(None), &frame()).await;
        assert_eq!(result.observation, RawObservation::Presence { detected: false });
        assert!(matches!(result.error, Some(ExtractionError::Detector(_))));

        // ROI too small for a 10x10 frame
        let tiny = sensor(Some(Roi::new(0.0, 0.0, 5.0, 5.0)));
        let result = extractor
            .extract(&SignalKey::new("desk", DetectionKind::Motion), &tiny, &frame())
            .await;
        assert_eq!(result.observation, RawObservation::Motion(crate::types::MotionReading::none()));
        assert!(matches!(result.error, Some(ExtractionError::EmptyRegion { .. })));
    }

    #[tokio::test]
    async fn test_presence_without_detector() {
        let mut extractor = SignalExtractor::new(None, 0.6, MotionConfig::default());
        let result = extractor.extract(&presence("person"), &sensor(None), &frame()).await;
        assert!(!result.observation.is_positive());
        assert!(matches!(result.error, Some(ExtractionError::NoDetector)));
    }

    #[tokio::test]
    async fn test_motion_scorers_are_per_key() {
        let mut extractor = SignalExtractor::new(None, 0.6, MotionConfig::default());
        let s = sensor(None);
        let key = SignalKey::new("desk", DetectionKind::Motion);

        let first = extractor.extract(&key, &s, &frame()).await;
        assert!(first.error.is_none());
        assert_eq!(extractor.scorers.len(), 1);

        extractor.extract(&key, &s, &frame()).await;
        assert_eq!(extractor.scorers.len(), 1);
    }
}
