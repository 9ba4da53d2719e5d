// src/extraction/motion.rs
//
// Motion scoring. Two interfaces are supported:
//   - MotionScorer: one frame in, one reading out (the scorer keeps its own
//     model, e.g. a background estimate)
//   - PairScorer:   previous + current frame in, a number out; wrapped by
//     PairDifferencing to become a MotionScorer
//
// Both built-in scorers are pure Rust and work on grayscale pixel data.

use crate::error::ExtractionError;
use crate::preprocessing::{to_grayscale, GrayFrame};
use crate::types::{Frame, MotionConfig, MotionReading, MotionScorerKind};

/// Intensity assigned to a foreground pixel when summing the motion mask
const MASK_VALUE: f64 = 255.0;

pub trait MotionScorer: Send {
    /// Score one frame. `threshold` is the pass/fail level on the score.
    fn score(&mut self, frame: &Frame, threshold: f64) -> Result<MotionReading, ExtractionError>;
}

pub trait PairScorer: Send {
    fn score_pair(&self, previous: &GrayFrame, current: &GrayFrame)
        -> Result<f64, ExtractionError>;
}

/// Build the configured scorer. One instance per signal key, since scorers
/// carry per-stream state.
pub fn build_scorer(config: &MotionConfig) -> Box<dyn MotionScorer> {
    match config.scorer {
        MotionScorerKind::BackgroundModel => Box::new(BackgroundModelScorer::new(config)),
        MotionScorerKind::FrameDifference => Box::new(PairDifferencing::new(
            PixelDifference {
                pixel_threshold: config.pixel_threshold,
            },
            config.warmup_frames,
        )),
    }
}

// ============================================================================
// FRAME-PAIR DIFFERENCING
// ============================================================================

/// Counts pixels whose intensity changed by more than `pixel_threshold`.
/// Score = changed pixels × 255.
pub struct PixelDifference {
    pub pixel_threshold: u8,
}

impl PairScorer for PixelDifference {
    fn score_pair(
        &self,
        previous: &GrayFrame,
        current: &GrayFrame,
    ) -> Result<f64, ExtractionError> {
        if previous.width != current.width || previous.height != current.height {
            return Err(ExtractionError::motion(format!(
                "frame size changed from {}x{} to {}x{}",
                previous.width, previous.height, current.width, current.height
            )));
        }

        let changed = previous
            .data
            .iter()
            .zip(&current.data)
            .filter(|(a, b)| a.abs_diff(**b) > self.pixel_threshold)
            .count();

        Ok(changed as f64 * MASK_VALUE)
    }
}

/// Adapts a PairScorer to the single-frame interface by remembering the
/// previous frame.
pub struct PairDifferencing<P> {
    scorer: P,
    previous: Option<GrayFrame>,
    warmup_frames: u32,
    frames_seen: u32,
}

impl<P: PairScorer> PairDifferencing<P> {
    pub fn new(scorer: P, warmup_frames: u32) -> Self {
        Self {
            scorer,
            previous: None,
            warmup_frames,
            frames_seen: 0,
        }
    }
}

impl<P: PairScorer> MotionScorer for PairDifferencing<P> {
    fn score(&mut self, frame: &Frame, threshold: f64) -> Result<MotionReading, ExtractionError> {
        let current = to_grayscale(&frame.data, frame.width, frame.height);
        self.frames_seen = self.frames_seen.saturating_add(1);

        let previous = match self.previous.take() {
            Some(prev) if prev.width == current.width && prev.height == current.height => prev,
            _ => {
                // First frame, or the stream changed resolution: restart
                self.previous = Some(current);
                self.frames_seen = 1;
                return Ok(MotionReading::none());
            }
        };

        let result = self.scorer.score_pair(&previous, &current);
        self.previous = Some(current);
        let score = result?;

        Ok(MotionReading {
            detected: score > threshold && self.frames_seen >= self.warmup_frames,
            score,
            contour_count: 0,
        })
    }
}

// ============================================================================
// BACKGROUND MODEL
// ============================================================================

/// Running-average background subtraction with blob counting.
pub struct BackgroundModelScorer {
    background: Vec<f32>,
    width: usize,
    height: usize,
    learning_rate: f32,
    pixel_threshold: u8,
    min_area: usize,
    warmup_frames: u32,
    frames_seen: u32,
}

impl BackgroundModelScorer {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            background: Vec::new(),
            width: 0,
            height: 0,
            learning_rate: config.learning_rate.clamp(0.0, 1.0),
            pixel_threshold: config.pixel_threshold,
            min_area: config.min_area,
            warmup_frames: config.warmup_frames,
            frames_seen: 0,
        }
    }

    fn reset(&mut self, gray: &GrayFrame) {
        self.background = gray.data.iter().map(|&v| v as f32).collect();
        self.width = gray.width;
        self.height = gray.height;
        self.frames_seen = 1;
    }
}

impl MotionScorer for BackgroundModelScorer {
    fn score(&mut self, frame: &Frame, threshold: f64) -> Result<MotionReading, ExtractionError> {
        let gray = to_grayscale(&frame.data, frame.width, frame.height);
        if gray.pixel_count() == 0 {
            return Err(ExtractionError::motion("empty frame"));
        }

        if self.background.len() != gray.pixel_count()
            || self.width != gray.width
            || self.height != gray.height
        {
            self.reset(&gray);
            return Ok(MotionReading::none());
        }
        self.frames_seen = self.frames_seen.saturating_add(1);

        let threshold_px = self.pixel_threshold as f32;
        let alpha = self.learning_rate;
        let mut mask = vec![false; gray.pixel_count()];
        let mut foreground = 0usize;

        for (i, (&px, bg)) in gray.data.iter().zip(self.background.iter_mut()).enumerate() {
            let value = px as f32;
            if (value - *bg).abs() > threshold_px {
                mask[i] = true;
                foreground += 1;
            }
            *bg += alpha * (value - *bg);
        }

        let score = foreground as f64 * MASK_VALUE;
        let contour_count = count_blobs(&mask, gray.width, gray.height, self.min_area);
        let mut detected = score > threshold || contour_count > 0;

        // Let the background settle before trusting it
        if self.frames_seen < self.warmup_frames {
            detected = false;
        }

        Ok(MotionReading {
            detected,
            score,
            contour_count,
        })
    }
}

/// Number of 4-connected foreground regions larger than `min_area` pixels.
pub fn count_blobs(mask: &[bool], width: usize, height: usize, min_area: usize) -> usize {
    let mut visited = vec![false; mask.len()];
    let mut stack = Vec::new();
    let mut blobs = 0;

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        visited[start] = true;
        stack.push(start);
        let mut area = 0usize;

        while let Some(idx) = stack.pop() {
            area += 1;
            let x = idx % width;
            let y = idx / width;

            let mut visit = |n: usize| {
                if mask[n] && !visited[n] {
                    visited[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < width {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - width);
            }
            if y + 1 < height {
                visit(idx + width);
            }
        }

        if area > min_area {
            blobs += 1;
        }
    }

    blobs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize, value: u8) -> Frame {
        Frame::new(vec![value; width * height * 3], width, height)
    }

    /// Dark frame with a bright square in the top-left corner
    fn with_square(width: usize, height: usize, side: usize) -> Frame {
        let mut frame = solid(width, height, 0);
        for y in 0..side {
            for x in 0..side {
                let i = (y * width + x) * 3;
                frame.data[i..i + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        frame
    }

    fn config(warmup_frames: u32) -> MotionConfig {
        MotionConfig {
            pixel_threshold: 25,
            min_area: 50,
            warmup_frames,
            learning_rate: 0.05,
            ..MotionConfig::default()
        }
    }

    #[test]
    fn test_count_blobs() {
        #[rustfmt::skip]
        let mask = [
            true,  true,  false, false,
            true,  false, false, true,
            false, false, false, true,
            false, true,  false, false,
        ];
        assert_eq!(count_blobs(&mask, 4, 4, 0), 3);
        // Only the 3-pixel blob is larger than 2
        assert_eq!(count_blobs(&mask, 4, 4, 2), 1);
    }

    #[test]
    fn test_background_model_detects_new_object() {
        let mut scorer = BackgroundModelScorer::new(&config(3));
        let still = solid(40, 40, 0);

        for _ in 0..5 {
            let reading = scorer.score(&still, 20_000.0).unwrap();
            assert!(!reading.detected);
            assert_eq!(reading.score, 0.0);
        }

        let reading = scorer.score(&with_square(40, 40, 10), 20_000.0).unwrap();
        assert_eq!(reading.score, 100.0 * 255.0);
        assert_eq!(reading.contour_count, 1);
        assert!(reading.detected);
    }

    #[test]
    fn test_background_model_warmup_suppresses_detection() {
        let mut scorer = BackgroundModelScorer::new(&config(10));
        scorer.score(&solid(40, 40, 0), 1.0).unwrap();

        let reading = scorer.score(&with_square(40, 40, 10), 1.0).unwrap();
        assert!(reading.score > 0.0);
        assert!(!reading.detected);
    }

    #[test]
    fn test_pair_differencing_scores_changes() {
        let mut scorer = PairDifferencing::new(PixelDifference { pixel_threshold: 25 }, 1);

        let first = scorer.score(&solid(20, 20, 0), 1000.0).unwrap();
        assert_eq!(first, MotionReading::none());

        let second = scorer.score(&with_square(20, 20, 5), 1000.0).unwrap();
        assert_eq!(second.score, 25.0 * 255.0);
        assert!(second.detected);

        // Same frame again: nothing changed
        let third = scorer.score(&with_square(20, 20, 5), 1000.0).unwrap();
        assert_eq!(third.score, 0.0);
        assert!(!third.detected);
    }

    #[test]
    fn test_resolution_change_restarts_model() {
        let mut scorer = PairDifferencing::new(PixelDifference { pixel_threshold: 25 }, 1);
        scorer.score(&solid(20, 20, 0), 0.0).unwrap();
        let reading = scorer.score(&solid(10, 10, 255), 0.0).unwrap();
        assert_eq!(reading, MotionReading::none());
    }

    #[test]
    fn test_build_scorer_follows_config() {
        let mut cfg = config(1);
        cfg.scorer = MotionScorerKind::FrameDifference;
        let mut scorer = build_scorer(&cfg);
        scorer.score(&solid(8, 8, 0), 0.0).unwrap();
        assert!(scorer.score(&solid(8, 8, 200), 0.0).unwrap().detected);
    }
}
