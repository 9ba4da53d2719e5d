// src/extraction/yolo.rs
//
// YOLOv8 object detection. Letterboxing and output decoding are plain Rust;
// the ONNX Runtime session is only compiled with the `onnx` feature.

use crate::preprocessing::resize_bilinear;

pub const YOLO_INPUT_SIZE: usize = 640;
const LETTERBOX_FILL: u8 = 114;

#[rustfmt::skip]
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in original image coordinates
    pub confidence: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn label(&self) -> &'static str {
        COCO_CLASSES.get(self.class_id).copied().unwrap_or("unknown")
    }
}

/// Model input plus the transform needed to map boxes back.
pub struct Letterbox {
    pub input: Vec<f32>,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

/// Fit the frame inside a square canvas (aspect preserved, gray padding),
/// normalize to [0, 1] and convert HWC → CHW.
pub fn letterbox(src: &[u8], src_w: usize, src_h: usize, target_size: usize) -> Letterbox {
    let scale = (target_size as f32 / src_w as f32).min(target_size as f32 / src_h as f32);
    let scaled_w = ((src_w as f32 * scale) as usize).clamp(1, target_size);
    let scaled_h = ((src_h as f32 * scale) as usize).clamp(1, target_size);

    let pad_x = (target_size - scaled_w) as f32 / 2.0;
    let pad_y = (target_size - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);
    let mut canvas = vec![LETTERBOX_FILL; target_size * target_size * 3];

    for y in 0..scaled_h {
        let dst_y = y + pad_y as usize;
        let src_row = y * scaled_w * 3;
        let dst_row = (dst_y * target_size + pad_x as usize) * 3;
        canvas[dst_row..dst_row + scaled_w * 3]
            .copy_from_slice(&resized[src_row..src_row + scaled_w * 3]);
    }

    let plane = target_size * target_size;
    let mut input = vec![0.0f32; 3 * plane];
    for (i, px) in canvas.chunks_exact(3).enumerate() {
        for c in 0..3 {
            input[c * plane + i] = px[c] as f32 / 255.0;
        }
    }

    Letterbox {
        input,
        scale,
        pad_x,
        pad_y,
    }
}

/// Decode a `[1, 4 + classes, N]` YOLOv8 output into boxes above the
/// confidence threshold, then apply NMS.
pub fn decode(
    output: &[f32],
    num_classes: usize,
    transform: &Letterbox,
    conf_thresh: f32,
    iou_thresh: f32,
) -> Vec<Detection> {
    let stride = 4 + num_classes;
    if output.len() < stride {
        return Vec::new();
    }
    let n = output.len() / stride;
    let mut detections = Vec::new();

    for i in 0..n {
        let cx = output[i];
        let cy = output[n + i];
        let w = output[n * 2 + i];
        let h = output[n * 3 + i];

        let mut max_conf = 0.0f32;
        let mut best_class = 0;
        for c in 0..num_classes {
            let conf = output[n * (4 + c) + i];
            if conf > max_conf {
                max_conf = conf;
                best_class = c;
            }
        }

        if max_conf < conf_thresh {
            continue;
        }

        // Center → corners, then undo the letterbox
        let unmap_x = |x: f32| (x - transform.pad_x) / transform.scale;
        let unmap_y = |y: f32| (y - transform.pad_y) / transform.scale;

        detections.push(Detection {
            bbox: [
                unmap_x(cx - w / 2.0),
                unmap_y(cy - h / 2.0),
                unmap_x(cx + w / 2.0),
                unmap_y(cy + h / 2.0),
            ],
            confidence: max_conf,
            class_id: best_class,
        });
    }

    nms(detections, iou_thresh)
}

/// Class-aware non-maximum suppression.
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        let suppressed = keep.iter().any(|k| {
            k.class_id == det.class_id && calculate_iou(&k.bbox, &det.bbox) >= iou_threshold
        });
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(feature = "onnx")]
pub use session::YoloDetector;

#[cfg(feature = "onnx")]
mod session {
    use super::{decode, letterbox, COCO_CLASSES, YOLO_INPUT_SIZE};
    use crate::error::ExtractionError;
    use crate::extraction::detector::ObjectDetector;
    use crate::types::{DetectionConfig, Frame};
    use async_trait::async_trait;
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};
    use tracing::{debug, info};

    pub struct YoloDetector {
        session: Arc<Mutex<Session>>,
        iou_threshold: f32,
    }

    impl YoloDetector {
        pub fn new(config: &DetectionConfig) -> anyhow::Result<Self> {
            info!("Loading YOLO model: {}", config.model_path);

            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(config.num_threads)?
                .commit_from_file(&config.model_path)?;

            info!("✓ YOLO detector initialized");
            Ok(Self {
                session: Arc::new(Mutex::new(session)),
                iou_threshold: config.iou_threshold,
            })
        }
    }

    fn infer(session: &Mutex<Session>, input: Vec<f32>) -> Result<Vec<f32>, ExtractionError> {
        let shape = [1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE];
        let input_value = ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))
            .map_err(|e| ExtractionError::detector(e.to_string()))?;

        let mut session = session
            .lock()
            .map_err(|_| ExtractionError::detector("session lock poisoned"))?;
        let outputs = session
            .run(ort::inputs!["images" => input_value])
            .map_err(|e| ExtractionError::detector(e.to_string()))?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractionError::detector(e.to_string()))?;

        Ok(data.to_vec())
    }

    #[async_trait]
    impl ObjectDetector for YoloDetector {
        async fn detect(
            &self,
            frame: &Frame,
            confidence_threshold: f32,
        ) -> Result<BTreeSet<String>, ExtractionError> {
            let session = Arc::clone(&self.session);
            let iou_threshold = self.iou_threshold;
            let data = frame.data.clone();
            let (width, height) = (frame.width, frame.height);

            let detections = tokio::task::spawn_blocking(move || {
                let transform = letterbox(&data, width, height, YOLO_INPUT_SIZE);
                let output = infer(&session, transform.input.clone())?;
                Ok::<_, ExtractionError>(decode(
                    &output,
                    COCO_CLASSES.len(),
                    &transform,
                    confidence_threshold,
                    iou_threshold,
                ))
            })
            .await
            .map_err(|e| ExtractionError::detector(format!("inference task failed: {}", e)))??;

            debug!("Detected {} objects", detections.len());
            Ok(detections.iter().map(|d| d.label().to_string()).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a [1, 4 + classes, n] output from (cx, cy, w, h, class, conf) rows
    fn output(rows: &[(f32, f32, f32, f32, usize, f32)], classes: usize) -> Vec<f32> {
        let n = rows.len();
        let mut out = vec![0.0; (4 + classes) * n];
        for (i, &(cx, cy, w, h, class, conf)) in rows.iter().enumerate() {
            out[i] = cx;
            out[n + i] = cy;
            out[2 * n + i] = w;
            out[3 * n + i] = h;
            out[(4 + class) * n + i] = conf;
        }
        out
    }

    #[test]
    fn test_letterbox_pads_wide_frames() {
        let frame = vec![255u8; 64 * 32 * 3];
        let lb = letterbox(&frame, 64, 32, 64);
        assert_eq!(lb.scale, 1.0);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 16.0);

        let plane = 64 * 64;
        // Top row is padding, middle row is image
        assert!((lb.input[0] - 114.0 / 255.0).abs() < 1e-6);
        assert!((lb.input[32 * 64] - 1.0).abs() < 1e-6);
        assert_eq!(lb.input.len(), 3 * plane);
    }

    #[test]
    fn test_decode_maps_boxes_back_and_filters() {
        let transform = Letterbox {
            input: Vec::new(),
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 10.0,
        };
        let out = output(
            &[
                (50.0, 60.0, 20.0, 20.0, 0, 0.9),
                (10.0, 10.0, 4.0, 4.0, 1, 0.2),
            ],
            3,
        );

        let dets = decode(&out, 3, &transform, 0.5, 0.45);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label(), "person");
        assert_eq!(dets[0].bbox, [80.0, 80.0, 120.0, 120.0]);
    }

    #[test]
    fn test_nms_is_per_class() {
        let a = Detection {
            bbox: [0.0, 0.0, 10.0, 10.0],
            confidence: 0.9,
            class_id: 0,
        };
        let b = Detection {
            confidence: 0.8,
            ..a.clone()
        };
        let c = Detection {
            class_id: 56,
            confidence: 0.7,
            ..a.clone()
        };

        let kept = nms(vec![b, c, a], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].label(), "chair");
    }

    #[test]
    fn test_iou() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [5.0, 0.0, 15.0, 10.0];
        assert!((calculate_iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(calculate_iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    }
}
