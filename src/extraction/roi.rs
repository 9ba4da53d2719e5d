// src/extraction/roi.rs

use crate::error::ExtractionError;
use crate::types::{Frame, Roi};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Map percentage bounds onto a frame's pixel grid. Edges are truncated
/// toward zero and clamped to the frame. `None` if nothing remains.
pub fn pixel_rect(roi: &Roi, frame_width: usize, frame_height: usize) -> Option<PixelRect> {
    let to_px = |pct: f32, extent: usize| -> usize {
        ((pct.clamp(0.0, 100.0) / 100.0 * extent as f32) as usize).min(extent)
    };

    let x0 = to_px(roi.left, frame_width);
    let x1 = to_px(roi.right, frame_width);
    let y0 = to_px(roi.top, frame_height);
    let y1 = to_px(roi.bottom, frame_height);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(PixelRect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Restrict a frame to a region. Without a region the caller's frame is
/// borrowed as-is; with one, a new frame is built and the input is never
/// touched.
pub fn crop<'a>(frame: &'a Frame, roi: Option<&Roi>) -> Result<Cow<'a, Frame>, ExtractionError> {
    let Some(roi) = roi else {
        return Ok(Cow::Borrowed(frame));
    };

    let rect = pixel_rect(roi, frame.width, frame.height).ok_or(ExtractionError::EmptyRegion {
        width: frame.width,
        height: frame.height,
    })?;

    if rect.x == 0 && rect.y == 0 && rect.width == frame.width && rect.height == frame.height {
        return Ok(Cow::Borrowed(frame));
    }

    let src_stride = frame.width * 3;
    let row_bytes = rect.width * 3;
    let mut data = Vec::with_capacity(row_bytes * rect.height);

    for row in rect.y..rect.y + rect.height {
        let start = row * src_stride + rect.x * 3;
        data.extend_from_slice(&frame.data[start..start + row_bytes]);
    }

    Ok(Cow::Owned(Frame {
        data,
        width: rect.width,
        height: rect.height,
        sequence: frame.sequence,
        timestamp_ms: frame.timestamp_ms,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Frame {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        Frame::new(data, width, height)
    }

    #[test]
    fn test_pixel_rect_truncates() {
        // 33.3% of 100 = 33.3 → 33; 66.7% → 66
        let rect = pixel_rect(&Roi::new(33.3, 10.0, 66.7, 50.0), 100, 10).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 33,
                y: 1,
                width: 33,
                height: 4
            }
        );
    }

    #[test]
    fn test_pixel_rect_degenerate_on_tiny_frames() {
        assert!(pixel_rect(&Roi::new(10.0, 10.0, 20.0, 20.0), 4, 4).is_none());
    }

    #[test]
    fn test_crop_copies_region_and_keeps_input() {
        let frame = gradient(10, 10);
        let before = frame.data.clone();

        let cropped = crop(&frame, Some(&Roi::new(50.0, 20.0, 100.0, 40.0))).unwrap();
        assert_eq!((cropped.width, cropped.height), (5, 2));
        // Top-left pixel of the crop is (x=5, y=2) in the source
        assert_eq!(&cropped.data[..3], &[5, 2, 0]);
        assert_eq!(cropped.data.len(), 5 * 2 * 3);

        assert_eq!(frame.data, before);
        assert_eq!((frame.width, frame.height), (10, 10));
    }

    #[test]
    fn test_no_roi_borrows() {
        let frame = gradient(4, 4);
        assert!(matches!(crop(&frame, None).unwrap(), Cow::Borrowed(_)));
        let full = Roi::new(0.0, 0.0, 100.0, 100.0);
        assert!(matches!(crop(&frame, Some(&full)).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_empty_region_is_an_error() {
        let frame = gradient(4, 4);
        let result = crop(&frame, Some(&Roi::new(10.0, 10.0, 20.0, 20.0)));
        assert!(matches!(result, Err(ExtractionError::EmptyRegion { .. })));
    }
}
