// src/capture/video_capture.rs

use super::grabber::FrameGrabber;
use crate::error::CaptureError;
use crate::types::Frame;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::{debug, info, warn};

/// Consecutive read failures before the capture is reopened
const REOPEN_AFTER_FAILURES: u32 = 30;

/// OpenCV-backed grabber for streams (RTSP/HTTP), video files and
/// device indices ("0", "1", ...).
pub struct VideoCaptureGrabber {
    url: String,
    cap: VideoCapture,
    consecutive_failures: u32,
}

impl VideoCaptureGrabber {
    pub fn open(url: &str) -> Result<Self, CaptureError> {
        let cap = open_capture(url)?;
        Ok(Self {
            url: url.to_string(),
            cap,
            consecutive_failures: 0,
        })
    }

    fn reopen(&mut self) {
        let _ = self.cap.release();
        match open_capture(&self.url) {
            Ok(cap) => {
                info!("Reopened capture {}", self.url);
                self.cap = cap;
            }
            Err(e) => warn!("Reopen of {} failed: {}", self.url, e),
        }
    }
}

fn open_capture(url: &str) -> Result<VideoCapture, CaptureError> {
    let open_err = |message: String| CaptureError::Open {
        url: url.to_string(),
        message,
    };

    let cap = match url.parse::<i32>() {
        Ok(index) => VideoCapture::new(index, videoio::CAP_ANY),
        Err(_) => VideoCapture::from_file(url, videoio::CAP_ANY),
    }
    .map_err(|e| open_err(e.to_string()))?;

    if !cap.is_opened().map_err(|e| open_err(e.to_string()))? {
        return Err(open_err("capture did not open".to_string()));
    }

    let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
    let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
    let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS).unwrap_or(0.0);
    debug!(
        "Capture {} opened: {}x{} @ {:.1} FPS",
        url, width as i32, height as i32, fps
    );

    Ok(cap)
}

impl FrameGrabber for VideoCaptureGrabber {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        let mut mat = Mat::default();

        let ok = VideoCaptureTrait::read(&mut self.cap, &mut mat)
            .map_err(|e| CaptureError::Read(e.to_string()))?;

        if !ok || mat.empty() {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= REOPEN_AFTER_FAILURES {
                self.consecutive_failures = 0;
                self.reopen();
            }
            return Err(CaptureError::Empty);
        }
        self.consecutive_failures = 0;

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;

        let data = rgb_mat
            .data_bytes()
            .map_err(|e| CaptureError::Decode(e.to_string()))?
            .to_vec();

        Ok(Frame::new(
            data,
            rgb_mat.cols() as usize,
            rgb_mat.rows() as usize,
        ))
    }

    fn release(&mut self) {
        if let Err(e) = self.cap.release() {
            warn!("Failed to release capture {}: {}", self.url, e);
        }
    }
}
