// src/capture/grabber.rs

use crate::error::CaptureError;
use crate::types::{Frame, Sensor};
use std::path::{Path, PathBuf};
use tracing::info;

const STILL_IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// Acquisition handle for one sensor. Called repeatedly from the sensor's
/// own thread; the returned frame's sequence/timestamp are assigned by the
/// caller.
pub trait FrameGrabber: Send + 'static {
    fn grab(&mut self) -> Result<Frame, CaptureError>;

    /// Release the underlying device/stream. Called once on shutdown.
    fn release(&mut self) {}
}

impl<F> FrameGrabber for F
where
    F: FnMut() -> Result<Frame, CaptureError> + Send + 'static,
{
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        self()
    }
}

/// Re-reads a still image from disk on every attempt. Suits cameras that
/// drop periodic snapshots into a file.
pub struct ImageFileGrabber {
    path: PathBuf,
}

impl ImageFileGrabber {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameGrabber for ImageFileGrabber {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        let img = image::open(&self.path)
            .map_err(|e| CaptureError::Decode(format!("{}: {}", self.path.display(), e)))?
            .to_rgb8();

        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureError::Empty);
        }

        Ok(Frame::new(img.into_raw(), width as usize, height as usize))
    }
}

/// Path of a still-image source, if the URL names one.
pub fn still_image_path(url: &str) -> Option<PathBuf> {
    let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();

    if STILL_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(path.to_path_buf())
    } else {
        None
    }
}

/// Open the right grabber for a sensor URL.
pub fn open_grabber(sensor: &Sensor) -> Result<Box<dyn FrameGrabber>, CaptureError> {
    if let Some(path) = still_image_path(&sensor.url) {
        info!("Camera '{}': still image {}", sensor.id, path.display());
        return Ok(Box::new(ImageFileGrabber::new(path)));
    }

    open_stream(sensor)
}

/// Opens the real grabber on first use and again after it is dropped by a
/// failed open, so a camera that is down at startup is picked up later.
pub struct DeferredGrabber {
    sensor: Sensor,
    inner: Option<Box<dyn FrameGrabber>>,
}

impl DeferredGrabber {
    pub fn new(sensor: Sensor) -> Self {
        Self {
            sensor,
            inner: None,
        }
    }
}

impl FrameGrabber for DeferredGrabber {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        if self.inner.is_none() {
            self.inner = Some(open_grabber(&self.sensor)?);
        }
        match self.inner.as_mut() {
            Some(grabber) => grabber.grab(),
            None => Err(CaptureError::Empty),
        }
    }

    fn release(&mut self) {
        if let Some(mut grabber) = self.inner.take() {
            grabber.release();
        }
    }
}

#[cfg(feature = "opencv")]
fn open_stream(sensor: &Sensor) -> Result<Box<dyn FrameGrabber>, CaptureError> {
    let grabber = super::video_capture::VideoCaptureGrabber::open(&sensor.url)?;
    info!("Camera '{}': stream {}", sensor.id, sensor.url);
    Ok(Box::new(grabber))
}

#[cfg(not(feature = "opencv"))]
fn open_stream(sensor: &Sensor) -> Result<Box<dyn FrameGrabber>, CaptureError> {
    Err(CaptureError::Open {
        url: sensor.url.clone(),
        message: "stream sources need the `opencv` feature".to_string(),
    })
}
