// src/capture/mod.rs

pub mod frame_slot;
pub mod frame_source;
pub mod grabber;
#[cfg(feature = "opencv")]
pub mod video_capture;

pub use frame_slot::FrameSlot;
pub use frame_source::{CaptureSet, FrameProvider, FrameSource};
pub use grabber::{open_grabber, FrameGrabber, ImageFileGrabber};
