// src/capture/frame_slot.rs
//
// Capacity-1 overwrite slot between an acquisition thread and the
// evaluation loop. Publishing always succeeds by replacing whatever is
// there; reading never waits for a new frame and may return the same
// frame again until a newer one is published.

use crate::types::Frame;
use std::sync::Arc;
use tokio::sync::watch;

pub struct FrameSlot {
    tx: watch::Sender<Option<Arc<Frame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replace the slot contents, dropping any unconsumed frame.
    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(Arc::new(frame)));
    }

    /// Most recent frame, if any has been published.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.tx.borrow().clone()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}
