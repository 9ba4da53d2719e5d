// src/capture/frame_source.rs
//
// One free-running acquisition thread per sensor. Each thread pulls frames
// as fast as its grabber allows and publishes only the newest into the
// sensor's FrameSlot. Failures leave the slot untouched.

use super::frame_slot::FrameSlot;
use super::grabber::{DeferredGrabber, FrameGrabber};
use crate::pipeline::metrics::PipelineMetrics;
use crate::types::{CaptureConfig, Frame, Sensor};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Non-blocking access to the newest frame of each sensor.
pub trait FrameProvider {
    fn latest(&self, sensor_id: &str) -> Option<Arc<Frame>>;
}

pub struct FrameSource {
    sensor_id: String,
    slot: Arc<FrameSlot>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Spawn the acquisition thread for one sensor.
    pub fn start(
        sensor_id: &str,
        grabber: Box<dyn FrameGrabber>,
        config: &CaptureConfig,
        metrics: PipelineMetrics,
    ) -> std::io::Result<Self> {
        let slot = Arc::new(FrameSlot::new());
        let stop = Arc::new(AtomicBool::new(false));

        let worker = AcquisitionWorker {
            sensor_id: sensor_id.to_string(),
            grabber,
            slot: Arc::clone(&slot),
            stop: Arc::clone(&stop),
            poll_delay: Duration::from_millis(config.poll_delay_ms),
            failure_backoff: Duration::from_millis(config.failure_backoff_ms),
            metrics,
        };

        let thread = thread::Builder::new()
            .name(format!("capture-{}", sensor_id))
            .spawn(move || worker.run())?;

        Ok(Self {
            sensor_id: sensor_id.to_string(),
            slot,
            stop,
            thread: Some(thread),
        })
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.slot.latest()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stop acquiring and wait for the thread to release its grabber.
    pub fn join(mut self) {
        self.request_stop();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Capture thread for '{}' panicked", self.sensor_id);
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.request_stop();
    }
}

struct AcquisitionWorker {
    sensor_id: String,
    grabber: Box<dyn FrameGrabber>,
    slot: Arc<FrameSlot>,
    stop: Arc<AtomicBool>,
    poll_delay: Duration,
    failure_backoff: Duration,
    metrics: PipelineMetrics,
}

impl AcquisitionWorker {
    fn run(mut self) {
        let started = Instant::now();
        let mut sequence = 0u64;
        let mut failing = false;

        debug!("Capture thread for '{}' started", self.sensor_id);

        while !self.stop.load(Ordering::Acquire) {
            let result = self.grabber.grab().and_then(|frame| {
                if frame.is_valid() {
                    Ok(frame)
                } else {
                    Err(crate::error::CaptureError::Empty)
                }
            });

            match result {
                Ok(mut frame) => {
                    sequence += 1;
                    frame.sequence = sequence;
                    frame.timestamp_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.slot.publish(frame);
                    self.metrics.inc(&self.metrics.frames_acquired);

                    if failing {
                        info!("Camera '{}' recovered", self.sensor_id);
                        failing = false;
                    }
                    sleep_unless_stopped(&self.stop, self.poll_delay);
                }
                Err(e) => {
                    self.metrics.inc(&self.metrics.acquisition_failures);
                    if failing {
                        debug!("Camera '{}' still failing: {}", self.sensor_id, e);
                    } else {
                        warn!("Failed to capture frame from camera '{}': {}", self.sensor_id, e);
                        failing = true;
                    }
                    sleep_unless_stopped(&self.stop, self.poll_delay + self.failure_backoff);
                }
            }
        }

        self.grabber.release();
        debug!("Capture thread for '{}' stopped", self.sensor_id);
    }
}

/// Sleep in short steps so a stop request is honored quickly.
fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) {
    const STEP: Duration = Duration::from_millis(20);
    let deadline = Instant::now() + total;

    loop {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(STEP.min(deadline - now));
    }
}

/// All running frame sources, keyed by sensor id.
#[derive(Default)]
pub struct CaptureSet {
    sources: BTreeMap<String, FrameSource>,
}

impl CaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start one acquisition thread per sensor. Grabbers are opened lazily
    /// inside the thread, so unreachable cameras show up as acquisition
    /// failures rather than startup errors.
    pub fn start(
        sensors: &[Sensor],
        config: &CaptureConfig,
        metrics: &PipelineMetrics,
    ) -> std::io::Result<Self> {
        let mut set = Self::new();
        for sensor in sensors {
            let grabber = Box::new(DeferredGrabber::new(sensor.clone()));
            let source = FrameSource::start(&sensor.id, grabber, config, metrics.clone())?;
            set.insert(source);
        }
        info!("✓ Started {} capture thread(s)", set.len());
        Ok(set)
    }

    pub fn insert(&mut self, source: FrameSource) {
        self.sources.insert(source.sensor_id().to_string(), source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Signal every thread, then wait for all of them.
    pub fn stop_all(self) {
        for source in self.sources.values() {
            source.request_stop();
        }
        for (_, source) in self.sources {
            source.join();
        }
    }
}

impl FrameProvider for CaptureSet {
    fn latest(&self, sensor_id: &str) -> Option<Arc<Frame>> {
        self.sources.get(sensor_id).and_then(|s| s.latest())
    }
}

impl FrameProvider for BTreeMap<String, Arc<Frame>> {
    fn latest(&self, sensor_id: &str) -> Option<Arc<Frame>> {
        self.get(sensor_id).cloned()
    }
}
