//! Bounded-rate frame sampling

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{AcquisitionError, CaptureBackend, CaptureConstraints, Frame};

/// Frame sampler entry point
pub struct FrameSampler;

impl FrameSampler {
    /// Acquire the capture device and hand back an owning handle
    ///
    /// The handle releases device tracks when dropped, so every exit path
    /// out of the sampling loop (classifier failure, teardown, panic
    /// unwind) gives the tracks back.
    pub fn acquire(
        mut backend: Box<dyn CaptureBackend>,
        constraints: CaptureConstraints,
    ) -> Result<DeviceHandle, AcquisitionError> {
        backend.open(&constraints)?;
        info!(
            width = constraints.width,
            height = constraints.height,
            fps = constraints.fps,
            "capture device acquired"
        );

        let min_interval = Duration::from_secs_f64(1.0 / constraints.fps.max(1) as f64);
        Ok(DeviceHandle {
            backend: Some(backend),
            min_interval,
            last_pull: None,
        })
    }
}

/// Owning handle over an acquired capture device
///
/// Yields at most one frame per sampling interval. The exact rate is a
/// tunable on [`CaptureConstraints`], not a contract.
pub struct DeviceHandle {
    backend: Option<Box<dyn CaptureBackend>>,
    min_interval: Duration,
    last_pull: Option<Instant>,
}

impl DeviceHandle {
    /// Pull the next frame, pacing to the configured rate
    ///
    /// Returns `None` when the device produced nothing this interval (the
    /// tick is dropped, never queued) or when the device has been released.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        if self.backend.is_none() {
            return None;
        }

        if let Some(last) = self.last_pull {
            let due = last + self.min_interval;
            let now = Instant::now();
            if due > now {
                tokio::time::sleep_until(due).await;
            }
        }
        self.last_pull = Some(Instant::now());

        match self.backend.as_mut()?.read_frame() {
            Some(frame) => Some(frame),
            None => {
                debug!("no frame ready, dropping tick");
                None
            }
        }
    }

    /// Release the device tracks
    ///
    /// Idempotent; returns `true` only on the call that actually released.
    pub fn release(&mut self) -> bool {
        match self.backend.take() {
            Some(mut backend) => {
                backend.close();
                info!("capture device released");
                true
            }
            None => {
                warn!("release called on already-released device");
                false
            }
        }
    }

    /// Whether the device is still held
    pub fn is_held(&self) -> bool {
        self.backend.is_some()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if self.backend.is_some() {
            self.release();
        }
    }
}
