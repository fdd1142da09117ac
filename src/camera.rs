//! Frame acquisition: camera access and the loop that feeds the latest-frame slot
//! and the detector handoff.

use crate::config::CameraConfig;
use crate::frame::{Frame, FrameHandoff, FrameSlot};
use crate::utils::image_conversion::bgr_mat_to_rgb_image;
use crate::worker::Shutdown;
use crate::{Error, Result};
use log::{debug, error, info, warn};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Source of camera frames
pub trait FrameGrabber: Send {
    /// Read the next frame. `Ok(None)` means the device had nothing this time.
    ///
    /// # Errors
    ///
    /// Returns an error if the device failed.
    fn grab(&mut self) -> Result<Option<Frame>>;
}

/// OpenCV-backed camera
pub struct OpenCvCamera {
    capture: VideoCapture,
    index: i32,
}

impl OpenCvCamera {
    /// Open camera `index`, configured for low latency
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened.
    pub fn open(index: i32, config: &CameraConfig) -> Result<Self> {
        let mut capture = VideoCapture::new(index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(Error::Camera(format!("Camera {index} did not open")));
        }

        capture.set(CAP_PROP_FRAME_WIDTH, f64::from(config.frame_width))?;
        capture.set(CAP_PROP_FRAME_HEIGHT, f64::from(config.frame_height))?;
        // Reduce buffer size for lower latency
        capture.set(CAP_PROP_BUFFERSIZE, 1.0)?;

        Ok(Self { capture, index })
    }

    /// Try `config.index` and the following indices in order
    ///
    /// # Errors
    ///
    /// `Error::Camera` if none of the indices opens.
    pub fn open_with_fallback(config: &CameraConfig) -> Result<Self> {
        let attempts = config.fallback_attempts.max(1);
        for index in config.index..config.index.saturating_add(attempts) {
            match Self::open(index, config) {
                Ok(camera) => {
                    info!("Camera opened at index {index}");
                    return Ok(camera);
                }
                Err(e) => debug!("Camera index {index} unavailable: {e}"),
            }
        }
        Err(Error::Camera(format!(
            "No camera found at indices {}..{}",
            config.index,
            config.index.saturating_add(attempts)
        )))
    }

    #[must_use]
    pub const fn index(&self) -> i32 {
        self.index
    }
}

impl FrameGrabber for OpenCvCamera {
    fn grab(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !self.capture.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }
        Ok(Some(Frame::new(bgr_mat_to_rgb_image(&mat)?)))
    }
}

/// Acquisition loop: overwrite the shared slot and the detector handoff with every frame
pub struct FrameSource {
    grabber: Box<dyn FrameGrabber>,
    slot: Arc<FrameSlot>,
    handoff: FrameHandoff,
    active: Arc<AtomicBool>,
    retry_delay: Duration,
    max_consecutive_errors: u32,
}

impl FrameSource {
    #[must_use]
    pub fn new(grabber: Box<dyn FrameGrabber>, slot: Arc<FrameSlot>, handoff: FrameHandoff) -> Self {
        Self {
            grabber,
            slot,
            handoff,
            active: Arc::new(AtomicBool::new(true)),
            retry_delay: Duration::from_millis(10),
            max_consecutive_errors: 100,
        }
    }

    /// Flag that is true while the camera is delivering
    #[must_use]
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    /// Read one frame and publish it. Returns `Ok(false)` when nothing was read.
    ///
    /// # Errors
    ///
    /// Returns the grabber's error.
    pub fn pump(&mut self) -> Result<bool> {
        match self.grabber.grab()? {
            Some(frame) => {
                self.slot.publish(frame.clone());
                self.handoff.offer(frame);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Loop until shutdown or until the device keeps failing
    pub fn run(mut self, shutdown: &Shutdown) {
        let mut consecutive_errors = 0;
        while !shutdown.is_triggered() {
            match self.pump() {
                Ok(true) => consecutive_errors = 0,
                Ok(false) => {
                    if shutdown.sleep(self.retry_delay) {
                        break;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!("Failed to read frame ({consecutive_errors}): {e}");
                    if consecutive_errors >= self.max_consecutive_errors {
                        error!("Camera keeps failing, frame source stopping");
                        break;
                    }
                    if shutdown.sleep(self.retry_delay) {
                        break;
                    }
                }
            }
        }
        self.active.store(false, Ordering::SeqCst);
    }
}
