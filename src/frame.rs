//! Frames and the cross-thread cells that hand them between stages.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use image::RgbImage;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

/// An immutable RGB camera frame.
///
/// Cloning is cheap: the pixel buffer is shared and never mutated after capture.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: SystemTime,
}

impl Frame {
    /// Wrap a captured image
    #[must_use]
    pub fn new(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: SystemTime::now(),
        }
    }

    /// Solid black frame, mostly useful for tests and warm-up
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RgbImage::new(width, height))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    #[must_use]
    pub const fn captured_at(&self) -> SystemTime {
        self.captured_at
    }
}

/// Single-slot "latest frame" cell; writers overwrite, readers never block on I/O.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
}

impl FrameSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame; an unread previous frame is dropped.
    pub fn publish(&self, frame: Frame) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    /// Most recent frame, or `None` before the first capture
    #[must_use]
    pub fn latest(&self) -> Option<Frame> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Bounded single-slot handoff between the frame source and the detector.
///
/// Offering to a full handoff evicts the stale frame so the consumer always
/// receives the newest one.
#[derive(Debug, Clone)]
pub struct FrameHandoff {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl Default for FrameHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandoff {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Hand a frame over, replacing any frame the consumer has not taken yet.
    pub fn offer(&self, frame: Frame) {
        let mut pending = frame;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(returned)) => {
                    let _ = self.rx.try_recv();
                    pending = returned;
                }
            }
        }
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// # Errors
    ///
    /// Returns the channel error on timeout; callers treat it as a transient stall.
    pub fn take(&self, timeout: Duration) -> std::result::Result<Frame, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}
