//! Detection policy: turns the best face box into horizontal, depth and speed targets.
//!
//! When a cycle produces no acceptable detection the previous box and targets are
//! kept as they are. There is no snap back to neutral.

use crate::config::{DetectionConfig, TrackingConfig};
use crate::face_detection::{select_best, BoundingBox, Detection, FaceDetector};
use crate::frame::FrameHandoff;
use crate::utils::map_range;
use crate::worker::Shutdown;
use crossbeam_channel::RecvTimeoutError;
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Targets produced by the detector and consumed by the trajectory integrator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetState {
    /// Neck target (degrees)
    pub target_angle: f64,
    /// Depth / eye-vertical target (degrees)
    pub target_depth_angle: f64,
    /// Maximum integrator step (degrees per tick)
    pub dynamic_step_size: f64,
    /// Last face box that cleared the threshold
    pub last_box: Option<BoundingBox>,
}

impl TargetState {
    /// Neutral pose before any face was seen
    #[must_use]
    pub fn neutral(tracking: &TrackingConfig, detection: &DetectionConfig) -> Self {
        Self {
            target_angle: tracking.neutral_angle,
            target_depth_angle: tracking.depth_mid,
            dynamic_step_size: detection.max_step_far,
            last_box: None,
        }
    }
}

/// Mutex-guarded cell holding the last-known targets and box
#[derive(Debug)]
pub struct SharedTargets {
    state: Mutex<TargetState>,
}

impl SharedTargets {
    #[must_use]
    pub fn new(initial: TargetState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    /// Copy of the current targets
    #[must_use]
    pub fn get(&self) -> TargetState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Read-modify-write under the lock; `f` must not block
    pub fn update<R>(&self, f: impl FnOnce(&mut TargetState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Maps detections to targets
#[derive(Debug, Clone)]
pub struct TargetEstimator {
    detection: DetectionConfig,
    min_angle: f64,
    max_angle: f64,
    depth_min: f64,
    depth_max: f64,
}

impl TargetEstimator {
    #[must_use]
    pub fn new(detection: &DetectionConfig, tracking: &TrackingConfig) -> Self {
        Self {
            detection: detection.clone(),
            min_angle: tracking.min_angle,
            max_angle: tracking.max_angle,
            depth_min: tracking.depth_min,
            depth_max: tracking.depth_max,
        }
    }

    /// True when `center_x` lies inside the centered dead zone
    #[must_use]
    pub fn in_dead_zone(&self, center_x: f64, frame_width: f64) -> bool {
        let half_zone = frame_width * self.detection.horizontal_dead_zone_percent / 2.0;
        (center_x - frame_width / 2.0).abs() <= half_zone
    }

    /// Step size for a face of the given box width: far faces move fast, close faces slow
    #[must_use]
    pub fn step_for_width(&self, width: f64) -> f64 {
        map_range(
            width,
            self.detection.min_face_width,
            self.detection.max_face_width,
            self.detection.max_step_far,
            self.detection.min_step_close,
        )
    }

    /// Depth target for a face of the given box width: far maps to `depth_max`, close to `depth_min`
    #[must_use]
    pub fn depth_for_width(&self, width: f64) -> f64 {
        map_range(
            width,
            self.detection.min_face_width,
            self.detection.max_face_width,
            self.depth_max,
            self.depth_min,
        )
    }

    /// Neck target for a box centered at `center_x`
    #[must_use]
    pub fn angle_for_center(&self, center_x: f64, frame_width: f64) -> f64 {
        map_range(center_x, 0.0, frame_width, self.min_angle, self.max_angle)
    }

    /// Apply one detection cycle to `state`.
    ///
    /// Returns `true` if a detection cleared the threshold. Otherwise `state` is untouched.
    pub fn apply(&self, state: &mut TargetState, detections: &[Detection], frame_width: f64) -> bool {
        let Some(best) = select_best(detections, self.detection.confidence_threshold) else {
            return false;
        };

        let bbox = best.bbox;
        let width = bbox.width();
        let center_x = bbox.center_x();

        if !self.in_dead_zone(center_x, frame_width) {
            state.target_angle = self.angle_for_center(center_x, frame_width);
        }
        state.dynamic_step_size = self.step_for_width(width);
        state.target_depth_angle = self.depth_for_width(width);
        state.last_box = Some(bbox);
        true
    }
}

/// Detection loop: pulls the newest frame from the handoff and updates the shared targets
pub struct DetectionLoop {
    detector: Box<dyn FaceDetector>,
    estimator: TargetEstimator,
    handoff: FrameHandoff,
    targets: Arc<SharedTargets>,
    interval: Duration,
    handoff_timeout: Duration,
}

impl DetectionLoop {
    #[must_use]
    pub fn new(
        detector: Box<dyn FaceDetector>,
        estimator: TargetEstimator,
        handoff: FrameHandoff,
        targets: Arc<SharedTargets>,
        config: &DetectionConfig,
    ) -> Self {
        Self {
            detector,
            estimator,
            handoff,
            targets,
            interval: Duration::from_millis(config.interval_ms),
            handoff_timeout: config.handoff_timeout(),
        }
    }

    /// Run one cycle. Returns `false` when the frame source has gone away.
    pub fn cycle(&mut self) -> bool {
        let frame = match self.handoff.take(self.handoff_timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => {
                warn!("Camera feed timed out");
                return true;
            }
            Err(RecvTimeoutError::Disconnected) => return false,
        };

        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("Face detection failed: {e}");
                return true;
            }
        };

        let frame_width = f64::from(frame.width());
        let found = self
            .targets
            .update(|state| self.estimator.apply(state, &detections, frame_width));
        if found {
            debug!("Targets updated: {:?}", self.targets.get());
        }
        true
    }

    /// Loop until shutdown
    pub fn run(mut self, shutdown: &Shutdown) {
        while !shutdown.is_triggered() {
            if !self.cycle() {
                warn!("Frame source disconnected, detection loop exiting");
                break;
            }
            if shutdown.sleep(self.interval) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> TargetEstimator {
        TargetEstimator::new(&DetectionConfig::default(), &TrackingConfig::default())
    }

    fn face(x0: f64, width: f64, score: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x0, 100.0, x0 + width, 100.0 + width),
            score,
        }
    }

    #[test]
    fn test_dead_zone_bounds() {
        let est = estimator();
        // 15% of 640 = 96 px zone, 48 px each side of 320
        assert!(est.in_dead_zone(320.0, 640.0));
        assert!(est.in_dead_zone(367.0, 640.0));
        assert!(!est.in_dead_zone(370.0, 640.0));
        assert!(!est.in_dead_zone(200.0, 640.0));
    }

    #[test]
    fn test_step_and_depth_extremes() {
        let est = estimator();
        assert_eq!(est.step_for_width(80.0), 8.0);
        assert_eq!(est.step_for_width(220.0), 2.0);
        assert_eq!(est.step_for_width(400.0), 2.0);
        assert_eq!(est.step_for_width(10.0), 8.0);
        assert_eq!(est.depth_for_width(80.0), 180.0);
        assert_eq!(est.depth_for_width(220.0), 50.0);
    }

    #[test]
    fn test_off_center_face_moves_target() {
        let est = estimator();
        let mut state = TargetState::neutral(&TrackingConfig::default(), &DetectionConfig::default());
        // Center at 100 -> 30 + 100/640*80 = 42.5
        assert!(est.apply(&mut state, &[face(50.0, 100.0, 0.9)], 640.0));
        assert!((state.target_angle - 42.5).abs() < 1e-9);
        assert!(state.last_box.is_some());
    }

    #[test]
    fn test_low_confidence_is_noop() {
        let est = estimator();
        let mut state = TargetState::neutral(&TrackingConfig::default(), &DetectionConfig::default());
        let before = state;
        assert!(!est.apply(&mut state, &[face(0.0, 150.0, 0.7), face(400.0, 90.0, 0.2)], 640.0));
        assert_eq!(state, before);
    }

    #[test]
    fn test_shared_targets_update() {
        let shared = SharedTargets::new(TargetState::neutral(
            &TrackingConfig::default(),
            &DetectionConfig::default(),
        ));
        shared.update(|s| s.target_angle = 99.0);
        assert_eq!(shared.get().target_angle, 99.0);
    }
}
