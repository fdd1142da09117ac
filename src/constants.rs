//! Constants used throughout the motion core

/// Command priority for speech-synchronized jaw motion
pub const PRIORITY_SPEECH: u8 = 1;

/// Command priority for tracking, idle and saccade motion
pub const PRIORITY_MOTION: u8 = 2;

/// Neck servo limits (degrees)
pub const SERVO_MIN_ANGLE: f64 = 30.0;
pub const SERVO_MAX_ANGLE: f64 = 110.0;
pub const SERVO_NEUTRAL_ANGLE: f64 = 80.0;

/// Depth / eye-vertical limits driven by face size (degrees)
pub const EYE_V_MIN: f64 = 50.0;
pub const EYE_V_MID: f64 = 130.0;
pub const EYE_V_MAX: f64 = 180.0;

/// Face width calibration (pixels): far and close
pub const MIN_FACE_WIDTH_SCALE: f64 = 80.0;
pub const MAX_FACE_WIDTH_SCALE: f64 = 220.0;

/// Tracking step bounds (degrees per tick)
pub const MIN_STEP_CLOSE: f64 = 2.0;
pub const MAX_STEP_FAR: f64 = 8.0;

/// Fraction of frame width ignored around the midline
pub const HORIZONTAL_DEAD_ZONE_PERCENT: f64 = 0.15;

/// Default detection confidence threshold
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Minimum change (degrees) before a tracking command is re-sent
pub const MIN_SERVO_ANGLE_CHANGE: i32 = 3;

/// Saccade eye ranges (degrees)
pub const EYE_H_MIN: f64 = 40.0;
pub const EYE_H_MID: f64 = 80.0;
pub const EYE_H_MAX: f64 = 110.0;
pub const SACCADE_V_MIN: f64 = 70.0;
pub const SACCADE_V_MID: f64 = 130.0;
pub const SACCADE_V_MAX: f64 = 180.0;

/// Jaw servo (degrees)
pub const JAW_CLOSE_ANGLE: f64 = 30.0;
pub const JAW_OPEN_MAX_ANGLE: f64 = 90.0;

/// RMS below this is treated as silence
pub const RMS_NOISE_FLOOR: f64 = 100.0;

/// RMS that maps to a fully open jaw
pub const RMS_FULL_SCALE: f64 = 8000.0;

/// Text buffer ceiling before a forced flush (characters)
pub const MAX_SPEECH_BUFFER_CHARS: usize = 60;

/// Longer side of capture snapshots (pixels)
pub const SNAPSHOT_MAX_DIMENSION: u32 = 640;

/// Image normalization means for the SSD face model (BGR order)
pub const SSD_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];

/// Values per SSD detection row: image id, label, confidence, x0, y0, x1, y1
pub const SSD_DETECTION_STRIDE: usize = 7;

/// Acknowledgment token the actuator firmware answers with
pub const ACK_TOKEN: &str = "K";
