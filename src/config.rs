//! Configuration management for the animatronic motion core

use crate::constants::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera configuration
    pub camera: CameraConfig,

    /// Face detection and target policy
    pub detection: DetectionConfig,

    /// Neck / depth trajectory configuration
    pub tracking: TrackingConfig,

    /// Saccade eye ranges
    pub eyes: EyeConfig,

    /// Serial actuator link
    pub actuator: ActuatorConfig,

    /// Speech and lip-sync configuration
    pub speech: SpeechConfig,

    /// Snapshot configuration
    pub capture: CaptureConfig,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// First camera index to try
    pub index: i32,

    /// Number of consecutive indices tried before giving up
    pub fallback_attempts: i32,

    /// Requested capture width
    pub frame_width: i32,

    /// Requested capture height
    pub frame_height: i32,
}

/// Face detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Path to the SSD face detector ONNX model
    pub model: PathBuf,

    /// Square model input size
    pub input_size: u32,

    /// Detections at or below this confidence are discarded (0.0-1.0)
    pub confidence_threshold: f32,

    /// Width of the centered dead zone as a fraction of frame width
    pub horizontal_dead_zone_percent: f64,

    /// Box width of a far face (pixels)
    pub min_face_width: f64,

    /// Box width of a close face (pixels)
    pub max_face_width: f64,

    /// Step size for a close face (degrees per tick)
    pub min_step_close: f64,

    /// Step size for a far face (degrees per tick)
    pub max_step_far: f64,

    /// Pause between detection cycles
    pub interval_ms: u64,

    /// How long the detector waits for a frame before logging a stall
    pub handoff_timeout_ms: u64,
}

/// Trajectory integrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Lowest safe neck angle
    pub min_angle: f64,

    /// Highest safe neck angle
    pub max_angle: f64,

    /// Neck angle at startup
    pub neutral_angle: f64,

    /// Lowest safe depth angle (close face)
    pub depth_min: f64,

    /// Depth angle at startup
    pub depth_mid: f64,

    /// Highest safe depth angle (far face)
    pub depth_max: f64,

    /// Deltas at or below this are not applied (degrees)
    pub hysteresis: f64,

    /// Minimum change from the last dispatched angle before re-sending
    pub min_dispatch_change: i32,

    /// Control tick period
    pub tick_ms: u64,

    /// Horizontal sway amplitude (degrees)
    pub sway_h_amplitude: f64,

    /// Horizontal sway angular frequency (rad/s)
    pub sway_h_frequency: f64,

    /// Vertical sway amplitude (degrees)
    pub sway_v_amplitude: f64,

    /// Vertical sway angular frequency (rad/s)
    pub sway_v_frequency: f64,

    /// Vertical sway phase offset (rad)
    pub sway_v_phase: f64,
}

/// Eye ranges used by the saccade generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeConfig {
    pub h_min: f64,
    pub h_mid: f64,
    pub h_max: f64,
    pub v_min: f64,
    pub v_mid: f64,
    pub v_max: f64,
}

/// Actuator serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Serial device; scanned when absent or when it fails to open
    pub port: Option<String>,

    /// Baud rate
    pub baud_rate: u32,

    /// Read and write timeout
    pub timeout_ms: u64,

    /// Expected acknowledgment line
    pub ack_token: String,

    /// Wait after opening for the board to reset
    pub reset_delay_ms: u64,

    /// Pause after a write timeout
    pub unresponsive_backoff_ms: u64,

    /// Dequeue wait between liveness checks
    pub dequeue_timeout_ms: u64,
}

/// Speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// TTS command; the text is appended as the last argument, audio is read from stdout
    pub synth_command: Vec<String>,

    /// Player command reading audio from stdin; auto-detected when absent
    pub player_command: Option<Vec<String>>,

    /// Jaw angle when closed
    pub jaw_closed: f64,

    /// Jaw angle at full loudness
    pub jaw_open_max: f64,

    /// RMS at or below this closes the jaw
    pub noise_floor: f64,

    /// RMS mapped to a fully open jaw
    pub rms_full_scale: f64,

    /// Characters buffered before a forced flush
    pub max_buffer_chars: usize,

    /// Pause before the post-utterance cleanup
    pub settle_ms: u64,

    /// Close the jaw on comma and full-stop word boundaries
    pub pause_on_punctuation: bool,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Output directory
    pub dir: PathBuf,

    /// Longer side limit (pixels)
    pub max_dimension: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 1,
            fallback_attempts: 5,
            frame_width: 640,
            frame_height: 480,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("assets/face_detector.onnx"),
            input_size: 300,
            confidence_threshold: CONFIDENCE_THRESHOLD,
            horizontal_dead_zone_percent: HORIZONTAL_DEAD_ZONE_PERCENT,
            min_face_width: MIN_FACE_WIDTH_SCALE,
            max_face_width: MAX_FACE_WIDTH_SCALE,
            min_step_close: MIN_STEP_CLOSE,
            max_step_far: MAX_STEP_FAR,
            interval_ms: 10,
            handoff_timeout_ms: 1000,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_angle: SERVO_MIN_ANGLE,
            max_angle: SERVO_MAX_ANGLE,
            neutral_angle: SERVO_NEUTRAL_ANGLE,
            depth_min: EYE_V_MIN,
            depth_mid: EYE_V_MID,
            depth_max: EYE_V_MAX,
            hysteresis: 1.0,
            min_dispatch_change: MIN_SERVO_ANGLE_CHANGE,
            tick_ms: 33,
            sway_h_amplitude: 1.5,
            sway_h_frequency: 0.8,
            sway_v_amplitude: 1.0,
            sway_v_frequency: 0.5,
            sway_v_phase: 1.2,
        }
    }
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            h_min: EYE_H_MIN,
            h_mid: EYE_H_MID,
            h_max: EYE_H_MAX,
            v_min: SACCADE_V_MIN,
            v_mid: SACCADE_V_MID,
            v_max: SACCADE_V_MAX,
        }
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            timeout_ms: 1000,
            ack_token: ACK_TOKEN.to_string(),
            reset_delay_ms: 2000,
            unresponsive_backoff_ms: 1000,
            dequeue_timeout_ms: 1000,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            synth_command: vec!["espeak-ng".to_string(), "--stdout".to_string()],
            player_command: None,
            jaw_closed: JAW_CLOSE_ANGLE,
            jaw_open_max: JAW_OPEN_MAX_ANGLE,
            noise_floor: RMS_NOISE_FLOOR,
            rms_full_scale: RMS_FULL_SCALE,
            max_buffer_chars: MAX_SPEECH_BUFFER_CHARS,
            settle_ms: 100,
            pause_on_punctuation: true,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("captures"),
            max_dimension: SNAPSHOT_MAX_DIMENSION,
        }
    }
}

impl DetectionConfig {
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }
}

impl ActuatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let det = &self.detection;
        if !(0.0..=1.0).contains(&det.confidence_threshold) {
            return Err(Error::ConfigError(
                "Confidence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&det.horizontal_dead_zone_percent) {
            return Err(Error::ConfigError(
                "Dead zone percent must be between 0.0 and 1.0".to_string(),
            ));
        }
        if det.min_face_width >= det.max_face_width {
            return Err(Error::ConfigError(
                "min_face_width must be smaller than max_face_width".to_string(),
            ));
        }
        if det.min_step_close <= 0.0 || det.min_step_close > det.max_step_far {
            return Err(Error::ConfigError(
                "Step sizes must satisfy 0 < min_step_close <= max_step_far".to_string(),
            ));
        }
        if det.input_size == 0 {
            return Err(Error::ConfigError("Model input size must be greater than 0".to_string()));
        }

        let trk = &self.tracking;
        check_range("tracking angle", trk.min_angle, trk.neutral_angle, trk.max_angle)?;
        check_range("tracking depth", trk.depth_min, trk.depth_mid, trk.depth_max)?;
        if trk.tick_ms == 0 {
            return Err(Error::ConfigError("Tick period must be greater than 0".to_string()));
        }
        if trk.min_dispatch_change < 0 || trk.hysteresis < 0.0 {
            return Err(Error::ConfigError(
                "Dispatch change and hysteresis must not be negative".to_string(),
            ));
        }

        let eyes = &self.eyes;
        check_range("eye horizontal", eyes.h_min, eyes.h_mid, eyes.h_max)?;
        check_range("eye vertical", eyes.v_min, eyes.v_mid, eyes.v_max)?;

        if self.actuator.baud_rate == 0 {
            return Err(Error::ConfigError("Baud rate must be greater than 0".to_string()));
        }
        if self.actuator.ack_token.trim().is_empty() {
            return Err(Error::ConfigError("ACK token must not be empty".to_string()));
        }

        let sp = &self.speech;
        if sp.synth_command.is_empty() {
            return Err(Error::ConfigError("Synthesis command must not be empty".to_string()));
        }
        if matches!(&sp.player_command, Some(cmd) if cmd.is_empty()) {
            return Err(Error::ConfigError("Player command must not be empty".to_string()));
        }
        if sp.jaw_closed > sp.jaw_open_max {
            return Err(Error::ConfigError("Jaw closed angle exceeds open angle".to_string()));
        }
        if sp.noise_floor < 0.0 || sp.noise_floor >= sp.rms_full_scale {
            return Err(Error::ConfigError(
                "Noise floor must be in [0, rms_full_scale)".to_string(),
            ));
        }
        if sp.max_buffer_chars == 0 {
            return Err(Error::ConfigError("Speech buffer ceiling must be greater than 0".to_string()));
        }

        if self.capture.max_dimension == 0 {
            return Err(Error::ConfigError("Snapshot dimension must be greater than 0".to_string()));
        }

        Ok(())
    }
}

fn check_range(name: &str, min: f64, mid: f64, max: f64) -> Result<()> {
    if min <= mid && mid <= max && min < max {
        Ok(())
    } else {
        Err(Error::ConfigError(format!(
            "Invalid {name} range: expected min <= mid <= max, got {min}/{mid}/{max}"
        )))
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Animatronic Motion Configuration

camera:
  index: 1
  fallback_attempts: 5
  frame_width: 640
  frame_height: 480

detection:
  model: "assets/face_detector.onnx"
  input_size: 300
  confidence_threshold: 0.7
  horizontal_dead_zone_percent: 0.15
  min_face_width: 80.0
  max_face_width: 220.0
  min_step_close: 2.0
  max_step_far: 8.0
  interval_ms: 10
  handoff_timeout_ms: 1000

tracking:
  min_angle: 30.0
  max_angle: 110.0
  neutral_angle: 80.0
  depth_min: 50.0
  depth_mid: 130.0
  depth_max: 180.0
  hysteresis: 1.0
  min_dispatch_change: 3
  tick_ms: 33
  sway_h_amplitude: 1.5
  sway_h_frequency: 0.8
  sway_v_amplitude: 1.0
  sway_v_frequency: 0.5
  sway_v_phase: 1.2

eyes:
  h_min: 40.0
  h_mid: 80.0
  h_max: 110.0
  v_min: 70.0
  v_mid: 130.0
  v_max: 180.0

actuator:
  # port: "/dev/ttyACM0"
  baud_rate: 9600
  timeout_ms: 1000
  ack_token: "K"
  reset_delay_ms: 2000
  unresponsive_backoff_ms: 1000
  dequeue_timeout_ms: 1000

speech:
  synth_command: ["espeak-ng", "--stdout"]
  # player_command: ["mpv", "--no-terminal", "-"]
  jaw_closed: 30.0
  jaw_open_max: 90.0
  noise_floor: 100.0
  rms_full_scale: 8000.0
  max_buffer_chars: 60
  settle_ms: 100
  pause_on_punctuation: true

capture:
  dir: "captures"
  max_dimension: 640
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let parsed: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        parsed.validate().unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.camera.index, defaults.camera.index);
        assert_eq!(parsed.tracking.min_dispatch_change, defaults.tracking.min_dispatch_change);
        assert_eq!(parsed.speech.max_buffer_chars, defaults.speech.max_buffer_chars);
        assert_eq!(parsed.actuator.ack_token, "K");
        assert!(parsed.actuator.port.is_none());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("camera:\n  index: 3\n").unwrap();
        assert_eq!(parsed.camera.index, 3);
        assert_eq!(parsed.camera.fallback_attempts, 5);
        assert_eq!(parsed.tracking.max_angle, SERVO_MAX_ANGLE);
    }

    #[test]
    fn test_validate_rejects_inverted_face_widths() {
        let mut config = Config::default();
        config.detection.min_face_width = 300.0;
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_angle_range() {
        let mut config = Config::default();
        config.tracking.neutral_angle = 200.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_noise_floor_above_full_scale() {
        let mut config = Config::default();
        config.speech.noise_floor = 9000.0;
        assert!(config.validate().is_err());
    }
}
