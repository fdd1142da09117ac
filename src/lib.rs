//! Motion control and command arbitration for a face-tracking, talking animatronic head.
//!
//! The crate runs a set of cooperating background loops:
//! 1. A frame source keeps the latest camera frame and feeds a single-slot handoff
//! 2. A detector turns the best face box into neck, depth and speed targets
//! 3. A trajectory integrator approaches those targets at a bounded rate, adding sway
//! 4. A saccade generator moves the eyes in biologically plausible jumps
//! 5. A speech synchronizer streams audio to a player and drives the jaw from loudness
//! 6. An actuator link drains a priority queue to the servo controller, one
//!    acknowledged command at a time
//!
//! Every generator communicates by pushing [`command::MotionCommand`]s onto the shared
//! [`command_queue::CommandQueue`]; nothing calls into another component directly.
//!
//! # Examples
//!
//! ## Detector policy
//!
//! ```
//! use animatronic_motion::config::{DetectionConfig, TrackingConfig};
//! use animatronic_motion::face_detection::{BoundingBox, Detection};
//! use animatronic_motion::tracking::{TargetEstimator, TargetState};
//!
//! let detection = DetectionConfig::default();
//! let tracking = TrackingConfig::default();
//! let estimator = TargetEstimator::new(&detection, &tracking);
//! let mut state = TargetState::neutral(&tracking, &detection);
//!
//! // A close face right in the middle of a 640 px frame
//! let face = Detection { bbox: BoundingBox::new(210.0, 100.0, 430.0, 320.0), score: 0.95 };
//! assert!(estimator.apply(&mut state, &[face], 640.0));
//! assert_eq!(state.target_angle, tracking.neutral_angle);
//! assert_eq!(state.dynamic_step_size, 2.0);
//! ```
//!
//! ## Running the head
//!
//! ```no_run
//! use animatronic_motion::{app::Animatronic, config::Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut head = Animatronic::start(Config::default())?;
//! let spoken = head.stream_text(["Hello ", "there. ", "Nice to ", "meet you."]);
//! println!("Said: {spoken}");
//! if let Some(path) = head.capture_snapshot() {
//!     println!("Snapshot at {}", path.display());
//! }
//! head.shutdown();
//! # Ok(())
//! # }
//! ```

/// Serial actuator link and the queue-draining worker
pub mod actuator;

/// Composition root wiring every loop together
pub mod app;

/// Camera access and the frame acquisition loop
pub mod camera;

/// Motion commands and their wire encoding
pub mod command;

/// Shared priority queue of motion commands
pub mod command_queue;

/// Configuration management
pub mod config;

/// Constants used throughout the motion core
pub mod constants;

/// Error types and result handling
pub mod error;

/// Face detection backends
pub mod face_detection;

/// Frames and cross-thread frame cells
pub mod frame;

/// Saccade and idle eye motion
pub mod saccade;

/// Still captures for external services
pub mod snapshot;

/// Speech streaming and lip-sync
pub mod speech;

/// Detection policy and the detection loop
pub mod tracking;

/// Rate-limited neck and depth motion
pub mod trajectory;

/// Utility functions for range mapping and image conversion
pub mod utils;

/// Background worker lifecycle
pub mod worker;

pub use error::{Error, Result};
