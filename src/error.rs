//! Error types for the animatronic motion core.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// `ONNX` Runtime inference failed
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(#[from] ort::OrtError),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image processing operation failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No camera could be opened or a frame could not be read
    #[error("Camera error: {0}")]
    Camera(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model loading error
    #[error("Model error: {0}")]
    ModelError(String),

    /// Model output processing error
    #[error("Model output error: {0}")]
    ModelOutputError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The actuator did not accept a write within the link timeout
    #[error("Actuator write timed out: {0}")]
    WriteTimeout(String),

    /// Audio player process failed
    #[error("Audio player error: {0}")]
    Player(String),

    /// Speech synthesis failed
    #[error("Speech synthesis error: {0}")]
    Synthesis(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
