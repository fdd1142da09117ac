use crate::constants::{SSD_DETECTION_STRIDE, SSD_MEAN_BGR};
use crate::frame::Frame;
use crate::utils::image_conversion::rgb_image_to_ssd_blob;
use crate::{Error, Result};
use ndarray::CowArray;
use ort::{Environment, Session, Value};
use std::path::Path;
use std::sync::Arc;

/// Axis-aligned face box in frame pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn center_x(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }
}

/// Face detection result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Bounding box of the detected face
    pub bbox: BoundingBox,
    /// Confidence score of the detection
    pub score: f32,
}

/// Face detection backend
pub trait FaceDetector: Send {
    /// Detect faces in a frame, returning every raw candidate
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Highest-confidence detection strictly above `threshold`
#[must_use]
pub fn select_best(detections: &[Detection], threshold: f32) -> Option<&Detection> {
    detections
        .iter()
        .filter(|d| d.score > threshold)
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
}

/// SSD face detector (res10 300x300 family) using ONNX Runtime
pub struct OnnxFaceDetector {
    session: Session,
    input_size: u32,
}

impl OnnxFaceDetector {
    /// Create a new face detector from an ONNX model file
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(Error::ModelError(format!(
                "Face detector model not found: {}",
                model_path.display()
            )));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .with_log_level(ort::LoggingLevel::Warning)
                .build()?,
        );

        let session = ort::SessionBuilder::new(&environment)?
            .with_optimization_level(ort::GraphOptimizationLevel::Level3)?
            .with_model_from_file(model_path)?;

        if session.inputs.is_empty() {
            return Err(Error::ModelError("Model has no inputs".to_string()));
        }

        Ok(Self { session, input_size })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let blob = rgb_image_to_ssd_blob(frame.image(), self.input_size, SSD_MEAN_BGR);

        let cow_array = CowArray::from(blob.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let first = outputs
            .first()
            .ok_or_else(|| Error::ModelOutputError("Model produced no outputs".to_string()))?;
        let extracted = first.try_extract::<f32>()?;
        let view = extracted.view();
        let data: Vec<f32> = view.iter().copied().collect();

        Ok(decode_ssd_output(
            &data,
            f64::from(frame.width()),
            f64::from(frame.height()),
        ))
    }
}

/// Decode a flattened `[1, 1, N, 7]` SSD output into pixel-space detections.
///
/// Each row is `[image_id, label, confidence, x0, y0, x1, y1]` with normalized
/// coordinates. Rows are clipped to the frame; degenerate boxes are dropped.
#[must_use]
pub fn decode_ssd_output(data: &[f32], frame_width: f64, frame_height: f64) -> Vec<Detection> {
    data.chunks_exact(SSD_DETECTION_STRIDE)
        .filter_map(|row| {
            let score = row[2];
            if !score.is_finite() {
                return None;
            }
            let scale = |v: f32, size: f64| (f64::from(v) * size).clamp(0.0, size);
            let bbox = BoundingBox::new(
                scale(row[3], frame_width),
                scale(row[4], frame_height),
                scale(row[5], frame_width),
                scale(row[6], frame_height),
            );
            (bbox.width() > 0.0 && bbox.y1 > bbox.y0).then_some(Detection { bbox, score })
        })
        .collect()
}
