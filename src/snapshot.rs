//! Still captures of the current frame for external vision services.

use crate::config::CaptureConfig;
use crate::frame::{Frame, FrameSlot};
use crate::utils::image_conversion::downscale_to_fit;
use crate::Result;
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

/// File name for a frame: `capture_<unix millis>.jpg`
#[must_use]
pub fn snapshot_file_name(frame: &Frame) -> String {
    let millis = frame
        .captured_at()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("capture_{millis}.jpg")
}

/// Write the latest frame as a JPEG under `config.dir`, longer side capped at
/// `config.max_dimension`.
///
/// Returns `Ok(None)` when no frame has been captured yet.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the image cannot be written.
pub fn capture_snapshot(slot: &FrameSlot, config: &CaptureConfig) -> Result<Option<PathBuf>> {
    let Some(frame) = slot.latest() else {
        warn!("Snapshot requested before the first frame");
        return Ok(None);
    };

    fs::create_dir_all(&config.dir)?;
    let path = config.dir.join(snapshot_file_name(&frame));
    let image = downscale_to_fit(frame.image(), config.max_dimension);
    image.save(&path)?;

    info!("Snapshot saved to {} ({}x{})", path.display(), image.width(), image.height());
    Ok(Some(path))
}
