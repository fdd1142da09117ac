//! Image conversion utilities between OpenCV Mat, `image` buffers and ndarray tensors.

use crate::utils::safe_cast::i32_to_u32;
use crate::{Error, Result};
use image::{imageops, RgbImage};
use ndarray::Array4;
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;

/// Convert a BGR OpenCV Mat (as delivered by `VideoCapture`) to an RGB image
///
/// # Errors
/// * Returns error if the Mat is empty or not 8-bit 3-channel
/// * Returns error if colour conversion fails
pub fn bgr_mat_to_rgb_image(mat: &Mat) -> Result<RgbImage> {
    let rows = mat.rows();
    let cols = mat.cols();
    let channels = mat.channels();

    if rows <= 0 || cols <= 0 || channels != 3 {
        return Err(Error::InvalidInput(format!(
            "Invalid Mat dimensions: {rows}x{cols}x{channels}"
        )));
    }

    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    // cvt_color always allocates a fresh, continuous buffer
    let data = rgb.data_bytes()?.to_vec();

    RgbImage::from_raw(i32_to_u32(cols)?, i32_to_u32(rows)?, data)
        .ok_or_else(|| Error::InvalidInput("Mat buffer does not match its dimensions".to_string()))
}

/// Build an NCHW blob for an SSD face model.
///
/// The image is resized to `size`×`size`, reordered to BGR and mean-subtracted
/// channel-wise, matching the Caffe `blobFromImage` preprocessing.
#[must_use]
pub fn rgb_image_to_ssd_blob(image: &RgbImage, size: u32, mean_bgr: [f32; 3]) -> Array4<f32> {
    let resized = imageops::resize(image, size, size, imageops::FilterType::Triangle);
    let side = size as usize;
    let mut blob = Array4::<f32>::zeros((1, 3, side, side));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        blob[[0, 0, y, x]] = f32::from(b) - mean_bgr[0];
        blob[[0, 1, y, x]] = f32::from(g) - mean_bgr[1];
        blob[[0, 2, y, x]] = f32::from(r) - mean_bgr[2];
    }

    blob
}

/// Resize so the longer side is at most `max_dimension`, keeping the aspect ratio.
///
/// Images already within the limit are returned unchanged.
#[must_use]
pub fn downscale_to_fit(image: &RgbImage, max_dimension: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let longer = width.max(height);
    if longer <= max_dimension || longer == 0 {
        return image.clone();
    }

    let scale = f64::from(max_dimension) / f64::from(longer);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (new_width, new_height) = (
        ((f64::from(width) * scale).round() as u32).max(1),
        ((f64::from(height) * scale).round() as u32).max(1),
    );

    imageops::resize(image, new_width, new_height, imageops::FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_ssd_blob_shape_and_mean() {
        let image = RgbImage::from_pixel(10, 10, Rgb([123, 177, 104]));
        let blob = rgb_image_to_ssd_blob(&image, 4, [104.0, 177.0, 123.0]);
        assert_eq!(blob.shape(), &[1, 3, 4, 4]);
        // Pixel equals the mean in every channel
        assert!(blob.iter().all(|v| v.abs() < 1e-3));
    }

    #[test]
    fn test_ssd_blob_channel_order() {
        let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let blob = rgb_image_to_ssd_blob(&image, 2, [0.0, 0.0, 0.0]);
        // Red lands in the last (R) plane of BGR
        assert_eq!(blob[[0, 0, 0, 0]], 0.0);
        assert_eq!(blob[[0, 2, 0, 0]], 255.0);
    }

    #[test]
    fn test_downscale_landscape() {
        let image = RgbImage::new(1280, 720);
        let out = downscale_to_fit(&image, 640);
        assert_eq!(out.dimensions(), (640, 360));
    }

    #[test]
    fn test_downscale_portrait_uses_longer_side() {
        let image = RgbImage::new(480, 1280);
        let out = downscale_to_fit(&image, 640);
        assert_eq!(out.dimensions(), (240, 640));
    }

    #[test]
    fn test_downscale_small_unchanged() {
        let image = RgbImage::new(320, 240);
        assert_eq!(downscale_to_fit(&image, 640).dimensions(), (320, 240));
    }
}
