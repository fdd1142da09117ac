//! Safe casting utilities for angles and pixel dimensions

use crate::{Error, Result};

/// Round an angle to whole degrees for the wire, clamped to `[min, max]`.
///
/// Non-finite input resolves to `min`.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Clamping ensures safe truncation
pub fn angle_to_degrees(value: f64, min: i32, max: i32) -> i32 {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };

    if !value.is_finite() {
        return min;
    }

    let clamped = value.round().clamp(f64::from(min), f64::from(max));
    (clamped as i32).clamp(min, max)
}

/// Convert an i32 pixel dimension into u32, rejecting negative values
///
/// # Errors
///
/// Returns an error if the value is negative
pub fn i32_to_u32(value: i32) -> Result<u32> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Dimension {value} must not be negative")))
}
