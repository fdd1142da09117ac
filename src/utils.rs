//! Utility functions for range mapping and image conversion.

pub mod image_conversion;
pub mod safe_cast;

/// Linearly remap `value` from `[in_min, in_max]` to `[out_min, out_max]`.
///
/// The input is clamped to the source range first, so the result never
/// leaves the output range. Output ranges may be descending.
#[must_use]
pub fn map_range(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    let (lo, hi) = if in_min <= in_max { (in_min, in_max) } else { (in_max, in_min) };
    if (hi - lo).abs() < f64::EPSILON {
        return out_min;
    }
    let value = value.clamp(lo, hi);
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Clamp `value` to `[min, max]`, returning `min` for NaN.
#[must_use]
pub fn clamp_angle(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Seconds since the Unix epoch as a float; used as a never-resetting phase driver.
#[must_use]
pub fn wall_clock_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
