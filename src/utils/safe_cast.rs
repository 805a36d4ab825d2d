//! Checked numeric conversions for pixel and bin coordinates

/// Round a coordinate to the nearest integer, clamped into `[min, max]`
///
/// Non-finite input maps to `min`.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Clamping ensures safe truncation
pub fn f64_to_i64_clamp(value: f64, min: i64, max: i64) -> i64 {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    if !value.is_finite() {
        return min;
    }
    #[allow(clippy::cast_precision_loss)] // Bounds are pixel-sized
    let clamped = value.round().clamp(min as f64, max as f64);
    (clamped as i64).clamp(min, max)
}

/// Convert a signed pixel coordinate into an index below `len`
#[must_use]
pub fn i64_to_index(value: i64, len: usize) -> Option<usize> {
    usize::try_from(value).ok().filter(|&v| v < len)
}
