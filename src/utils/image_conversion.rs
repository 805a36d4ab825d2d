//! Conversions between RGBA frames, intensity buffers and encoded images.

use crate::{
    constants::MASK_FOREGROUND,
    frame::{Frame, RGBA_CHANNELS},
    Error, Result,
};
use image::{codecs::png::PngEncoder, ColorType, ImageEncoder};
use ndarray::Array2;
use std::path::Path;

/// ITU-R BT.601 luma weights (matches the usual RGBA-to-gray conversion)
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Write the intensity of `frame` into `gray`
///
/// # Errors
///
/// Returns an error if `gray` is not `height x width`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Weighted sum of u8 stays in 0..=255
pub fn rgba_to_gray(frame: &Frame, gray: &mut Array2<u8>) -> Result<()> {
    let expected = (frame.height() as usize, frame.width() as usize);
    if gray.dim() != expected {
        return Err(Error::InvalidInput(format!(
            "Gray buffer is {:?}, frame is {:?}",
            gray.dim(),
            expected
        )));
    }

    for (dst, px) in gray.iter_mut().zip(frame.pixels().chunks_exact(RGBA_CHANNELS)) {
        let luma = LUMA_R * f32::from(px[0]) + LUMA_G * f32::from(px[1]) + LUMA_B * f32::from(px[2]);
        *dst = luma.round().clamp(0.0, 255.0) as u8;
    }
    Ok(())
}

/// Expand a mask into an opaque RGBA buffer (white foreground on black)
#[must_use]
pub fn mask_to_rgba(mask: &Array2<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(mask.len() * RGBA_CHANNELS);
    for &v in mask {
        let c = if v == MASK_FOREGROUND { 255 } else { 0 };
        out.extend_from_slice(&[c, c, c, 255]);
    }
    out
}

/// Encode a frame as PNG
///
/// # Errors
///
/// Returns an error if encoding fails
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(frame.pixels(), frame.width(), frame.height(), ColorType::Rgba8)?;
    Ok(bytes)
}

/// Decode an image file into a frame
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded
pub fn load_frame<P: AsRef<Path>>(path: P, timestamp_ms: u64) -> Result<Frame> {
    let image = image::open(path)?.to_rgba8();
    let (width, height) = image.dimensions();
    Frame::new(image.into_raw(), width, height, timestamp_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_to_gray() {
        let frame = Frame::new(
            vec![255, 255, 255, 255, 0, 0, 0, 255, 255, 0, 0, 255, 0, 255, 0, 255],
            2,
            2,
            0,
        )
        .unwrap();
        let mut gray = Array2::zeros((2, 2));
        rgba_to_gray(&frame, &mut gray).unwrap();
        assert_eq!(gray[(0, 0)], 255);
        assert_eq!(gray[(0, 1)], 0);
        assert_eq!(gray[(1, 0)], 76);
        assert_eq!(gray[(1, 1)], 150);
    }

    #[test]
    fn test_rgba_to_gray_size_mismatch() {
        let frame = Frame::filled(4, 4, [0, 0, 0, 255], 0).unwrap();
        let mut gray = Array2::zeros((2, 2));
        assert!(rgba_to_gray(&frame, &mut gray).is_err());
    }

    #[test]
    fn test_mask_to_rgba() {
        let mask = Array2::from_shape_vec((1, 2), vec![MASK_FOREGROUND, 0]).unwrap();
        assert_eq!(mask_to_rgba(&mask), vec![255, 255, 255, 255, 0, 0, 0, 255]);
    }

    #[test]
    fn test_png_round_trip_through_file() {
        let frame = Frame::filled(8, 6, [10, 20, 30, 255], 0).unwrap();
        let png = encode_png(&frame).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        std::fs::write(&path, &png).unwrap();
        let loaded = load_frame(&path, 33).unwrap();
        assert_eq!(loaded.width(), 8);
        assert_eq!(loaded.height(), 6);
        assert_eq!(loaded.pixels(), frame.pixels());
        assert_eq!(loaded.timestamp_ms(), 33);
    }
}
