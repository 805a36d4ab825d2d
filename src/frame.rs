//! Video frames and the frame source boundary.

use crate::{Error, Result};

/// Bytes per RGBA pixel
pub const RGBA_CHANNELS: usize = 4;

/// One RGBA video frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    timestamp_ms: u64,
}

impl Frame {
    /// Wrap an RGBA pixel buffer
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either dimension is zero
    /// - The buffer length is not `width * height * 4`
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, timestamp_ms: u64) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!("Invalid frame dimensions: {width}x{height}")));
        }
        let expected = width as usize * height as usize * RGBA_CHANNELS;
        if pixels.len() != expected {
            return Err(Error::InvalidInput(format!(
                "Expected {expected} RGBA bytes for {width}x{height}, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
            timestamp_ms,
        })
    }

    /// A uniformly colored frame
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is zero
    pub fn filled(width: u32, height: u32, rgba: [u8; 4], timestamp_ms: u64) -> Result<Self> {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * RGBA_CHANNELS)
            .collect();
        Self::new(pixels, width, height, timestamp_ms)
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

/// Result of asking a frame source for the next frame
#[derive(Debug)]
pub enum FramePoll {
    /// A new frame is available
    Ready(Frame),
    /// The source has no frame yet; try again next cycle
    NotReady,
    /// The source is exhausted
    Ended,
}

/// Supplier of video frames, polled once per loop cycle
pub trait FrameSource {
    /// Fetch the next frame
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails irrecoverably
    fn poll_frame(&mut self) -> Result<FramePoll>;
}

/// Admits frames in arrival order, dropping any whose timestamp has not advanced
#[derive(Debug, Default)]
pub struct FrameGate {
    last_timestamp_ms: Option<u64>,
}

impl FrameGate {
    #[must_use]
    pub const fn new() -> Self {
        Self { last_timestamp_ms: None }
    }

    /// Returns true if a frame stamped `timestamp_ms` should be processed
    pub fn admit(&mut self, timestamp_ms: u64) -> bool {
        match self.last_timestamp_ms {
            Some(last) if timestamp_ms <= last => false,
            _ => {
                self.last_timestamp_ms = Some(timestamp_ms);
                true
            }
        }
    }
}
