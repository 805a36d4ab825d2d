//! Reusable per-session image buffers.
//!
//! The check pipeline needs a grayscale frame, a foreground mask and a Hough
//! accumulator every frame. They live here, sized to the frame, and are only
//! reallocated when the frame dimensions change.

use ndarray::Array2;

/// Scratch buffers for one detection session
#[derive(Debug)]
pub struct FrameBuffers {
    /// Single-channel intensity image
    pub gray: Array2<u8>,
    /// Foreground mask (0 or 255)
    pub mask: Array2<u8>,
    /// Hough vote accumulator, `rho_bins x theta_bins`
    pub accumulator: Array2<u32>,
    width: u32,
    height: u32,
    reallocations: usize,
}

impl Default for FrameBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffers {
    #[must_use]
    pub fn new() -> Self {
        Self {
            gray: Array2::zeros((0, 0)),
            mask: Array2::zeros((0, 0)),
            accumulator: Array2::zeros((0, 0)),
            width: 0,
            height: 0,
            reallocations: 0,
        }
    }

    /// Size the image buffers for a `width x height` frame
    ///
    /// Returns true if the buffers had to be reallocated.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height {
            return false;
        }
        let shape = (height as usize, width as usize);
        self.gray = Array2::zeros(shape);
        self.mask = Array2::zeros(shape);
        self.width = width;
        self.height = height;
        self.reallocations += 1;
        log::debug!("Frame buffers sized to {width}x{height}");
        true
    }

    /// Size the accumulator, zeroing it in place when the shape is unchanged
    pub fn reset_accumulator(&mut self, rho_bins: usize, theta_bins: usize) {
        if self.accumulator.dim() == (rho_bins, theta_bins) {
            self.accumulator.fill(0);
        } else {
            self.accumulator = Array2::zeros((rho_bins, theta_bins));
        }
    }

    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of times the image buffers were (re)allocated
    #[must_use]
    pub const fn reallocations(&self) -> usize {
        self.reallocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_reuse_same_size() {
        let mut buffers = FrameBuffers::new();
        assert!(buffers.ensure_size(64, 48));
        assert!(!buffers.ensure_size(64, 48));
        assert_eq!(buffers.gray.dim(), (48, 64));
        assert_eq!(buffers.reallocations(), 1);

        assert!(buffers.ensure_size(32, 32));
        assert_eq!(buffers.reallocations(), 2);
    }

    #[test]
    fn test_accumulator_reset_in_place() {
        let mut buffers = FrameBuffers::new();
        buffers.reset_accumulator(10, 180);
        buffers.accumulator[(3, 4)] = 7;
        buffers.reset_accumulator(10, 180);
        assert_eq!(buffers.accumulator[(3, 4)], 0);
        assert_eq!(buffers.accumulator.dim(), (10, 180));
    }
}
