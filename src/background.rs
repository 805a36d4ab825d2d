//! Adaptive per-pixel background model producing a foreground mask.
//!
//! Each pixel keeps a running Gaussian (mean and variance) of its intensity.
//! A pixel is foreground when its squared deviation from the mean exceeds
//! `var_threshold` times the variance. The learning rate is `1 / n` for the
//! first `history` frames and `1 / history` afterwards. Shadow detection is
//! not performed.

use crate::{
    constants::{BACKGROUND_VAR_INIT, BACKGROUND_VAR_MAX, BACKGROUND_VAR_MIN, MASK_BACKGROUND, MASK_FOREGROUND},
    Error, Result,
};
use ndarray::{Array2, Zip};

/// Running background model for one detection session
#[derive(Debug)]
pub struct BackgroundModel {
    history: usize,
    var_threshold: f32,
    mean: Array2<f32>,
    variance: Array2<f32>,
    frames_seen: usize,
}

impl BackgroundModel {
    /// Create an empty model
    ///
    /// # Errors
    ///
    /// Returns an error if `history` is zero or `var_threshold` is not positive
    pub fn new(history: usize, var_threshold: f32) -> Result<Self> {
        if history == 0 {
            return Err(Error::InvalidInput("Background history must be greater than 0".to_string()));
        }
        if !(var_threshold > 0.0) {
            return Err(Error::InvalidInput(format!(
                "Variance threshold must be positive, got {var_threshold}"
            )));
        }
        log::info!("Background model created (history {history}, var threshold {var_threshold})");
        Ok(Self {
            history,
            var_threshold,
            mean: Array2::zeros((0, 0)),
            variance: Array2::zeros((0, 0)),
            frames_seen: 0,
        })
    }

    /// Subtract the background from `gray` into `mask` and update the model
    ///
    /// The first frame (or the first after a size change) seeds the model
    /// and yields an empty mask.
    ///
    /// # Errors
    ///
    /// Returns an error if `gray` and `mask` differ in shape
    pub fn apply(&mut self, gray: &Array2<u8>, mask: &mut Array2<u8>) -> Result<()> {
        if gray.dim() != mask.dim() {
            return Err(Error::InvalidInput(format!(
                "Mask is {:?}, image is {:?}",
                mask.dim(),
                gray.dim()
            )));
        }

        if self.mean.dim() != gray.dim() || self.frames_seen == 0 {
            self.seed(gray);
            mask.fill(MASK_BACKGROUND);
            return Ok(());
        }

        self.frames_seen += 1;
        #[allow(clippy::cast_precision_loss)] // history is a small frame count
        let alpha = 1.0 / self.frames_seen.min(self.history) as f32;
        let var_threshold = self.var_threshold;

        Zip::from(mask)
            .and(gray)
            .and(&mut self.mean)
            .and(&mut self.variance)
            .for_each(|m, &g, mean, var| {
                let diff = f32::from(g) - *mean;
                let dist2 = diff * diff;
                *m = if dist2 > var_threshold * *var {
                    MASK_FOREGROUND
                } else {
                    MASK_BACKGROUND
                };
                *mean += alpha * diff;
                *var = (*var + alpha * (dist2 - *var)).clamp(BACKGROUND_VAR_MIN, BACKGROUND_VAR_MAX);
            });

        Ok(())
    }

    fn seed(&mut self, gray: &Array2<u8>) {
        self.mean = gray.mapv(f32::from);
        self.variance = Array2::from_elem(gray.dim(), BACKGROUND_VAR_INIT);
        self.frames_seen = 1;
    }

    #[must_use]
    pub const fn frames_seen(&self) -> usize {
        self.frames_seen
    }
}

impl Drop for BackgroundModel {
    fn drop(&mut self) {
        log::debug!("Background model released after {} frames", self.frames_seen);
    }
}
