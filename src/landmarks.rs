//! Facial landmark sets and the detector boundary.
//!
//! The landmark detector itself is external; this module defines the shape
//! of its output and the trait the application pulls landmark sets through.

use crate::{constants::MIN_FACE_LANDMARKS, frame::Frame, Error, Result};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One normalized landmark: `x`, `y` in `[0, 1]` of the frame, `z` relative depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// All landmarks for one face in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl TryFrom<Vec<Landmark>> for LandmarkSet {
    type Error = Error;

    fn try_from(points: Vec<Landmark>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<LandmarkSet> for Vec<Landmark> {
    fn from(set: LandmarkSet) -> Self {
        set.points
    }
}

impl LandmarkSet {
    /// Wrap a detector output
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Fewer than 468 landmarks are supplied
    /// - Any coordinate is NaN or infinite
    pub fn new(points: Vec<Landmark>) -> Result<Self> {
        if points.len() < MIN_FACE_LANDMARKS {
            return Err(Error::InvalidInput(format!(
                "Expected at least {} landmarks, got {}",
                MIN_FACE_LANDMARKS,
                points.len()
            )));
        }
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(Error::InvalidInput(format!("Landmark {index} has a non-finite coordinate")));
        }
        Ok(Self { points })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Landmark at `index`
    ///
    /// # Errors
    ///
    /// Returns an error if the set does not contain `index`
    pub fn get(&self, index: usize) -> Result<&Landmark> {
        self.points.get(index).ok_or(Error::LandmarkOutOfRange {
            index,
            len: self.points.len(),
        })
    }

    /// Landmark at `index` scaled to pixel coordinates
    ///
    /// # Errors
    ///
    /// Returns an error if the set does not contain `index`
    pub fn pixel(&self, index: usize, width: u32, height: u32) -> Result<Point2<f64>> {
        let lm = self.get(index)?;
        Ok(Point2::new(lm.x * f64::from(width), lm.y * f64::from(height)))
    }
}

/// Source of per-frame landmark sets (zero or one face)
pub trait LandmarkDetector {
    /// Detect faces in `frame`; an empty result means no attention signal this frame
    ///
    /// # Errors
    ///
    /// Returns an error if the detector itself fails
    fn detect(&mut self, frame: &Frame) -> Result<Vec<LandmarkSet>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_set(len: usize) -> Vec<Landmark> {
        vec![Landmark::new(0.5, 0.25, 0.0); len]
    }

    #[test]
    fn test_landmark_set_requires_full_mesh() {
        assert!(LandmarkSet::new(uniform_set(467)).is_err());
        assert!(LandmarkSet::new(uniform_set(468)).is_ok());
    }

    #[test]
    fn test_pixel_scaling() {
        let set = LandmarkSet::new(uniform_set(478)).unwrap();
        let p = set.pixel(10, 640, 480).unwrap();
        assert_eq!(p.x, 320.0);
        assert_eq!(p.y, 120.0);
    }

    #[test]
    fn test_out_of_range_index() {
        let set = LandmarkSet::new(uniform_set(468)).unwrap();
        match set.get(473) {
            Err(Error::LandmarkOutOfRange { index, len }) => {
                assert_eq!(index, 473);
                assert_eq!(len, 468);
            }
            other => panic!("Expected LandmarkOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_validates_length() {
        let short = serde_json::to_string(&uniform_set(10)).unwrap();
        assert!(serde_json::from_str::<LandmarkSet>(&short).is_err());

        let full = serde_json::to_string(&uniform_set(478)).unwrap();
        let set: LandmarkSet = serde_json::from_str(&full).unwrap();
        assert_eq!(set.len(), 478);
    }
}
