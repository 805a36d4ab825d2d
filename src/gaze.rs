//! Per-eye gaze vectors with the head-rotation component removed.
//!
//! Each pupil is lifted into face-model space through the frame's affine
//! map, pushed away from its eyeball center by a fixed gain, and projected
//! back. Subtracting the projection of a straight-ahead point at the same
//! model position leaves the apparent eye motion not explained by the head.

use crate::{
    constants::{DEFAULT_GAZE_GAIN, DEFAULT_HEAD_POSE_DEPTH, LEFT_EYE_CENTER, LEFT_PUPIL_INDEX, RIGHT_EYE_CENTER, RIGHT_PUPIL_INDEX},
    geometry::project_point,
    landmarks::LandmarkSet,
    pose_estimation::{HeadPose, PoseEstimator},
    Result,
};
use nalgebra::{Point2, Point3};
use serde::Serialize;

/// Pupil position and the on-screen end of its gaze line
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GazeSample {
    /// Pupil location in pixels
    pub pupil: Point2<f64>,
    /// Gaze endpoint in pixels
    pub endpoint: Point2<f64>,
}

impl GazeSample {
    #[must_use]
    pub const fn new(pupil: Point2<f64>, endpoint: Point2<f64>) -> Self {
        Self { pupil, endpoint }
    }
}

/// Gaze samples for both eyes in one frame
#[derive(Debug, Clone, Copy)]
pub struct GazeEstimate {
    pub left: GazeSample,
    pub right: GazeSample,
    pub head: HeadPose,
}

/// Gaze tuning parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeParams {
    /// Multiplier applied to the pupil offset from the eyeball center
    pub gain: f64,
    /// Model-space z of the synthetic straight-ahead point (millimeters)
    pub head_pose_depth: f64,
}

impl Default for GazeParams {
    fn default() -> Self {
        Self {
            gain: DEFAULT_GAZE_GAIN,
            head_pose_depth: DEFAULT_HEAD_POSE_DEPTH,
        }
    }
}

/// Gaze estimator combining head pose with pupil landmarks
#[derive(Debug, Clone)]
pub struct GazeEstimator {
    pose_estimator: PoseEstimator,
    params: GazeParams,
    left_eye_center: Point3<f64>,
    right_eye_center: Point3<f64>,
}

impl GazeEstimator {
    #[must_use]
    pub fn new(pose_estimator: PoseEstimator, params: GazeParams) -> Self {
        Self {
            pose_estimator,
            params,
            left_eye_center: Point3::from(LEFT_EYE_CENTER),
            right_eye_center: Point3::from(RIGHT_EYE_CENTER),
        }
    }

    #[must_use]
    pub const fn pose_estimator(&self) -> &PoseEstimator {
        &self.pose_estimator
    }

    /// Estimate both gaze samples for one face
    ///
    /// Returns `Ok(None)` when the affine fit was not possible; no gaze
    /// sample exists for that frame.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The landmark set lacks a pose or pupil index
    /// - The pose solver fails
    pub fn estimate(&self, landmarks: &LandmarkSet, width: u32, height: u32) -> Result<Option<GazeEstimate>> {
        let left_pupil = landmarks.pixel(LEFT_PUPIL_INDEX, width, height)?;
        let right_pupil = landmarks.pixel(RIGHT_PUPIL_INDEX, width, height)?;

        let Some(head) = self.pose_estimator.estimate(landmarks, width, height)? else {
            return Ok(None);
        };

        Ok(Some(GazeEstimate {
            left: self.eye_gaze(&head, left_pupil, &self.left_eye_center),
            right: self.eye_gaze(&head, right_pupil, &self.right_eye_center),
            head,
        }))
    }

    /// Gaze endpoint for a single pupil
    #[must_use]
    pub fn eye_gaze(&self, head: &HeadPose, pupil: Point2<f64>, eye_center: &Point3<f64>) -> GazeSample {
        let pupil_model = head.affine.apply_pixel(&pupil);

        let offset = pupil_model - eye_center;
        let target = eye_center + offset * self.params.gain;
        let target_projection = project_point(&target, &head.pose, &head.camera);

        let straight_ahead = Point3::new(pupil_model.x, pupil_model.y, self.params.head_pose_depth);
        let head_projection = project_point(&straight_ahead, &head.pose, &head.camera);

        let endpoint = Point2::new(
            pupil.x + (target_projection.x - pupil.x) - (head_projection.x - pupil.x),
            pupil.y + (target_projection.y - pupil.y) - (head_projection.y - pupil.y),
        );

        GazeSample { pupil, endpoint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::{CameraModel, PoseEstimate},
        pose_estimation::AffineTransform,
    };
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3x4, Vector3};

    fn identity_head() -> HeadPose {
        HeadPose {
            camera: CameraModel::from_frame_size(640, 480),
            pose: PoseEstimate {
                rotation: Vector3::zeros(),
                translation: Vector3::new(0.0, 0.0, 500.0),
                reprojection_error: 0.0,
            },
            affine: AffineTransform::from_matrix(Matrix3x4::new(
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0, 0.0,
            )),
        }
    }

    #[test]
    fn test_pupil_on_straight_ahead_point_has_no_deviation() {
        // Unit gain puts the target on the lifted pupil; a zero straight-ahead
        // depth puts the head point there too, so both projections cancel.
        let estimator = GazeEstimator::new(
            PoseEstimator::default(),
            GazeParams {
                gain: 1.0,
                head_pose_depth: 0.0,
            },
        );
        let head = identity_head();
        let center = Point3::new(5.0, 3.0, -40.0);
        let sample = estimator.eye_gaze(&head, Point2::new(12.0, -7.0), &center);
        assert_relative_eq!(sample.endpoint, sample.pupil, epsilon = 1e-9);
    }

    #[test]
    fn test_gain_exaggerates_offset() {
        let estimator = GazeEstimator::new(PoseEstimator::default(), GazeParams::default());
        let head = identity_head();
        let center = Point3::new(0.0, 0.0, 40.0);
        let near = estimator.eye_gaze(&head, Point2::new(1.0, 0.0), &center);
        let far = estimator.eye_gaze(&head, Point2::new(2.0, 0.0), &center);
        let near_dev = (near.endpoint - near.pupil).norm();
        let far_dev = (far.endpoint - far.pupil).norm();
        assert!(far_dev > near_dev);
    }
}
