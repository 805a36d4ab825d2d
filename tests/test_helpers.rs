//! Helper functions and utilities for tests

#![allow(dead_code)]

use gaze_monitor::{
    constants::{LEFT_EYE_CENTER, LEFT_PUPIL_INDEX, RIGHT_EYE_CENTER, RIGHT_PUPIL_INDEX},
    frame::Frame,
    geometry::{project_point, project_points, CameraModel, PoseEstimate},
    landmarks::{Landmark, LandmarkDetector, LandmarkSet},
    pose_estimation::FaceModel,
    Result,
};
use nalgebra::{Point2, Point3, Vector2, Vector3};

/// Full mesh size including the iris points
pub const MESH_SIZE: usize = 478;

/// Face squarely facing the camera, 600 mm away
pub fn frontal_pose() -> PoseEstimate {
    PoseEstimate {
        rotation: Vector3::new(std::f64::consts::PI, 0.0, 0.0),
        translation: Vector3::new(0.0, 0.0, 600.0),
        reprojection_error: 0.0,
    }
}

/// Landmark set whose pose points are the canonical model seen through `pose`
///
/// Each pupil sits on the projection of its eyeball center, moved by `pupil_shift` pixels.
pub fn synthetic_face(width: u32, height: u32, pose: &PoseEstimate, pupil_shift: Vector2<f64>) -> Result<LandmarkSet> {
    let camera = CameraModel::from_frame_size(width, height);
    let normalize = |p: Point2<f64>| Landmark::new(p.x / f64::from(width), p.y / f64::from(height), 0.0);

    let mut points = vec![Landmark::new(0.5, 0.5, 0.0); MESH_SIZE];
    let model = FaceModel::canonical();
    for (&index, &pixel) in model
        .landmark_indices()
        .iter()
        .zip(&project_points(model.points(), pose, &camera))
    {
        points[index] = normalize(pixel);
    }
    for (index, center) in [(LEFT_PUPIL_INDEX, LEFT_EYE_CENTER), (RIGHT_PUPIL_INDEX, RIGHT_EYE_CENTER)] {
        let pupil = project_point(&Point3::from(center), pose, &camera) + pupil_shift;
        points[index] = normalize(pupil);
    }
    LandmarkSet::new(points)
}

/// Opaque black frame
pub fn blank_frame(width: u32, height: u32, timestamp_ms: u64) -> Frame {
    Frame::filled(width, height, [0, 0, 0, 255], timestamp_ms).unwrap()
}

/// Frame with a one-pixel white column at `x`
pub fn frame_with_column(width: u32, height: u32, x: u32, timestamp_ms: u64) -> Frame {
    let mut frame = blank_frame(width, height, timestamp_ms);
    let stride = width as usize * 4;
    for y in 0..height as usize {
        let i = y * stride + x as usize * 4;
        frame.pixels_mut()[i..i + 3].copy_from_slice(&[255, 255, 255]);
    }
    frame
}

/// Detector that reports the same face on every frame
pub struct RepeatingDetector {
    pub face: LandmarkSet,
}

impl LandmarkDetector for RepeatingDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<LandmarkSet>> {
        Ok(vec![self.face.clone()])
    }
}

/// Assert that a point contains finite values
pub fn assert_point_finite(p: &Point2<f64>) {
    assert!(p.x.is_finite() && p.y.is_finite(), "non-finite point {p:?}");
}
