//! Pinhole camera model, point projection and iterative pose solving.

use super::matrix::{invert, matmul, transpose};
use crate::{
    constants::{CAMERA_CENTER_FACTOR, EPSILON, MIN_POSE_CORRESPONDENCES},
    Error, Result,
};
use nalgebra::{DMatrix, DVector, Matrix3, Point2, Point3, Rotation3, Vector3};
use serde::Serialize;

/// Levenberg-Marquardt iteration cap
const MAX_ITERATIONS: usize = 100;

/// Damping bounds for Levenberg-Marquardt
const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e12;

/// Step size for the finite-difference Jacobian
const JACOBIAN_STEP: f64 = 1e-6;

/// Minimum correspondences for the linear (DLT) initial guess
const DLT_MIN_POINTS: usize = 6;

/// Pinhole camera without lens distortion
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraModel {
    /// Focal length in pixels (same for both axes)
    pub focal_length: f64,
    /// Principal point x
    pub cx: f64,
    /// Principal point y
    pub cy: f64,
}

impl CameraModel {
    /// Approximate camera for a frame: focal length = frame width, principal point = frame center
    #[must_use]
    pub fn from_frame_size(width: u32, height: u32) -> Self {
        let focal_length = f64::from(width);
        Self {
            focal_length,
            cx: f64::from(width) / CAMERA_CENTER_FACTOR,
            cy: f64::from(height) / CAMERA_CENTER_FACTOR,
        }
    }

    /// The 3x3 intrinsic matrix
    #[must_use]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focal_length,
            0.0,
            self.cx,
            0.0,
            self.focal_length,
            self.cy,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Project a point given in camera coordinates
    #[must_use]
    pub fn project_camera_point(&self, p: &Vector3<f64>) -> Point2<f64> {
        let z = if p.z.abs() < EPSILON { EPSILON.copysign(p.z) } else { p.z };
        Point2::new(
            self.focal_length * p.x / z + self.cx,
            self.focal_length * p.y / z + self.cy,
        )
    }

    /// Convert a pixel to normalized image coordinates
    fn normalize(&self, p: &Point2<f64>) -> (f64, f64) {
        ((p.x - self.cx) / self.focal_length, (p.y - self.cy) / self.focal_length)
    }
}

/// Head rotation (axis-angle) and translation for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoseEstimate {
    /// Rotation vector (Rodrigues)
    pub rotation: Vector3<f64>,
    /// Translation vector
    pub translation: Vector3<f64>,
    /// Root-mean-square reprojection error in pixels
    pub reprojection_error: f64,
}

impl PoseEstimate {
    /// Rotation matrix for this pose
    #[must_use]
    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        Rotation3::from_scaled_axis(self.rotation)
    }

    /// Transform a model point into camera coordinates
    #[must_use]
    pub fn transform(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.rotation_matrix() * p.coords + self.translation
    }
}

/// Project 3D model points to pixels through a pose and camera
#[must_use]
pub fn project_points(points: &[Point3<f64>], pose: &PoseEstimate, camera: &CameraModel) -> Vec<Point2<f64>> {
    let rotation = pose.rotation_matrix();
    points
        .iter()
        .map(|p| camera.project_camera_point(&(rotation * p.coords + pose.translation)))
        .collect()
}

/// Project a single model point
#[must_use]
pub fn project_point(point: &Point3<f64>, pose: &PoseEstimate, camera: &CameraModel) -> Point2<f64> {
    camera.project_camera_point(&pose.transform(point))
}

/// Recover the pose mapping `world_points` onto `image_points`
///
/// A linear estimate (when at least six points are available) and a
/// frontal-face estimate are both refined with Levenberg-Marquardt on the
/// reprojection error; the better of the two is returned. Degenerate or
/// near-planar inputs may converge to a local minimum.
///
/// # Errors
///
/// Returns an error if:
/// - The two point lists differ in length
/// - Fewer than four correspondences are given
/// - No candidate converges to a finite solution
pub fn solve_pose(world_points: &[Point3<f64>], image_points: &[Point2<f64>], camera: &CameraModel) -> Result<PoseEstimate> {
    if world_points.len() != image_points.len() {
        return Err(Error::InvalidInput(format!(
            "Expected matching point counts, got {} world and {} image points",
            world_points.len(),
            image_points.len()
        )));
    }
    if world_points.len() < MIN_POSE_CORRESPONDENCES {
        return Err(Error::InsufficientCorrespondences {
            required: MIN_POSE_CORRESPONDENCES,
            found: world_points.len(),
        });
    }

    let mut candidates = Vec::with_capacity(2);
    if world_points.len() >= DLT_MIN_POINTS {
        match linear_initial_guess(world_points, image_points, camera) {
            Ok(guess) => candidates.push(guess),
            Err(e) => log::debug!("Linear pose guess unavailable: {e}"),
        }
    }
    candidates.push(frontal_initial_guess(world_points, image_points, camera));

    let mut best: Option<PoseEstimate> = None;
    for guess in candidates {
        let refined = refine_pose(world_points, image_points, camera, guess);
        if !refined.reprojection_error.is_finite() {
            continue;
        }
        if best.map_or(true, |b| refined.reprojection_error < b.reprojection_error) {
            best = Some(refined);
        }
    }

    best.ok_or_else(|| Error::PoseSolve("No pose candidate converged".to_string()))
}

/// Linear pose from the projection matrix null space
fn linear_initial_guess(
    world_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    camera: &CameraModel,
) -> Result<[f64; 6]> {
    let n = world_points.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 12);

    for (i, (obj, pix)) in world_points.iter().zip(image_points.iter()).enumerate() {
        let (xn, yn) = camera.normalize(pix);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = obj.x;
        a[(r0, 1)] = obj.y;
        a[(r0, 2)] = obj.z;
        a[(r0, 3)] = 1.0;
        a[(r0, 8)] = -xn * obj.x;
        a[(r0, 9)] = -xn * obj.y;
        a[(r0, 10)] = -xn * obj.z;
        a[(r0, 11)] = -xn;

        a[(r1, 4)] = obj.x;
        a[(r1, 5)] = obj.y;
        a[(r1, 6)] = obj.z;
        a[(r1, 7)] = 1.0;
        a[(r1, 8)] = -yn * obj.x;
        a[(r1, 9)] = -yn * obj.y;
        a[(r1, 10)] = -yn * obj.z;
        a[(r1, 11)] = -yn;
    }

    let svd = a.svd(true, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| Error::Decomposition("SVD V^T missing in linear pose".to_string()))?;
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.total_cmp(y.1))
        .map(|(i, _)| i)
        .ok_or_else(|| Error::Decomposition("Empty singular values".to_string()))?;
    let p = v_t.row(smallest);

    let m = Matrix3::new(p[0], p[1], p[2], p[4], p[5], p[6], p[8], p[9], p[10]);
    let mut t = Vector3::new(p[3], p[7], p[11]);

    let svd_m = m.svd(true, true);
    let (u, v_t_m) = match (svd_m.u, svd_m.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(Error::Decomposition("SVD factors missing in linear pose".to_string())),
    };
    let scale = svd_m.singular_values.sum() / 3.0;
    if scale.abs() < EPSILON {
        return Err(Error::PoseSolve("Degenerate linear pose scale".to_string()));
    }

    let mut r = u * v_t_m;
    t /= scale;
    if r.determinant() < 0.0 {
        r = -r;
        t = -t;
    }

    let rotation = Rotation3::from_matrix_unchecked(r).scaled_axis();
    Ok([rotation.x, rotation.y, rotation.z, t.x, t.y, t.z])
}

/// Face turned toward the camera (model y up, image y down), depth from scale
fn frontal_initial_guess(world_points: &[Point3<f64>], image_points: &[Point2<f64>], camera: &CameraModel) -> [f64; 6] {
    let n = world_points.len() as f64;
    let world_centroid = world_points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let (u_sum, v_sum) = image_points.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.x, acc.1 + p.y));
    let (u, v) = (u_sum / n, v_sum / n);

    let world_spread = world_points
        .iter()
        .map(|p| (p.coords - world_centroid).xy().norm_squared())
        .sum::<f64>()
        .sqrt();
    let image_spread = image_points
        .iter()
        .map(|p| (p.x - u).powi(2) + (p.y - v).powi(2))
        .sum::<f64>()
        .sqrt();

    let depth = if image_spread > EPSILON {
        camera.focal_length * world_spread / image_spread
    } else {
        camera.focal_length
    };

    let rotation = Vector3::new(std::f64::consts::PI, 0.0, 0.0);
    let rotated_centroid = Rotation3::from_scaled_axis(rotation) * world_centroid;
    let t = Vector3::new(
        (u - camera.cx) * depth / camera.focal_length - rotated_centroid.x,
        (v - camera.cy) * depth / camera.focal_length - rotated_centroid.y,
        depth - rotated_centroid.z,
    );

    [rotation.x, rotation.y, rotation.z, t.x, t.y, t.z]
}

fn pose_from_params(params: &[f64; 6]) -> PoseEstimate {
    PoseEstimate {
        rotation: Vector3::new(params[0], params[1], params[2]),
        translation: Vector3::new(params[3], params[4], params[5]),
        reprojection_error: f64::INFINITY,
    }
}

fn residuals(world_points: &[Point3<f64>], image_points: &[Point2<f64>], camera: &CameraModel, params: &[f64; 6]) -> DVector<f64> {
    let pose = pose_from_params(params);
    let projected = project_points(world_points, &pose, camera);
    let mut r = DVector::zeros(2 * image_points.len());
    for (i, (p, obs)) in projected.iter().zip(image_points.iter()).enumerate() {
        r[2 * i] = p.x - obs.x;
        r[2 * i + 1] = p.y - obs.y;
    }
    r
}

fn rms(r: &DVector<f64>) -> f64 {
    if r.is_empty() {
        return 0.0;
    }
    (r.norm_squared() / (r.len() / 2).max(1) as f64).sqrt()
}

/// Levenberg-Marquardt refinement of the reprojection error
fn refine_pose(
    world_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    camera: &CameraModel,
    initial: [f64; 6],
) -> PoseEstimate {
    let mut params = initial;
    let mut r = residuals(world_points, image_points, camera, &params);
    let mut cost = r.norm_squared();
    let mut damping = INITIAL_DAMPING;

    for _ in 0..MAX_ITERATIONS {
        if !cost.is_finite() {
            break;
        }

        let mut jacobian = DMatrix::<f64>::zeros(r.len(), 6);
        for k in 0..6 {
            let step = JACOBIAN_STEP * params[k].abs().max(1.0);
            let mut shifted = params;
            shifted[k] += step;
            let r_shifted = residuals(world_points, image_points, camera, &shifted);
            jacobian.set_column(k, &((r_shifted - &r) / step));
        }

        let jt = transpose(&jacobian);
        let Ok(jtj) = matmul(&jt, &jacobian) else { break };
        let gradient = &jt * &r;

        let mut improved = false;
        while damping < MAX_DAMPING {
            let mut system = jtj.clone();
            for k in 0..6 {
                system[(k, k)] += damping * (jtj[(k, k)] + EPSILON);
            }
            let Ok(system_inv) = invert(&system) else { break };
            let delta = -(system_inv * &gradient);

            let mut candidate = params;
            for k in 0..6 {
                candidate[k] += delta[k];
            }
            let r_candidate = residuals(world_points, image_points, camera, &candidate);
            let candidate_cost = r_candidate.norm_squared();

            if candidate_cost.is_finite() && candidate_cost < cost {
                let converged = delta.norm() < 1e-12 || (cost - candidate_cost) < 1e-14 * cost.max(1.0);
                params = candidate;
                r = r_candidate;
                cost = candidate_cost;
                damping = (damping / 10.0).max(1e-12);
                improved = !converged;
                break;
            }
            damping *= 10.0;
        }

        if !improved {
            break;
        }
    }

    let mut pose = pose_from_params(&params);
    pose.reprojection_error = rms(&r);
    pose
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CANONICAL_FACE_MODEL;
    use approx::assert_relative_eq;

    fn canonical_points() -> Vec<Point3<f64>> {
        CANONICAL_FACE_MODEL.iter().map(|p| Point3::new(p[0], p[1], p[2])).collect()
    }

    #[test]
    fn test_camera_from_frame_size() {
        let camera = CameraModel::from_frame_size(640, 480);
        assert_relative_eq!(camera.focal_length, 640.0);
        assert_relative_eq!(camera.cx, 320.0);
        assert_relative_eq!(camera.cy, 240.0);
        assert_relative_eq!(camera.matrix()[(2, 2)], 1.0);
    }

    #[test]
    fn test_project_principal_axis() {
        let camera = CameraModel::from_frame_size(640, 480);
        let pose = PoseEstimate {
            rotation: Vector3::zeros(),
            translation: Vector3::new(0.0, 0.0, 500.0),
            reprojection_error: 0.0,
        };
        let p = project_point(&Point3::origin(), &pose, &camera);
        assert_relative_eq!(p.x, 320.0);
        assert_relative_eq!(p.y, 240.0);
    }

    #[test]
    fn test_solve_pose_recovers_synthetic_pose() {
        let camera = CameraModel::from_frame_size(640, 480);
        let truth = PoseEstimate {
            rotation: Vector3::new(std::f64::consts::PI - 0.1, 0.15, 0.05),
            translation: Vector3::new(20.0, -10.0, 600.0),
            reprojection_error: 0.0,
        };
        let world = canonical_points();
        let image = project_points(&world, &truth, &camera);

        let pose = solve_pose(&world, &image, &camera).unwrap();
        assert!(pose.reprojection_error < 1e-3, "error {}", pose.reprojection_error);
        assert!(pose.translation.z > 0.0);
    }

    #[test]
    fn test_solve_pose_rejects_mismatched_lengths() {
        let camera = CameraModel::from_frame_size(640, 480);
        let world = canonical_points();
        let image = vec![Point2::new(0.0, 0.0); 5];
        assert!(solve_pose(&world, &image, &camera).is_err());
    }

    #[test]
    fn test_solve_pose_rejects_too_few_points() {
        let camera = CameraModel::from_frame_size(640, 480);
        let world = canonical_points()[..3].to_vec();
        let image = vec![Point2::new(0.0, 0.0); 3];
        match solve_pose(&world, &image, &camera) {
            Err(Error::InsufficientCorrespondences { required, found }) => {
                assert_eq!(required, 4);
                assert_eq!(found, 3);
            }
            other => panic!("Expected InsufficientCorrespondences, got {other:?}"),
        }
    }
}
