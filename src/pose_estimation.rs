use crate::{
    constants::{CANONICAL_FACE_MODEL, MIN_AFFINE_CORRESPONDENCES, POSE_LANDMARK_INDICES},
    geometry::{matrix::solve_least_squares, solve_pose, CameraModel, PoseEstimate},
    landmarks::LandmarkSet,
    Error, Result,
};
use nalgebra::{DMatrix, Matrix3x4, Point2, Point3, Vector3, Vector4};
use std::fs;
use std::path::Path;

/// Canonical 3D face geometry paired with the landmark indices it corresponds to
#[derive(Debug, Clone, PartialEq)]
pub struct FaceModel {
    landmark_indices: Vec<usize>,
    points: Vec<Point3<f64>>,
}

impl Default for FaceModel {
    fn default() -> Self {
        Self::canonical()
    }
}

impl FaceModel {
    /// Built-in six-point model: nose tip, chin, eye outer corners, mouth corners
    #[must_use]
    pub fn canonical() -> Self {
        Self {
            landmark_indices: POSE_LANDMARK_INDICES.to_vec(),
            points: CANONICAL_FACE_MODEL
                .iter()
                .map(|p| Point3::new(p[0], p[1], p[2]))
                .collect(),
        }
    }

    /// Build a model from explicit correspondences
    ///
    /// # Errors
    ///
    /// Returns an error if the lists are empty or differ in length
    pub fn new(landmark_indices: Vec<usize>, points: Vec<Point3<f64>>) -> Result<Self> {
        if landmark_indices.is_empty() || landmark_indices.len() != points.len() {
            return Err(Error::FaceModel(format!(
                "Expected matching non-empty index and point lists, got {} indices and {} points",
                landmark_indices.len(),
                points.len()
            )));
        }
        Ok(Self { landmark_indices, points })
    }

    /// Load a model file with one `landmark_index x y z` entry per line
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Loading face model: {}", path.as_ref().display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse model text; blank lines and `#` comments are skipped
    fn parse(content: &str) -> Result<Self> {
        let mut indices = Vec::new();
        let mut points = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(Error::FaceModel(format!(
                    "Line {}: expected 4 fields (index x y z), got {}",
                    line_no + 1,
                    fields.len()
                )));
            }

            let index = fields[0]
                .parse::<usize>()
                .map_err(|e| Error::FaceModel(format!("Line {}: bad landmark index: {e}", line_no + 1)))?;
            let mut coords = [0.0; 3];
            for (slot, field) in coords.iter_mut().zip(&fields[1..]) {
                *slot = field
                    .parse::<f64>()
                    .map_err(|e| Error::FaceModel(format!("Line {}: bad coordinate: {e}", line_no + 1)))?;
            }

            indices.push(index);
            points.push(Point3::new(coords[0], coords[1], coords[2]));
        }

        Self::new(indices, points)
    }

    #[must_use]
    pub fn landmark_indices(&self) -> &[usize] {
        &self.landmark_indices
    }

    #[must_use]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// 3x4 affine map from the image plane (z = 0) into face-model space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3x4<f64>,
}

impl AffineTransform {
    #[must_use]
    pub const fn from_matrix(matrix: Matrix3x4<f64>) -> Self {
        Self { matrix }
    }

    #[must_use]
    pub const fn matrix(&self) -> &Matrix3x4<f64> {
        &self.matrix
    }

    /// Map a point through the transform
    #[must_use]
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.matrix * Vector4::new(p.x, p.y, p.z, 1.0))
    }

    /// Map an image pixel (z = 0) into model space
    #[must_use]
    pub fn apply_pixel(&self, p: &Point2<f64>) -> Point3<f64> {
        self.apply(&Point3::new(p.x, p.y, 0.0))
    }
}

/// Least-squares 3D affine fit mapping `src` onto `dst`
///
/// # Errors
///
/// Returns an error if:
/// - The point lists differ in length
/// - Fewer than four correspondences are given (`InsufficientCorrespondences`)
/// - The underlying matrix operations fail
pub fn estimate_affine_3d(src: &[Point3<f64>], dst: &[Point3<f64>]) -> Result<AffineTransform> {
    if src.len() != dst.len() {
        return Err(Error::InvalidInput(format!(
            "Expected matching point counts, got {} source and {} target points",
            src.len(),
            dst.len()
        )));
    }
    if src.len() < MIN_AFFINE_CORRESPONDENCES {
        return Err(Error::InsufficientCorrespondences {
            required: MIN_AFFINE_CORRESPONDENCES,
            found: src.len(),
        });
    }

    let n = src.len();
    let x = DMatrix::from_fn(n, 4, |r, c| match c {
        0 => src[r].x,
        1 => src[r].y,
        2 => src[r].z,
        _ => 1.0,
    });
    let y = DMatrix::from_fn(n, 3, |r, c| dst[r][c]);

    // A is 4x3; the transform is its transpose
    let a = solve_least_squares(&x, &y)?;
    let matrix = Matrix3x4::from_fn(|r, c| a[(c, r)]);
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(Error::Decomposition("Affine fit produced non-finite values".to_string()));
    }

    Ok(AffineTransform { matrix })
}

/// Head pose recovered for one frame
#[derive(Debug, Clone, Copy)]
pub struct HeadPose {
    /// Camera derived from the frame dimensions
    pub camera: CameraModel,
    /// Solved rotation / translation
    pub pose: PoseEstimate,
    /// Image-plane to model-space map
    pub affine: AffineTransform,
}

impl HeadPose {
    /// Pitch, yaw and roll in degrees
    #[must_use]
    pub fn euler_angles(&self) -> Vector3<f64> {
        let r = self.pose.rotation_matrix();
        let m = r.matrix();
        let pitch = (-m[(1, 2)]).clamp(-1.0, 1.0).asin();
        let yaw = m[(0, 2)].atan2(m[(2, 2)]);
        let roll = m[(1, 0)].atan2(m[(1, 1)]);
        Vector3::new(pitch.to_degrees(), yaw.to_degrees(), roll.to_degrees())
    }
}

/// Head pose estimator matching landmarks against a face model
#[derive(Debug, Clone, Default)]
pub struct PoseEstimator {
    model: FaceModel,
}

impl PoseEstimator {
    /// Create a pose estimator for a face model
    #[must_use]
    pub fn new(model: FaceModel) -> Self {
        log::info!("Initializing PoseEstimator with {} model points", model.len());
        Self { model }
    }

    #[must_use]
    pub const fn model(&self) -> &FaceModel {
        &self.model
    }

    /// Pixel coordinates of the model's landmarks in this frame
    ///
    /// # Errors
    ///
    /// Returns an error if the landmark set lacks one of the model's indices
    pub fn image_points(&self, landmarks: &LandmarkSet, width: u32, height: u32) -> Result<Vec<Point2<f64>>> {
        self.model
            .landmark_indices()
            .iter()
            .map(|&i| landmarks.pixel(i, width, height))
            .collect()
    }

    /// Estimate head pose and the affine map for one frame
    ///
    /// Returns `Ok(None)` when there are too few correspondences for the
    /// affine fit; the caller skips gaze for that frame.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The landmark set lacks one of the model's indices
    /// - The pose solver fails
    pub fn estimate(&self, landmarks: &LandmarkSet, width: u32, height: u32) -> Result<Option<HeadPose>> {
        let image_points = self.image_points(landmarks, width, height)?;
        self.estimate_from_points(&image_points, width, height)
    }

    /// Same as [`Self::estimate`] starting from already extracted pixels
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The number of pixels differs from the model size
    /// - The pose solver fails
    pub fn estimate_from_points(&self, image_points: &[Point2<f64>], width: u32, height: u32) -> Result<Option<HeadPose>> {
        if image_points.len() != self.model.len() {
            return Err(Error::InvalidInput(format!(
                "Expected {} image points, got {}",
                self.model.len(),
                image_points.len()
            )));
        }

        if image_points.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            log::debug!("Skipping pose: non-finite image point");
            return Ok(None);
        }

        let camera = CameraModel::from_frame_size(width, height);
        let plane_points: Vec<Point3<f64>> = image_points.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect();

        let affine = match estimate_affine_3d(&plane_points, self.model.points()) {
            Ok(affine) => affine,
            Err(Error::InsufficientCorrespondences { required, found }) => {
                log::debug!("Skipping gaze: affine fit needs {required} points, got {found}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let pose = solve_pose(self.model.points(), image_points, &camera)?;

        Ok(Some(HeadPose { camera, pose, affine }))
    }
}
