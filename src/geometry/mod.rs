//! Geometry kernel: dense matrix operations and the pinhole camera model.
//!
//! Both pipelines' pose math goes through this module. Matrix helpers
//! operate on `nalgebra::DMatrix<f64>` and fail with
//! [`crate::Error::DimensionMismatch`] rather than panicking.

/// Transpose, multiply-accumulate, SVD inversion and least squares
pub mod matrix;

/// Camera intrinsics, projection and pose solving
pub mod camera;

pub use camera::{project_point, project_points, solve_pose, CameraModel, PoseEstimate};
pub use matrix::{gemm, invert, matmul, solve_least_squares, transpose};
