//! Error types for the gaze monitor library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding or decoding failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Landmark recording could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Matrix operands have incompatible shapes
    #[error("Dimension mismatch in {operation}: {left:?} vs {right:?}")]
    DimensionMismatch {
        /// Name of the failing operation
        operation: &'static str,
        /// Shape (rows, cols) of the left operand
        left: (usize, usize),
        /// Shape (rows, cols) of the right operand
        right: (usize, usize),
    },

    /// Matrix decomposition did not produce a usable result
    #[error("Decomposition error: {0}")]
    Decomposition(String),

    /// Too few point correspondences for an estimation step
    #[error("Not enough points: {required} required, {found} found")]
    InsufficientCorrespondences {
        /// Minimum number of correspondences
        required: usize,
        /// Number supplied
        found: usize,
    },

    /// Landmark set does not cover the indices the estimator reads
    #[error("Landmark set too small: index {index} requested, {len} available")]
    LandmarkOutOfRange {
        /// Requested landmark index
        index: usize,
        /// Number of landmarks in the set
        len: usize,
    },

    /// Pose solver produced a non-finite or diverged solution
    #[error("Pose solver error: {0}")]
    PoseSolve(String),

    /// Face model file is malformed
    #[error("Face model error: {0}")]
    FaceModel(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// External oracle call failed
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Verification worker is gone or its queue is closed
    #[error("Verification worker unavailable: {0}")]
    WorkerUnavailable(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
