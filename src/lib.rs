//! Gaze attention tracking and desk-surface change detection.
//!
//! This library provides two frame-driven pipelines:
//! - **Gaze**: head pose from six facial landmarks, per-eye gaze vectors with
//!   the head rotation removed, and a per-second majority vote of whether the
//!   user is looking at the screen
//! - **Check**: an adaptive background model, Hough line detection on the
//!   foreground mask, a temporal persistence trigger, and asynchronous
//!   verification of each trigger by an external oracle
//!
//! Landmark detection, the oracle service and the display are external and
//! reached through the [`landmarks::LandmarkDetector`],
//! [`verification::Oracle`] and [`overlay::DisplaySurface`] traits.
//!
//! # Examples
//!
//! ## Pose Round Trip
//!
//! ```
//! use gaze_monitor::geometry::{project_points, solve_pose, CameraModel, PoseEstimate};
//! use gaze_monitor::pose_estimation::FaceModel;
//! use nalgebra::Vector3;
//!
//! # fn main() -> gaze_monitor::Result<()> {
//! let camera = CameraModel::from_frame_size(640, 480);
//! let model = FaceModel::canonical();
//! let truth = PoseEstimate {
//!     rotation: Vector3::new(std::f64::consts::PI - 0.1, 0.15, 0.05),
//!     translation: Vector3::new(20.0, -10.0, 600.0),
//!     reprojection_error: 0.0,
//! };
//! let image = project_points(model.points(), &truth, &camera);
//!
//! let pose = solve_pose(model.points(), &image, &camera)?;
//! assert!(pose.reprojection_error < 1e-3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Line Clustering
//!
//! ```
//! use gaze_monitor::line_detection::{cluster_lines, is_approximately_vertical_or_horizontal, LineObservation};
//!
//! let tolerance = 15f64.to_radians();
//! let lines: Vec<LineObservation> = [(100.0, 0.0), (108.0, 0.02), (240.0, 1.57), (50.0, 0.78)]
//!     .into_iter()
//!     .map(|(rho, theta)| LineObservation::new(rho, theta))
//!     .filter(|l| is_approximately_vertical_or_horizontal(l.theta, tolerance))
//!     .collect();
//!
//! let clusters = cluster_lines(&lines, 20.0, tolerance);
//! assert_eq!(clusters.len(), 2);
//! ```
//!
//! ## Replaying a Recording
//!
//! ```no_run
//! use gaze_monitor::{
//!     app::{Mode, MonitorApp},
//!     config::Config,
//!     overlay::NullSurface,
//!     recording::LandmarkRecording,
//!     verification::StaticOracle,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> gaze_monitor::Result<()> {
//! let (frames, landmarks) = LandmarkRecording::from_file("session.jsonl")?.into_sources();
//! let mut app = MonitorApp::new(
//!     Config::default(),
//!     Box::new(frames),
//!     Box::new(landmarks),
//!     NullSurface,
//!     Arc::new(StaticOracle::new(false, "")),
//! )?;
//! app.set_mode(Mode::Gaze)?;
//! app.start_tracking_at_next_frame()?;
//! app.run()?;
//!
//! for record in app.tracking_log() {
//!     println!("{} ms: looking={}", record.timestamp_ms, record.looking);
//! }
//! # Ok(())
//! # }
//! ```

/// Dense matrix kernel, camera model and pose solver
pub mod geometry;

/// Facial landmark sets and the detector boundary
pub mod landmarks;

/// Canonical face model, affine lift and head pose
pub mod pose_estimation;

/// Per-eye gaze vectors
pub mod gaze;

/// Looking classification and tracking log
pub mod attention;

/// Adaptive background subtraction
pub mod background;

/// Reusable per-session image buffers
pub mod buffers;

/// Hough line detection and clustering
pub mod line_detection;

/// Temporal persistence trigger
pub mod trigger;

/// Detection events and oracle verification
pub mod verification;

/// Video frames and frame sources
pub mod frame;

/// Display surface and overlays
pub mod overlay;

/// Offline frame and landmark sources
pub mod recording;

/// Utility functions for image conversion and numeric casts
pub mod utils;

/// Error types and result handling
pub mod error;

/// Main application module
pub mod app;

/// Constants used throughout the application
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
