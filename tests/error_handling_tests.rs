//! Error handling tests for all modules

mod test_helpers;

use gaze_monitor::{
    app::{Mode, MonitorApp, StepOutcome},
    background::BackgroundModel,
    config::Config,
    frame::{Frame, FramePoll, FrameSource},
    gaze::GazeEstimator,
    landmarks::{Landmark, LandmarkDetector, LandmarkSet},
    line_detection::{hough_lines, hough_rho_bins, LineDetector, LineParams},
    overlay::NullSurface,
    pose_estimation::{FaceModel, PoseEstimator},
    recording::{FrameQueue, LandmarkRecording},
    utils::safe_cast::{f64_to_i64_clamp, i64_to_index},
    verification::{Oracle, StaticOracle, VerificationCoordinator},
    Error, Result,
};
use ndarray::Array2;
use std::{io::Write, sync::Arc, time::Duration};
use test_helpers::blank_frame;

struct BrokenDetector;

impl LandmarkDetector for BrokenDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<LandmarkSet>> {
        Err(Error::InvalidInput("camera unplugged".to_string()))
    }
}

struct BrokenSource;

impl FrameSource for BrokenSource {
    fn poll_frame(&mut self) -> Result<FramePoll> {
        Err(Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stream closed")))
    }
}

struct FailingOracle;

impl Oracle for FailingOracle {
    fn is_holding_document(&self, _image: &[u8]) -> Result<bool> {
        Err(Error::Oracle("service unavailable".to_string()))
    }

    fn extract_content(&self, _image: &[u8]) -> Result<String> {
        Err(Error::Oracle("service unavailable".to_string()))
    }
}

#[test]
fn test_frame_construction_errors() {
    assert!(Frame::new(vec![0; 10], 2, 2, 0).is_err());
    assert!(Frame::new(Vec::new(), 0, 0, 0).is_err());
    assert!(Frame::new(vec![0; 16], 2, 2, 0).is_ok());
}

#[test]
fn test_landmark_set_errors() {
    let short = LandmarkSet::new(vec![Landmark::new(0.1, 0.1, 0.0); 10]);
    assert!(short.is_err());

    let set = LandmarkSet::new(vec![Landmark::new(0.5, 0.5, 0.0); 468]).unwrap();
    assert!(matches!(set.get(473), Err(Error::LandmarkOutOfRange { index: 473, len: 468 })));

    // Pupils are missing from a 468-point mesh
    let estimator = GazeEstimator::new(PoseEstimator::default(), Default::default());
    assert!(matches!(estimator.estimate(&set, 640, 480), Err(Error::LandmarkOutOfRange { .. })));
}

#[test]
fn test_face_model_errors() {
    assert!(FaceModel::new(Vec::new(), Vec::new()).is_err());
    assert!(FaceModel::new(vec![1, 2], vec![nalgebra::Point3::origin()]).is_err());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "4 0.0 zero 0.0").unwrap();
    let err = FaceModel::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Line 1"));

    assert!(matches!(FaceModel::from_file("/nonexistent/model.txt"), Err(Error::Io(_))));
}

#[test]
fn test_non_finite_landmarks_rejected() {
    let mut points = vec![Landmark::new(0.5, 0.5, 0.0); 478];
    points[4].x = f64::NAN;
    assert!(matches!(LandmarkSet::new(points.clone()), Err(Error::InvalidInput(msg)) if msg.contains("Landmark 4")));

    points[4].x = 0.5;
    points[473].z = f64::INFINITY;
    assert!(LandmarkSet::new(points).is_err());
}

#[test]
fn test_non_finite_image_points_yield_no_pose() {
    let estimator = PoseEstimator::new(FaceModel::canonical());
    let mut points: Vec<nalgebra::Point2<f64>> = (0..6)
        .map(|i| nalgebra::Point2::new(300.0 + 10.0 * f64::from(i), 240.0 - 5.0 * f64::from(i)))
        .collect();
    points[0].x = f64::NAN;

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(estimator.estimate_from_points(&points, 640, 480).map(|p| p.is_none()));
    });
    let result = rx.recv_timeout(Duration::from_secs(5)).expect("pose estimate returned");
    assert!(result.unwrap());
}

#[test]
fn test_line_pipeline_errors() {
    assert!(BackgroundModel::new(0, 16.0).is_err());
    assert!(LineDetector::new(LineParams {
        background_history: 0,
        ..LineParams::default()
    })
    .is_err());

    let mask = Array2::<u8>::zeros((10, 10));
    let mut wrong = Array2::<u32>::zeros((3, 3));
    assert!(matches!(hough_lines(&mask, &mut wrong, 5), Err(Error::DimensionMismatch { .. })));

    let mut right = Array2::<u32>::zeros((hough_rho_bins(10, 10), 180));
    assert!(hough_lines(&mask, &mut right, 5).unwrap().is_empty());
}

#[test]
fn test_detector_failure_is_treated_as_no_face() {
    let mut app = MonitorApp::new(
        Config::default(),
        Box::new(FrameQueue::from_frames([blank_frame(64, 48, 0)])),
        Box::new(BrokenDetector),
        NullSurface,
        Arc::new(StaticOracle::new(false, "")),
    )
    .unwrap();
    app.set_mode(Mode::Gaze).unwrap();

    let StepOutcome::Gaze(frame) = app.step().unwrap() else {
        panic!("expected a gaze frame");
    };
    assert_eq!(frame.faces, 0);
    assert!(frame.vote.is_none());
}

#[test]
fn test_frame_source_failure_propagates() {
    let mut app = MonitorApp::new(
        Config::default(),
        Box::new(BrokenSource),
        Box::new(BrokenDetector),
        NullSurface,
        Arc::new(StaticOracle::new(false, "")),
    )
    .unwrap();
    app.set_mode(Mode::Check).unwrap();
    assert!(matches!(app.run(), Err(Error::Io(_))));
}

#[test]
fn test_invalid_config_rejected_by_app() {
    let mut config = Config::default();
    config.verification.timeout_ms = 0;
    let result = MonitorApp::new(
        config,
        Box::new(FrameQueue::new()),
        Box::new(BrokenDetector),
        NullSurface,
        Arc::new(StaticOracle::new(false, "")),
    );
    assert!(matches!(result, Err(Error::ConfigError(_))));
}

#[test]
fn test_oracle_failure_marks_event_invalid() {
    let mut coordinator = VerificationCoordinator::start(Arc::new(FailingOracle), 5_000).unwrap();
    let id = coordinator.begin(&blank_frame(16, 16, 0), "Paper detected", 0).unwrap();
    assert_eq!(coordinator.wait_for_outcome(Duration::from_secs(2)), Some(id));

    let event = &coordinator.events().all()[0];
    assert!(event.detail.as_deref().is_some_and(|d| d.contains("service unavailable")));
}

#[test]
fn test_second_verification_rejected_while_pending() {
    let oracle = StaticOracle::new(true, "x").with_delay(Duration::from_millis(200));
    let mut coordinator = VerificationCoordinator::start(Arc::new(oracle), 30_000).unwrap();
    coordinator.begin(&blank_frame(8, 8, 0), "Paper detected", 0).unwrap();
    assert!(coordinator.begin(&blank_frame(8, 8, 10), "Paper detected", 10).is_err());
    assert_eq!(coordinator.events().len(), 1);
}

#[test]
fn test_bad_recording_line() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{{\"timestamp_ms\": \"soon\"}}").unwrap();
    assert!(matches!(
        LandmarkRecording::from_file(file.path()),
        Err(Error::InvalidInput(msg)) if msg.contains(":1:")
    ));
}

#[test]
fn test_safe_cast_edges() {
    assert_eq!(f64_to_i64_clamp(f64::INFINITY, -5, 5), -5);
    assert_eq!(i64_to_index(-1, 10), None);
    assert_eq!(i64_to_index(10, 10), None);
    assert_eq!(i64_to_index(9, 10), Some(9));
}
