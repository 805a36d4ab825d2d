//! Configuration file handling

use gaze_monitor::{
    config::{Config, EXAMPLE_CONFIG},
    Error,
};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_config_file_roundtrip() {
    let mut config = Config::default();
    config.trigger.cooldown_ms = 4500;
    config.lines.hough_threshold = 120;
    config.display.show_mask = true;

    let file = NamedTempFile::new().unwrap();
    config.to_file(file.path()).unwrap();
    let loaded = Config::from_file(file.path()).unwrap();

    assert_eq!(loaded.trigger.cooldown_ms, 4500);
    assert_eq!(loaded.lines.hough_threshold, 120);
    assert!(loaded.display.show_mask);
    assert_eq!(loaded.background.history, config.background.history);
    loaded.validate().unwrap();
}

#[test]
fn test_example_config_parses() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(EXAMPLE_CONFIG.as_bytes()).unwrap();
    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert!((config.gaze.looking_threshold_px - 60.0).abs() < f64::EPSILON);
}

#[test]
fn test_invalid_yaml_is_config_error() {
    let err = Config::from_yaml("trigger: [not, a, map").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));

    let err = Config::from_yaml("lines:\n  hough_threshold: many\n").unwrap_err();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = Config::from_file("/nonexistent/gaze-monitor.yaml").unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_face_model_path_must_exist() {
    let mut config = Config::default();
    config.gaze.face_model = Some("/nonexistent/face_model.txt".into());
    assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

    let file = NamedTempFile::new().unwrap();
    config.gaze.face_model = Some(file.path().to_path_buf());
    config.validate().unwrap();
}

#[test]
fn test_custom_face_model_is_loaded() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# index x y z").unwrap();
    for (index, x, y, z) in [
        (4, 0.0, 0.0, 0.0),
        (152, 0.0, -63.6, -12.5),
        (263, -43.3, 32.7, -26.0),
        (33, 43.3, 32.7, -26.0),
        (287, -28.9, -28.9, -24.1),
        (57, 28.9, -28.9, -24.1),
        (1, 0.0, 10.0, -5.0),
    ] {
        writeln!(file, "{index} {x} {y} {z}").unwrap();
    }

    let mut config = Config::default();
    config.gaze.face_model = Some(file.path().to_path_buf());
    let estimator = config.gaze_estimator().unwrap();
    let model = estimator.pose_estimator().model();
    assert_eq!(model.len(), 7);
    assert_eq!(model.landmark_indices()[6], 1);
}

#[test]
fn test_malformed_face_model_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "4 0.0 0.0").unwrap();

    let mut config = Config::default();
    config.gaze.face_model = Some(file.path().to_path_buf());
    assert!(matches!(config.gaze_estimator(), Err(Error::FaceModel(_))));
}

#[test]
fn test_derived_parameters_use_radians() {
    let mut config = Config::default();
    config.lines.theta_tolerance_deg = 10.0;
    config.trigger.cooldown_ms = 2500;

    let lines = config.line_params();
    let trigger = config.trigger_params();
    assert!((lines.theta_tolerance - 10f64.to_radians()).abs() < 1e-12);
    assert!((trigger.theta_tolerance - lines.theta_tolerance).abs() < 1e-12);
    assert!((trigger.rho_tolerance - lines.rho_tolerance).abs() < 1e-12);
    assert_eq!(trigger.cooldown_ms, 2500);
}
