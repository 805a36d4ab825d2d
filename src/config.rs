//! Configuration management for the gaze monitor

use crate::{
    attention::AttentionClassifier,
    constants::{
        DEFAULT_AXIS_TOLERANCE_DEG, DEFAULT_BACKGROUND_HISTORY, DEFAULT_COOLDOWN_MS, DEFAULT_GAZE_GAIN,
        DEFAULT_HEAD_POSE_DEPTH, DEFAULT_HISTORY_WINDOW_MS, DEFAULT_HOUGH_THRESHOLD, DEFAULT_LOOKING_THRESHOLD,
        DEFAULT_MAX_RAW_LINES, DEFAULT_RECENT_EVENTS, DEFAULT_RECURRENCE_THRESHOLD, DEFAULT_RENDER_HALF_LENGTH,
        DEFAULT_RHO_TOLERANCE_PX, DEFAULT_THETA_TOLERANCE_DEG, DEFAULT_VAR_THRESHOLD, DEFAULT_VERIFICATION_TIMEOUT_MS,
        DEFAULT_VOTE_WINDOW_MS,
    },
    gaze::{GazeEstimator, GazeParams},
    line_detection::LineParams,
    pose_estimation::{FaceModel, PoseEstimator},
    trigger::TriggerParams,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gaze estimation parameters
    pub gaze: GazeConfig,

    /// Attention tracking parameters
    pub tracking: TrackingConfig,

    /// Background model parameters
    pub background: BackgroundConfig,

    /// Line detection parameters
    pub lines: LinesConfig,

    /// Persistence trigger parameters
    pub trigger: TriggerConfig,

    /// Oracle verification parameters
    pub verification: VerificationConfig,

    /// Display configuration
    pub display: DisplayConfig,
}

/// Gaze estimation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    /// Gaze deviation (pixels) under which the user counts as looking
    pub looking_threshold_px: f64,

    /// Pupil offset multiplier
    pub gaze_gain: f64,

    /// Depth of the straight-ahead reference point (millimeters)
    pub head_pose_depth_mm: f64,

    /// Optional custom face model file ("index x y z" per line)
    pub face_model: Option<PathBuf>,
}

/// Attention tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Majority vote window
    pub vote_window_ms: u64,
}

/// Background model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Frames of history the model adapts over
    pub history: usize,

    /// Squared-deviation threshold in units of variance
    pub var_threshold: f32,
}

/// Line detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinesConfig {
    /// Minimum Hough votes for a line
    pub hough_threshold: u32,

    /// Frames producing more raw lines than this are skipped
    pub max_raw_lines: usize,

    /// Allowed deviation from horizontal/vertical
    pub axis_tolerance_deg: f64,

    /// Cluster distance tolerance
    pub rho_tolerance_px: f64,

    /// Cluster angle tolerance
    pub theta_tolerance_deg: f64,

    /// Half length of the drawn cluster segment
    pub render_half_length: f64,
}

/// Persistence trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// History window
    pub window_ms: u64,

    /// Matching history entries needed to fire
    pub recurrence_threshold: usize,

    /// Minimum time between triggers
    pub cooldown_ms: u64,
}

/// Oracle verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Time after which a pending verification is marked invalid
    pub timeout_ms: u64,

    /// Number of events shown on screen
    pub recent_events: usize,
}

/// Display configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show the foreground mask instead of the camera image in check mode
    pub show_mask: bool,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            looking_threshold_px: DEFAULT_LOOKING_THRESHOLD,
            gaze_gain: DEFAULT_GAZE_GAIN,
            head_pose_depth_mm: DEFAULT_HEAD_POSE_DEPTH,
            face_model: None,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            vote_window_ms: DEFAULT_VOTE_WINDOW_MS,
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            history: DEFAULT_BACKGROUND_HISTORY,
            var_threshold: DEFAULT_VAR_THRESHOLD,
        }
    }
}

impl Default for LinesConfig {
    fn default() -> Self {
        Self {
            hough_threshold: DEFAULT_HOUGH_THRESHOLD,
            max_raw_lines: DEFAULT_MAX_RAW_LINES,
            axis_tolerance_deg: DEFAULT_AXIS_TOLERANCE_DEG,
            rho_tolerance_px: DEFAULT_RHO_TOLERANCE_PX,
            theta_tolerance_deg: DEFAULT_THETA_TOLERANCE_DEG,
            render_half_length: DEFAULT_RENDER_HALF_LENGTH,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_HISTORY_WINDOW_MS,
            recurrence_threshold: DEFAULT_RECURRENCE_THRESHOLD,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_VERIFICATION_TIMEOUT_MS,
            recent_events: DEFAULT_RECENT_EVENTS,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid configuration
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found
    pub fn validate(&self) -> Result<()> {
        // Gaze
        if !(self.gaze.looking_threshold_px > 0.0) {
            return Err(Error::ConfigError("Looking threshold must be positive".to_string()));
        }
        if !(self.gaze.gaze_gain > 0.0) {
            return Err(Error::ConfigError("Gaze gain must be positive".to_string()));
        }
        if !self.gaze.head_pose_depth_mm.is_finite() {
            return Err(Error::ConfigError("Head pose depth must be finite".to_string()));
        }
        if let Some(path) = &self.gaze.face_model {
            if !path.exists() {
                return Err(Error::ConfigError(format!("Face model not found: {}", path.display())));
            }
        }

        // Windows and counts
        if self.tracking.vote_window_ms == 0 {
            return Err(Error::ConfigError("Vote window must be greater than 0".to_string()));
        }
        if self.background.history == 0 {
            return Err(Error::ConfigError("Background history must be greater than 0".to_string()));
        }
        if !(self.background.var_threshold > 0.0) {
            return Err(Error::ConfigError("Variance threshold must be positive".to_string()));
        }
        if self.lines.hough_threshold == 0 {
            return Err(Error::ConfigError("Hough threshold must be greater than 0".to_string()));
        }
        if self.lines.max_raw_lines == 0 {
            return Err(Error::ConfigError("Raw line limit must be greater than 0".to_string()));
        }
        if self.trigger.window_ms == 0 || self.trigger.recurrence_threshold == 0 {
            return Err(Error::ConfigError(
                "Trigger window and recurrence threshold must be greater than 0".to_string(),
            ));
        }
        if self.verification.timeout_ms == 0 {
            return Err(Error::ConfigError("Verification timeout must be greater than 0".to_string()));
        }

        // Tolerances
        if !(self.lines.axis_tolerance_deg > 0.0 && self.lines.axis_tolerance_deg < 45.0) {
            return Err(Error::ConfigError(
                "Axis tolerance must be between 0 and 45 degrees".to_string(),
            ));
        }
        if !(self.lines.rho_tolerance_px > 0.0) || !(self.lines.theta_tolerance_deg > 0.0) {
            return Err(Error::ConfigError("Cluster tolerances must be positive".to_string()));
        }
        if !(self.lines.render_half_length > 0.0) {
            return Err(Error::ConfigError("Render half length must be positive".to_string()));
        }

        Ok(())
    }

    /// Build the gaze estimator, loading the custom face model if configured
    ///
    /// # Errors
    ///
    /// Returns an error if the face model file cannot be loaded
    pub fn gaze_estimator(&self) -> Result<GazeEstimator> {
        let model = match &self.gaze.face_model {
            Some(path) => FaceModel::from_file(path)?,
            None => FaceModel::canonical(),
        };
        Ok(GazeEstimator::new(
            PoseEstimator::new(model),
            GazeParams {
                gain: self.gaze.gaze_gain,
                head_pose_depth: self.gaze.head_pose_depth_mm,
            },
        ))
    }

    #[must_use]
    pub fn attention_classifier(&self) -> AttentionClassifier {
        AttentionClassifier::new(self.gaze.looking_threshold_px, self.tracking.vote_window_ms)
    }

    #[must_use]
    pub fn line_params(&self) -> LineParams {
        LineParams {
            background_history: self.background.history,
            var_threshold: self.background.var_threshold,
            hough_threshold: self.lines.hough_threshold,
            max_raw_lines: self.lines.max_raw_lines,
            axis_tolerance: self.lines.axis_tolerance_deg.to_radians(),
            rho_tolerance: self.lines.rho_tolerance_px,
            theta_tolerance: self.lines.theta_tolerance_deg.to_radians(),
        }
    }

    #[must_use]
    pub fn trigger_params(&self) -> TriggerParams {
        TriggerParams {
            window_ms: self.trigger.window_ms,
            recurrence_threshold: self.trigger.recurrence_threshold,
            cooldown_ms: self.trigger.cooldown_ms,
            rho_tolerance: self.lines.rho_tolerance_px,
            theta_tolerance: self.lines.theta_tolerance_deg.to_radians(),
        }
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r"# Gaze Monitor Configuration

# Gaze estimation
gaze:
  looking_threshold_px: 60.0
  gaze_gain: 10.0
  head_pose_depth_mm: 40.0
  # face_model: assets/face_model.txt

# Attention tracking
tracking:
  vote_window_ms: 1000

# Background subtraction
background:
  history: 50
  var_threshold: 16.0

# Line detection and clustering
lines:
  hough_threshold: 150
  max_raw_lines: 100
  axis_tolerance_deg: 15.0
  rho_tolerance_px: 20.0
  theta_tolerance_deg: 15.0
  render_half_length: 1000.0

# Persistence trigger
trigger:
  window_ms: 3000
  recurrence_threshold: 30
  cooldown_ms: 10000

# Oracle verification
verification:
  timeout_ms: 30000
  recent_events: 3

# Display settings
display:
  show_mask: false
";
