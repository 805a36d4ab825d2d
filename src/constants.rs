//! Constants used throughout the application

/// Minimum number of landmarks a face mesh must carry (468 mesh points + irises)
pub const MIN_FACE_LANDMARKS: usize = 468;

/// Landmark indices used for head pose: nose tip, chin, eye outer corners, mouth corners
pub const POSE_LANDMARK_INDICES: [usize; 6] = [4, 152, 263, 33, 287, 57];

/// Left pupil landmark index
pub const LEFT_PUPIL_INDEX: usize = 468;

/// Right pupil landmark index
pub const RIGHT_PUPIL_INDEX: usize = 473;

/// Canonical 3D face model in millimeters, ordered like `POSE_LANDMARK_INDICES`
pub const CANONICAL_FACE_MODEL: [[f64; 3]; 6] = [
    [0.0, 0.0, 0.0],
    [0.0, -63.6, -12.5],
    [-43.3, 32.7, -26.0],
    [43.3, 32.7, -26.0],
    [-28.9, -28.9, -24.1],
    [28.9, -28.9, -24.1],
];

/// Left eyeball center in model space (millimeters)
pub const LEFT_EYE_CENTER: [f64; 3] = [29.05, 32.7, -39.5];

/// Right eyeball center in model space (millimeters)
pub const RIGHT_EYE_CENTER: [f64; 3] = [-29.05, 32.7, -39.5];

/// Minimum correspondences for the least-squares affine fit
pub const MIN_AFFINE_CORRESPONDENCES: usize = 4;

/// Minimum correspondences for the pose solver
pub const MIN_POSE_CORRESPONDENCES: usize = 4;

/// Camera matrix center factor
pub const CAMERA_CENTER_FACTOR: f64 = 2.0;

/// Default gaze gain applied to the pupil offset from the eyeball center
pub const DEFAULT_GAZE_GAIN: f64 = 10.0;

/// Default depth of the synthetic straight-ahead head point (millimeters)
pub const DEFAULT_HEAD_POSE_DEPTH: f64 = 40.0;

/// Default gaze deviation below which the subject counts as looking (pixels)
pub const DEFAULT_LOOKING_THRESHOLD: f64 = 60.0;

/// Default attention vote window (milliseconds)
pub const DEFAULT_VOTE_WINDOW_MS: u64 = 1000;

/// Background model defaults
pub const DEFAULT_BACKGROUND_HISTORY: usize = 50;
pub const DEFAULT_VAR_THRESHOLD: f32 = 16.0;
pub const BACKGROUND_VAR_INIT: f32 = 15.0;
pub const BACKGROUND_VAR_MIN: f32 = 4.0;
pub const BACKGROUND_VAR_MAX: f32 = 75.0;

/// Foreground / background mask values
pub const MASK_FOREGROUND: u8 = 255;
pub const MASK_BACKGROUND: u8 = 0;

/// Hough transform defaults
pub const DEFAULT_HOUGH_THRESHOLD: u32 = 150;
pub const DEFAULT_MAX_RAW_LINES: usize = 100;
pub const HOUGH_THETA_BINS: usize = 180;

/// Line filter and cluster tolerances
pub const DEFAULT_AXIS_TOLERANCE_DEG: f64 = 15.0;
pub const DEFAULT_RHO_TOLERANCE_PX: f64 = 20.0;
pub const DEFAULT_THETA_TOLERANCE_DEG: f64 = 15.0;

/// Half length of rendered cluster lines (pixels)
pub const DEFAULT_RENDER_HALF_LENGTH: f64 = 1000.0;

/// Persistence trigger defaults
pub const DEFAULT_HISTORY_WINDOW_MS: u64 = 3000;
pub const DEFAULT_RECURRENCE_THRESHOLD: usize = 30;
pub const DEFAULT_COOLDOWN_MS: u64 = 10_000;

/// Verification defaults
pub const DEFAULT_VERIFICATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RECENT_EVENTS: usize = 3;

/// Message attached to detection events
pub const DETECTION_MESSAGE: &str = "Paper detected";

/// Detail recorded when the oracle rejects a capture
pub const NO_DOCUMENT_DETAIL: &str = "no document detected";

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
