//! Main application module: mode switching and the per-frame pull loop.

use crate::{
    attention::{AttentionClassifier, AttentionVote, TrackingRecord},
    config::Config,
    constants::DETECTION_MESSAGE,
    error::Result,
    frame::{Frame, FrameGate, FramePoll, FrameSource},
    gaze::GazeEstimator,
    landmarks::LandmarkDetector,
    line_detection::{LineCluster, LineDetector},
    overlay::{draw_attention, draw_clusters, draw_events, draw_gaze, DisplaySurface},
    trigger::PersistenceTrigger,
    utils::image_conversion::mask_to_rgba,
    verification::{EventLog, Oracle, VerificationCoordinator},
    Error,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::{sync::Arc, thread, time::Duration};

/// Active pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Nothing running
    Idle,
    /// Gaze estimation and attention tracking
    Gaze,
    /// Desk change detection and verification
    Check,
}

/// State that lives exactly as long as gaze mode
#[derive(Debug, Default)]
struct GazeSession {
    gate: FrameGate,
}

/// State that lives exactly as long as check mode
#[derive(Debug)]
struct CheckSession {
    gate: FrameGate,
    detector: LineDetector,
    trigger: PersistenceTrigger,
}

#[derive(Debug)]
enum Session {
    Idle,
    Gaze(GazeSession),
    Check(CheckSession),
}

/// What one gaze-mode frame produced
#[derive(Debug, Clone, PartialEq)]
pub struct GazeFrame {
    pub timestamp_ms: u64,
    pub faces: usize,
    /// None when no face was found or the pose could not be fitted
    pub vote: Option<AttentionVote>,
    /// Set when this frame closed a tracking window
    pub record: Option<TrackingRecord>,
}

/// What one check-mode frame produced
#[derive(Debug, Clone, PartialEq)]
pub struct CheckFrame {
    pub timestamp_ms: u64,
    pub raw_lines: usize,
    pub discarded: bool,
    pub clusters: usize,
    /// Id of the detection event created on this frame
    pub event: Option<u64>,
}

/// Result of one loop iteration
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Idle,
    NotReady,
    /// The frame's timestamp did not advance
    Dropped,
    Ended,
    Gaze(GazeFrame),
    Check(CheckFrame),
}

/// Totals for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub not_ready: usize,
    pub dropped: usize,
}

/// Main application struct
pub struct MonitorApp<S: DisplaySurface> {
    config: Config,
    frames: Box<dyn FrameSource>,
    landmarks: Box<dyn LandmarkDetector>,
    surface: S,
    gaze_estimator: GazeEstimator,
    attention: AttentionClassifier,
    coordinator: VerificationCoordinator,
    session: Session,
    show_mask: bool,
    /// Start tracking on the next processed gaze frame
    tracking_requested: bool,
}

impl<S: DisplaySurface> MonitorApp<S> {
    /// Create the application in idle mode
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the face model
    /// cannot be loaded, or the verification worker cannot start
    pub fn new(
        config: Config,
        frames: Box<dyn FrameSource>,
        landmarks: Box<dyn LandmarkDetector>,
        surface: S,
        oracle: Arc<dyn Oracle>,
    ) -> Result<Self> {
        config.validate()?;
        let gaze_estimator = config.gaze_estimator()?;
        let attention = config.attention_classifier();
        let coordinator = VerificationCoordinator::start(oracle, config.verification.timeout_ms)?;
        let show_mask = config.display.show_mask;

        info!("Gaze monitor initialized");
        Ok(Self {
            config,
            frames,
            landmarks,
            surface,
            gaze_estimator,
            attention,
            coordinator,
            session: Session::Idle,
            show_mask,
            tracking_requested: false,
        })
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        match self.session {
            Session::Idle => Mode::Idle,
            Session::Gaze(_) => Mode::Gaze,
            Session::Check(_) => Mode::Check,
        }
    }

    /// Switch pipelines
    ///
    /// The current session is torn down before the next one is built, so the
    /// background model and frame buffers of a check session never overlap
    /// with the next session's.
    ///
    /// # Errors
    ///
    /// Returns an error if the new session cannot be created
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        if mode == self.mode() {
            return Ok(());
        }
        if self.mode() == Mode::Gaze {
            self.stop_tracking();
        }
        self.session = Session::Idle;

        self.session = match mode {
            Mode::Idle => Session::Idle,
            Mode::Gaze => Session::Gaze(GazeSession::default()),
            Mode::Check => Session::Check(CheckSession {
                gate: FrameGate::new(),
                detector: LineDetector::new(self.config.line_params())?,
                trigger: PersistenceTrigger::new(self.config.trigger_params()),
            }),
        };
        info!("Mode switched to {mode:?}");
        Ok(())
    }

    /// Begin attention tracking; resets the tracking log
    ///
    /// # Errors
    ///
    /// Returns an error outside gaze mode
    pub fn start_tracking(&mut self, now_ms: u64) -> Result<()> {
        if self.mode() != Mode::Gaze {
            return Err(Error::InvalidInput("Tracking requires gaze mode".to_string()));
        }
        self.attention.start_tracking(now_ms);
        Ok(())
    }

    /// Begin attention tracking at the timestamp of the next processed frame
    ///
    /// # Errors
    ///
    /// Returns an error outside gaze mode
    pub fn start_tracking_at_next_frame(&mut self) -> Result<()> {
        if self.mode() != Mode::Gaze {
            return Err(Error::InvalidInput("Tracking requires gaze mode".to_string()));
        }
        self.tracking_requested = true;
        Ok(())
    }

    pub fn stop_tracking(&mut self) {
        self.tracking_requested = false;
        self.attention.stop_tracking();
    }

    /// Switch check mode between the camera image and the foreground mask
    pub fn toggle_mask_view(&mut self) -> bool {
        self.show_mask = !self.show_mask;
        self.show_mask
    }

    #[must_use]
    pub fn tracking_log(&self) -> &[TrackingRecord] {
        self.attention.log()
    }

    #[must_use]
    pub const fn attention(&self) -> &AttentionClassifier {
        &self.attention
    }

    #[must_use]
    pub const fn events(&self) -> &EventLog {
        self.coordinator.events()
    }

    #[must_use]
    pub const fn verification_pending(&self) -> bool {
        self.coordinator.is_pending()
    }

    #[must_use]
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Block until the in-flight verification, if any, resolves or `timeout` passes
    pub fn wait_for_verification(&mut self, timeout: Duration) -> Option<u64> {
        self.coordinator.wait_for_outcome(timeout)
    }

    /// Pull one frame and run the active pipeline on it
    ///
    /// # Errors
    ///
    /// Returns an error if the frame source or the pipeline fails irrecoverably
    pub fn step(&mut self) -> Result<StepOutcome> {
        if self.mode() == Mode::Idle {
            return Ok(StepOutcome::Idle);
        }

        let frame = match self.frames.poll_frame()? {
            FramePoll::Ready(frame) => frame,
            FramePoll::NotReady => return Ok(StepOutcome::NotReady),
            FramePoll::Ended => return Ok(StepOutcome::Ended),
        };

        let admitted = match &mut self.session {
            Session::Idle => false,
            Session::Gaze(session) => session.gate.admit(frame.timestamp_ms()),
            Session::Check(session) => session.gate.admit(frame.timestamp_ms()),
        };
        if !admitted {
            debug!("Dropping frame at {} ms: timestamp did not advance", frame.timestamp_ms());
            return Ok(StepOutcome::Dropped);
        }

        for id in self.coordinator.poll(frame.timestamp_ms()) {
            debug!("Detection event {id} resolved");
        }

        match self.mode() {
            Mode::Idle => Ok(StepOutcome::Idle),
            Mode::Gaze => self.process_gaze(&frame).map(StepOutcome::Gaze),
            Mode::Check => self.process_check(&frame).map(StepOutcome::Check),
        }
    }

    /// Run until the source ends or the app goes idle
    ///
    /// # Errors
    ///
    /// Returns the first irrecoverable step error
    pub fn run(&mut self) -> Result<RunSummary> {
        info!("Starting main application loop in {:?} mode", self.mode());
        let mut summary = RunSummary::default();
        loop {
            match self.step()? {
                StepOutcome::Idle | StepOutcome::Ended => break,
                StepOutcome::NotReady => {
                    summary.not_ready += 1;
                    thread::yield_now();
                }
                StepOutcome::Dropped => summary.dropped += 1,
                StepOutcome::Gaze(_) | StepOutcome::Check(_) => summary.processed += 1,
            }
        }
        info!(
            "Loop finished: {} processed, {} not ready, {} dropped",
            summary.processed, summary.not_ready, summary.dropped
        );
        Ok(summary)
    }

    fn process_gaze(&mut self, frame: &Frame) -> Result<GazeFrame> {
        let now = frame.timestamp_ms();
        if std::mem::take(&mut self.tracking_requested) {
            self.attention.start_tracking(now);
        }
        let faces = match self.landmarks.detect(frame) {
            Ok(faces) => faces,
            Err(e) => {
                warn!("Landmark detection failed: {e}");
                Vec::new()
            }
        };

        self.surface
            .blit_rgba(frame.pixels(), frame.width(), frame.height())?;

        let mut vote = None;
        let mut record = None;
        if let Some(face) = faces.first() {
            match self.gaze_estimator.estimate(face, frame.width(), frame.height()) {
                Ok(Some(estimate)) => {
                    let v = self.attention.classify(&estimate.left, &estimate.right);
                    draw_gaze(&mut self.surface, &estimate);
                    record = self.attention.record(v, now);
                    vote = Some(v);
                }
                Ok(None) => debug!("No gaze sample for frame at {now} ms"),
                Err(e) => debug!("Skipping gaze for frame at {now} ms: {e}"),
            }
        }

        let elapsed = self
            .attention
            .is_tracking()
            .then(|| self.attention.elapsed_secs(now));
        draw_attention(&mut self.surface, vote, elapsed, frame.width());

        Ok(GazeFrame {
            timestamp_ms: now,
            faces: faces.len(),
            vote,
            record,
        })
    }

    fn process_check(&mut self, frame: &Frame) -> Result<CheckFrame> {
        let Session::Check(session) = &mut self.session else {
            return Err(Error::InvalidInput("Check pipeline requires check mode".to_string()));
        };
        let detection = session.detector.process(frame)?;

        if self.show_mask {
            let mask = session.detector.mask();
            self.surface
                .blit_rgba(&mask_to_rgba(mask), frame.width(), frame.height())?;
        } else {
            self.surface
                .blit_rgba(frame.pixels(), frame.width(), frame.height())?;
        }
        draw_clusters(&mut self.surface, &detection.clusters, self.config.lines.render_half_length);

        let event = self.handle_clusters(&detection.clusters, frame);
        draw_events(
            &mut self.surface,
            self.coordinator.events().recent(self.config.verification.recent_events),
        );

        Ok(CheckFrame {
            timestamp_ms: frame.timestamp_ms(),
            raw_lines: detection.raw_count,
            discarded: detection.discarded,
            clusters: detection.clusters.len(),
            event,
        })
    }

    /// Feed one frame's clusters to the trigger and start verification on a hit
    ///
    /// Returns the id of the created detection event. Does nothing outside check mode.
    pub fn handle_clusters(&mut self, clusters: &[LineCluster], frame: &Frame) -> Option<u64> {
        let Session::Check(session) = &mut self.session else {
            return None;
        };
        let now = frame.timestamp_ms();
        let hit = session
            .trigger
            .evaluate(clusters, now, self.coordinator.is_pending())?;
        debug!("Trigger hit at rho={:.1} after {} recurrences", hit.line.rho, hit.recurrences);

        match self.coordinator.begin(frame, DETECTION_MESSAGE, now) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Could not start verification: {e}");
                None
            }
        }
    }
}
