//! Attention classification from gaze deviation, smoothed by a per-window majority vote.
//!
//! Each processed frame yields one boolean vote. While tracking, votes are
//! buffered and, once a vote window has elapsed, the strict majority of the
//! buffer becomes one [`TrackingRecord`] in the session log.

use crate::{constants::{DEFAULT_LOOKING_THRESHOLD, DEFAULT_VOTE_WINDOW_MS}, gaze::GazeSample};
use serde::{Deserialize, Serialize};

/// Per-frame attention decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionVote {
    /// Distance between average pupil and average gaze endpoint (pixels)
    pub magnitude: f64,
    /// True when the magnitude is under the looking threshold
    pub looking: bool,
}

/// One majority-vote result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub looking: bool,
    pub timestamp_ms: u64,
}

/// Votes collected during the current window
#[derive(Debug, Clone, Default)]
pub struct TrackingBuffer {
    votes: Vec<bool>,
}

impl TrackingBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self { votes: Vec::new() }
    }

    pub fn push(&mut self, looking: bool) {
        self.votes.push(looking);
    }

    /// Strict majority; ties and an empty buffer count as not looking
    #[must_use]
    pub fn majority(&self) -> bool {
        let yes = self.votes.iter().filter(|&&v| v).count();
        yes * 2 > self.votes.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }
}

impl FromIterator<bool> for TrackingBuffer {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self {
            votes: iter.into_iter().collect(),
        }
    }
}

/// Euclidean distance between the average pupil and the average gaze endpoint
#[must_use]
pub fn gaze_deviation(left: &GazeSample, right: &GazeSample) -> f64 {
    let avg_pupil = nalgebra::center(&left.pupil, &right.pupil);
    let avg_endpoint = nalgebra::center(&left.endpoint, &right.endpoint);
    nalgebra::distance(&avg_pupil, &avg_endpoint)
}

/// Looking classifier and tracking session state
#[derive(Debug, Clone)]
pub struct AttentionClassifier {
    threshold: f64,
    window_ms: u64,
    tracking: bool,
    started_at_ms: u64,
    window_start_ms: u64,
    buffer: TrackingBuffer,
    log: Vec<TrackingRecord>,
    last_vote: Option<AttentionVote>,
}

impl Default for AttentionClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKING_THRESHOLD, DEFAULT_VOTE_WINDOW_MS)
    }
}

impl AttentionClassifier {
    /// Create a classifier
    #[must_use]
    pub fn new(threshold: f64, window_ms: u64) -> Self {
        Self {
            threshold,
            window_ms,
            tracking: false,
            started_at_ms: 0,
            window_start_ms: 0,
            buffer: TrackingBuffer::new(),
            log: Vec::new(),
            last_vote: None,
        }
    }

    /// Classify one frame's gaze samples
    #[must_use]
    pub fn classify(&self, left: &GazeSample, right: &GazeSample) -> AttentionVote {
        let magnitude = gaze_deviation(left, right);
        AttentionVote {
            magnitude,
            looking: magnitude < self.threshold,
        }
    }

    /// Begin a tracking session, discarding the previous log
    pub fn start_tracking(&mut self, now_ms: u64) {
        log::info!("Attention tracking started");
        self.tracking = true;
        self.started_at_ms = now_ms;
        self.window_start_ms = now_ms;
        self.buffer.clear();
        self.log.clear();
    }

    /// End the tracking session; the log stays available
    pub fn stop_tracking(&mut self) {
        if self.tracking {
            log::info!("Attention tracking stopped with {} records", self.log.len());
        }
        self.tracking = false;
        self.buffer.clear();
    }

    #[must_use]
    pub const fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Whole seconds since tracking started, zero when idle
    #[must_use]
    pub fn elapsed_secs(&self, now_ms: u64) -> u64 {
        if self.tracking {
            now_ms.saturating_sub(self.started_at_ms) / 1000
        } else {
            0
        }
    }

    /// Record a vote; returns the record appended when a window closes
    pub fn record(&mut self, vote: AttentionVote, now_ms: u64) -> Option<TrackingRecord> {
        self.last_vote = Some(vote);
        if !self.tracking {
            return None;
        }

        self.buffer.push(vote.looking);
        if now_ms.saturating_sub(self.window_start_ms) < self.window_ms {
            return None;
        }

        let record = TrackingRecord {
            looking: self.buffer.majority(),
            timestamp_ms: now_ms,
        };
        log::debug!(
            "Tracking window closed: {} of {} votes, looking={}",
            self.buffer.votes.iter().filter(|&&v| v).count(),
            self.buffer.len(),
            record.looking
        );
        self.log.push(record);
        self.buffer.clear();
        self.window_start_ms = now_ms;
        Some(record)
    }

    /// Session tracking log
    #[must_use]
    pub fn log(&self) -> &[TrackingRecord] {
        &self.log
    }

    /// Most recent per-frame vote
    #[must_use]
    pub const fn last_vote(&self) -> Option<AttentionVote> {
        self.last_vote
    }
}
