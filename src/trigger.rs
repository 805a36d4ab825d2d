//! Temporal persistence trigger over recent line clusters.
//!
//! A line that keeps reappearing at the same place for long enough is taken
//! as something new and stationary on the desk. The trigger keeps a short
//! history of cluster positions and fires when one of the current clusters
//! has been seen often enough, subject to a cooldown and to no verification
//! being in flight.

use crate::{
    constants::{
        DEFAULT_COOLDOWN_MS, DEFAULT_HISTORY_WINDOW_MS, DEFAULT_RECURRENCE_THRESHOLD, DEFAULT_RHO_TOLERANCE_PX,
        DEFAULT_THETA_TOLERANCE_DEG,
    },
    line_detection::{LineCluster, LineObservation},
};
use std::collections::VecDeque;

/// One cluster position remembered across frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryEntry {
    pub line: LineObservation,
    pub timestamp_ms: u64,
}

/// Trigger settings (angles in radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerParams {
    pub window_ms: u64,
    pub recurrence_threshold: usize,
    pub cooldown_ms: u64,
    pub rho_tolerance: f64,
    pub theta_tolerance: f64,
}

impl Default for TriggerParams {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_HISTORY_WINDOW_MS,
            recurrence_threshold: DEFAULT_RECURRENCE_THRESHOLD,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            rho_tolerance: DEFAULT_RHO_TOLERANCE_PX,
            theta_tolerance: DEFAULT_THETA_TOLERANCE_DEG.to_radians(),
        }
    }
}

/// The cluster that caused a trigger
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerHit {
    pub line: LineObservation,
    /// Matching history entries seen before this frame
    pub recurrences: usize,
    pub timestamp_ms: u64,
}

/// Sliding-window recurrence trigger
#[derive(Debug, Clone)]
pub struct PersistenceTrigger {
    params: TriggerParams,
    history: VecDeque<HistoryEntry>,
    last_trigger_ms: Option<u64>,
}

impl Default for PersistenceTrigger {
    fn default() -> Self {
        Self::new(TriggerParams::default())
    }
}

impl PersistenceTrigger {
    #[must_use]
    pub fn new(params: TriggerParams) -> Self {
        Self {
            params,
            history: VecDeque::new(),
            last_trigger_ms: None,
        }
    }

    #[must_use]
    pub const fn params(&self) -> &TriggerParams {
        &self.params
    }

    /// Evaluate this frame's clusters, then add them to the history
    ///
    /// At most one hit is produced per call. The history is updated whether
    /// or not a hit occurs.
    pub fn evaluate(&mut self, clusters: &[LineCluster], now_ms: u64, verification_pending: bool) -> Option<TriggerHit> {
        self.prune(now_ms);

        let mut hit = None;
        if !verification_pending && self.cooldown_elapsed(now_ms) {
            for cluster in clusters {
                let line = cluster.average();
                let recurrences = self.recurrences(&line);
                if recurrences >= self.params.recurrence_threshold {
                    log::info!(
                        "Persistent line at rho={:.1} theta={:.3} seen {} times",
                        line.rho,
                        line.theta,
                        recurrences
                    );
                    self.last_trigger_ms = Some(now_ms);
                    hit = Some(TriggerHit {
                        line,
                        recurrences,
                        timestamp_ms: now_ms,
                    });
                    break;
                }
            }
        }

        self.history.extend(clusters.iter().map(|c| HistoryEntry {
            line: c.average(),
            timestamp_ms: now_ms,
        }));
        hit
    }

    /// Number of history entries within tolerance of `line`
    #[must_use]
    pub fn recurrences(&self, line: &LineObservation) -> usize {
        self.history
            .iter()
            .filter(|e| e.line.is_near(line, self.params.rho_tolerance, self.params.theta_tolerance))
            .count()
    }

    fn prune(&mut self, now_ms: u64) {
        while let Some(front) = self.history.front() {
            if now_ms.saturating_sub(front.timestamp_ms) > self.params.window_ms {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        self.last_trigger_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.params.cooldown_ms)
    }

    #[must_use]
    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    #[must_use]
    pub const fn last_trigger_ms(&self) -> Option<u64> {
        self.last_trigger_ms
    }
}
