//! Detection events and the background oracle round trip that verifies them.
//!
//! The frame loop never blocks on the oracle. A dedicated worker thread takes
//! one job at a time over a bounded channel and reports back through a second
//! channel; the coordinator drains that channel on each [`poll`] and updates
//! the event log in place. Only one verification may be in flight.
//!
//! [`poll`]: VerificationCoordinator::poll

use crate::{
    constants::NO_DOCUMENT_DETAIL,
    frame::Frame,
    utils::image_conversion::encode_png,
    Error, Result,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::Serialize;
use std::{sync::Arc, thread, time::Duration};

const JOB_QUEUE_CAPACITY: usize = 1;
const OUTCOME_QUEUE_CAPACITY: usize = 4;

/// Detail recorded when the oracle does not answer in time
pub const TIMEOUT_DETAIL: &str = "verification timed out";

/// External classifier and content extractor for captured frames
pub trait Oracle: Send + Sync {
    /// Decide whether the PNG-encoded image shows someone holding up a document
    ///
    /// # Errors
    ///
    /// Returns an error if the service call fails or its answer cannot be parsed
    fn is_holding_document(&self, image: &[u8]) -> Result<bool>;

    /// Extract the textual content of the document in the image
    ///
    /// # Errors
    ///
    /// Returns an error if the service call fails
    fn extract_content(&self, image: &[u8]) -> Result<String>;
}

/// Oracle with fixed answers, for offline replay and tests
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    holding: bool,
    content: String,
    delay: Duration,
}

impl StaticOracle {
    #[must_use]
    pub fn new(holding: bool, content: impl Into<String>) -> Self {
        Self {
            holding,
            content: content.into(),
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long inside each call
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Oracle for StaticOracle {
    fn is_holding_document(&self, image: &[u8]) -> Result<bool> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if image.is_empty() {
            return Err(Error::Oracle("empty image".to_string()));
        }
        Ok(self.holding)
    }

    fn extract_content(&self, _image: &[u8]) -> Result<String> {
        Ok(self.content.clone())
    }
}

/// Verification state of a detection event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    Pending,
    Valid,
    Invalid,
}

/// One persistence-trigger firing and its verification result
#[derive(Debug, Clone, Serialize)]
pub struct DetectionEvent {
    pub id: u64,
    pub message: String,
    pub timestamp_ms: u64,
    /// PNG bytes of the frame that triggered the event
    #[serde(skip)]
    pub captured_frame: Vec<u8>,
    pub validity: Validity,
    pub extracted_content: Option<String>,
    /// Reason for an invalid outcome
    pub detail: Option<String>,
}

/// Result of one oracle round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    Document { content: String },
    NoDocument,
    Failed(String),
}

impl OracleOutcome {
    fn run(oracle: &dyn Oracle, image: &[u8]) -> Self {
        match oracle.is_holding_document(image) {
            Ok(true) => match oracle.extract_content(image) {
                Ok(content) => Self::Document { content },
                Err(e) => Self::Failed(e.to_string()),
            },
            Ok(false) => Self::NoDocument,
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

enum WorkerCmd {
    Verify { id: u64, image: Vec<u8> },
    Shutdown,
}

struct WorkerReply {
    id: u64,
    outcome: OracleOutcome,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    id: u64,
    started_ms: u64,
}

/// Append-only detection event log
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<DetectionEvent>,
}

impl EventLog {
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn push(&mut self, event: DetectionEvent) {
        self.events.push(event);
    }

    #[must_use]
    pub fn all(&self) -> &[DetectionEvent] {
        &self.events
    }

    /// The last `n` events, oldest first
    #[must_use]
    pub fn recent(&self, n: usize) -> &[DetectionEvent] {
        &self.events[self.events.len().saturating_sub(n)..]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut DetectionEvent> {
        self.events.iter_mut().rev().find(|e| e.id == id)
    }
}

/// Owns the oracle worker and the event log
pub struct VerificationCoordinator {
    tx: Sender<WorkerCmd>,
    rx: Receiver<WorkerReply>,
    worker_thread: Option<thread::JoinHandle<()>>,
    events: EventLog,
    in_flight: Option<InFlight>,
    /// Jobs sent to the worker whose reply has not been received
    unanswered: usize,
    timeout_ms: u64,
    next_id: u64,
}

impl std::fmt::Debug for VerificationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationCoordinator")
            .field("events", &self.events.len())
            .field("in_flight", &self.in_flight)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl VerificationCoordinator {
    /// Start the worker thread
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned
    pub fn start(oracle: Arc<dyn Oracle>, timeout_ms: u64) -> Result<Self> {
        let (tx, job_rx) = bounded(JOB_QUEUE_CAPACITY);
        let (reply_tx, rx) = bounded(OUTCOME_QUEUE_CAPACITY);

        let worker_thread = thread::Builder::new()
            .name("oracle-worker".to_string())
            .spawn(move || Self::worker_loop(oracle.as_ref(), &job_rx, &reply_tx))?;

        Ok(Self {
            tx,
            rx,
            worker_thread: Some(worker_thread),
            events: EventLog::new(),
            in_flight: None,
            unanswered: 0,
            timeout_ms,
            next_id: 1,
        })
    }

    fn worker_loop(oracle: &dyn Oracle, jobs: &Receiver<WorkerCmd>, replies: &Sender<WorkerReply>) {
        while let Ok(cmd) = jobs.recv() {
            match cmd {
                WorkerCmd::Verify { id, image } => {
                    let outcome = OracleOutcome::run(oracle, &image);
                    if replies.send(WorkerReply { id, outcome }).is_err() {
                        break;
                    }
                }
                WorkerCmd::Shutdown => break,
            }
        }
        log::debug!("Oracle worker stopped");
    }

    /// True while an event is waiting on the oracle
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub const fn events(&self) -> &EventLog {
        &self.events
    }

    /// Record a detection for `frame` and hand it to the oracle
    ///
    /// The event is logged as pending before the job is queued. If the
    /// worker is gone the event is marked invalid and an error returned.
    ///
    /// # Errors
    ///
    /// Returns an error if a verification is already in flight, the frame
    /// cannot be encoded, or the worker is unavailable
    pub fn begin(&mut self, frame: &Frame, message: &str, now_ms: u64) -> Result<u64> {
        if let Some(in_flight) = self.in_flight {
            return Err(Error::InvalidInput(format!(
                "Verification {} is still in flight",
                in_flight.id
            )));
        }

        let image = encode_png(frame)?;
        let id = self.next_id;
        self.next_id += 1;

        self.events.push(DetectionEvent {
            id,
            message: message.to_string(),
            timestamp_ms: now_ms,
            captured_frame: image.clone(),
            validity: Validity::Pending,
            extracted_content: None,
            detail: None,
        });

        if self.tx.try_send(WorkerCmd::Verify { id, image }).is_err() {
            self.resolve(id, OracleOutcome::Failed("oracle worker unavailable".to_string()));
            return Err(Error::WorkerUnavailable("oracle worker is not accepting jobs".to_string()));
        }

        log::info!("Detection event {id} sent for verification");
        self.unanswered += 1;
        self.in_flight = Some(InFlight { id, started_ms: now_ms });
        Ok(id)
    }

    /// Apply finished verifications and expire a stalled one
    ///
    /// Returns the ids of events resolved by this call.
    pub fn poll(&mut self, now_ms: u64) -> Vec<u64> {
        let mut resolved = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(reply) => {
                    if let Some(id) = self.accept(reply) {
                        resolved.push(id);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if let Some(in_flight) = self.in_flight.take() {
                        self.resolve(in_flight.id, OracleOutcome::Failed("oracle worker stopped".to_string()));
                        resolved.push(in_flight.id);
                    }
                    break;
                }
            }
        }

        if let Some(in_flight) = self.in_flight {
            if now_ms.saturating_sub(in_flight.started_ms) >= self.timeout_ms {
                log::warn!("Verification {} timed out after {} ms", in_flight.id, self.timeout_ms);
                self.in_flight = None;
                self.resolve(in_flight.id, OracleOutcome::Failed(TIMEOUT_DETAIL.to_string()));
                resolved.push(in_flight.id);
            }
        }
        resolved
    }

    /// Block up to `timeout` for the in-flight verification to resolve
    ///
    /// Returns the resolved event id, or `None` when nothing was pending or
    /// the wait ran out.
    pub fn wait_for_outcome(&mut self, timeout: Duration) -> Option<u64> {
        self.in_flight?;
        match self.rx.recv_timeout(timeout) {
            Ok(reply) => self.accept(reply),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn accept(&mut self, reply: WorkerReply) -> Option<u64> {
        self.unanswered = self.unanswered.saturating_sub(1);
        match self.in_flight {
            Some(in_flight) if in_flight.id == reply.id => {
                self.in_flight = None;
                self.resolve(reply.id, reply.outcome);
                Some(reply.id)
            }
            _ => {
                log::debug!("Ignoring late oracle answer for event {}", reply.id);
                None
            }
        }
    }

    fn resolve(&mut self, id: u64, outcome: OracleOutcome) {
        let Some(event) = self.events.get_mut(id) else {
            return;
        };
        match outcome {
            OracleOutcome::Document { content } => {
                log::info!("Event {id} verified as a document");
                event.validity = Validity::Valid;
                event.extracted_content = Some(content);
            }
            OracleOutcome::NoDocument => {
                log::info!("Event {id}: {NO_DOCUMENT_DETAIL}");
                event.validity = Validity::Invalid;
                event.detail = Some(NO_DOCUMENT_DETAIL.to_string());
            }
            OracleOutcome::Failed(reason) => {
                log::warn!("Event {id} verification failed: {reason}");
                event.validity = Validity::Invalid;
                event.detail = Some(reason);
            }
        }
    }
}

impl Drop for VerificationCoordinator {
    fn drop(&mut self) {
        let _ = self.tx.send_timeout(WorkerCmd::Shutdown, Duration::from_millis(100));
        if let Some(handle) = self.worker_thread.take() {
            if self.unanswered > 0 {
                // An oracle call may still be running; let it finish on its own.
                log::debug!("Detaching oracle worker with a verification in flight");
                return;
            }
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingOracle;

    impl Oracle for FailingOracle {
        fn is_holding_document(&self, _image: &[u8]) -> Result<bool> {
            Err(Error::Oracle("service unavailable".to_string()))
        }

        fn extract_content(&self, _image: &[u8]) -> Result<String> {
            unreachable!("content is never requested after a failed classification")
        }
    }

    fn frame() -> Frame {
        Frame::filled(4, 4, [10, 20, 30, 255], 0).unwrap()
    }

    #[test]
    fn test_valid_document_gets_content() {
        let mut coordinator = VerificationCoordinator::start(Arc::new(StaticOracle::new(true, "2 + 2 = 4")), 30_000).unwrap();
        let id = coordinator.begin(&frame(), "Paper detected", 100).unwrap();
        assert!(coordinator.is_pending());
        assert_eq!(coordinator.events().all()[0].validity, Validity::Pending);

        assert_eq!(coordinator.wait_for_outcome(Duration::from_secs(5)), Some(id));
        let event = &coordinator.events().all()[0];
        assert_eq!(event.validity, Validity::Valid);
        assert_eq!(event.extracted_content.as_deref(), Some("2 + 2 = 4"));
        assert!(!coordinator.is_pending());
    }

    #[test]
    fn test_no_document_skips_content() {
        let mut coordinator = VerificationCoordinator::start(Arc::new(StaticOracle::new(false, "unused")), 30_000).unwrap();
        coordinator.begin(&frame(), "Paper detected", 0).unwrap();
        coordinator.wait_for_outcome(Duration::from_secs(5)).unwrap();
        let event = &coordinator.events().all()[0];
        assert_eq!(event.validity, Validity::Invalid);
        assert!(event.extracted_content.is_none());
        assert_eq!(event.detail.as_deref(), Some(NO_DOCUMENT_DETAIL));
    }

    #[test]
    fn test_oracle_failure_marks_invalid() {
        let mut coordinator = VerificationCoordinator::start(Arc::new(FailingOracle), 30_000).unwrap();
        coordinator.begin(&frame(), "Paper detected", 0).unwrap();
        coordinator.wait_for_outcome(Duration::from_secs(5)).unwrap();
        let event = &coordinator.events().all()[0];
        assert_eq!(event.validity, Validity::Invalid);
        assert!(event.extracted_content.is_none());
    }

    #[test]
    fn test_single_verification_in_flight() {
        let oracle = StaticOracle::new(true, "x").with_delay(Duration::from_millis(200));
        let mut coordinator = VerificationCoordinator::start(Arc::new(oracle), 30_000).unwrap();
        coordinator.begin(&frame(), "Paper detected", 0).unwrap();
        assert!(coordinator.begin(&frame(), "Paper detected", 10).is_err());
        assert_eq!(coordinator.events().len(), 1);
        coordinator.wait_for_outcome(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_timeout_marks_invalid_and_ignores_late_answer() {
        let oracle = StaticOracle::new(true, "late").with_delay(Duration::from_millis(100));
        let mut coordinator = VerificationCoordinator::start(Arc::new(oracle), 50).unwrap();
        let id = coordinator.begin(&frame(), "Paper detected", 0).unwrap();
        assert_eq!(coordinator.poll(60), vec![id]);
        assert!(!coordinator.is_pending());

        thread::sleep(Duration::from_millis(300));
        assert!(coordinator.poll(400).is_empty());
        let event = &coordinator.events().all()[0];
        assert_eq!(event.validity, Validity::Invalid);
        assert_eq!(event.detail.as_deref(), Some(TIMEOUT_DETAIL));
    }

    #[test]
    fn test_recent_events() {
        let mut log = EventLog::new();
        for id in 0..5 {
            log.push(DetectionEvent {
                id,
                message: String::new(),
                timestamp_ms: id,
                captured_frame: Vec::new(),
                validity: Validity::Pending,
                extracted_content: None,
                detail: None,
            });
        }
        let recent: Vec<u64> = log.recent(3).iter().map(|e| e.id).collect();
        assert_eq!(recent, vec![2, 3, 4]);
        assert_eq!(EventLog::new().recent(3).len(), 0);
    }
}
