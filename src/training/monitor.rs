//! The training-session state machine.
//!
//! The monitor mirrors the remote job's lifecycle; it never invents states.
//! It consumes `(sequence, snapshot)` pairs produced by the poller and emits
//! [`SessionEvent`]s, so the whole machine is testable without a network or
//! scheduler. The terminal event is emitted exactly once; stray snapshots
//! arriving after a terminal state are discarded, as are snapshots whose
//! sequence number is not newer than the last applied one.

use crate::training::snapshot::{JobPhase, StatusSnapshot};

/// Opaque server-assigned job identifier.
pub type JobId = String;

/// Terminal outcome of a training session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed,
    Failed,
    Cancelled,
    /// The service lost the job's state.
    NotFound,
}

impl TerminalOutcome {
    fn from_phase(phase: &JobPhase) -> Option<Self> {
        match phase {
            JobPhase::Completed => Some(Self::Completed),
            JobPhase::Failed => Some(Self::Failed),
            JobPhase::Cancelled => Some(Self::Cancelled),
            JobPhase::NotFound => Some(Self::NotFound),
            _ => None,
        }
    }

    /// Whether the session produced a usable model.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Lifecycle state owned by the monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No job submitted yet.
    Idle,
    /// Start request in flight.
    Submitting,
    /// Job accepted; polling continues until a terminal snapshot.
    Active { job_id: JobId, phase: JobPhase },
    /// Terminal; no further polling.
    Finished(TerminalOutcome),
}

/// State change produced by applying a snapshot or start response.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The start request was accepted and polling may begin.
    Accepted { job_id: JobId },
    /// A non-terminal snapshot updated the active session.
    Progress(StatusSnapshot),
    /// First terminal snapshot; emitted exactly once per session.
    Terminal {
        outcome: TerminalOutcome,
        snapshot: StatusSnapshot,
    },
}

/// A locally rejected cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelBlocked {
    #[error("No active training job to cancel")]
    NotActive,
    #[error("A cancel request is already outstanding")]
    AlreadyRequested,
}

/// Owns one training session from submission to terminal state.
#[derive(Debug)]
pub struct TrainingSessionMonitor {
    state: SessionState,
    last_applied_seq: u64,
    latest: Option<StatusSnapshot>,
    failure_message: Option<String>,
    cancel_in_flight: bool,
    cancel_requested: bool,
}

impl Default for TrainingSessionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingSessionMonitor {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            last_applied_seq: 0,
            latest: None,
            failure_message: None,
            cancel_in_flight: false,
            cancel_requested: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Snapshot most recently applied, if any.
    pub fn latest_snapshot(&self) -> Option<&StatusSnapshot> {
        self.latest.as_ref()
    }

    /// Message describing a start failure, when the session never went active.
    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match &self.state {
            SessionState::Active { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// Whether a cancel request was acknowledged and server confirmation is
    /// still pending.
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Mark the start request as dispatched.
    pub fn begin_submit(&mut self) {
        debug_assert!(matches!(self.state, SessionState::Idle));
        self.state = SessionState::Submitting;
    }

    /// The start response accepted the request and assigned a job id.
    pub fn submit_accepted(&mut self, job_id: JobId) -> SessionEvent {
        self.state = SessionState::Active {
            job_id: job_id.clone(),
            phase: JobPhase::Initializing,
        };
        SessionEvent::Accepted { job_id }
    }

    /// The start request was rejected or failed; polling never begins.
    pub fn submit_failed(&mut self, message: impl Into<String>) {
        self.failure_message = Some(message.into());
        self.state = SessionState::Finished(TerminalOutcome::Failed);
    }

    /// Apply one polled snapshot tagged with its dispatch sequence number.
    ///
    /// Returns `None` for stale or post-terminal snapshots. Poll transport
    /// errors are not routed here at all: they leave state unchanged and the
    /// next scheduled tick is the retry.
    pub fn apply_snapshot(&mut self, seq: u64, snapshot: StatusSnapshot) -> Option<SessionEvent> {
        let SessionState::Active { job_id, .. } = &self.state else {
            return None;
        };
        let job_id = job_id.clone();
        if seq <= self.last_applied_seq {
            tracing::debug!(seq, "Discarding stale status snapshot");
            return None;
        }
        self.last_applied_seq = seq;

        let phase = snapshot.phase();
        if let Some(outcome) = TerminalOutcome::from_phase(&phase) {
            self.state = SessionState::Finished(outcome);
            self.latest = Some(snapshot.clone());
            return Some(SessionEvent::Terminal { outcome, snapshot });
        }

        self.state = SessionState::Active { job_id, phase };
        self.latest = Some(snapshot.clone());
        Some(SessionEvent::Progress(snapshot))
    }

    /// Gate a cancel request: only valid while active, and never while a
    /// prior cancel is outstanding.
    pub fn begin_cancel(&mut self) -> Result<(), CancelBlocked> {
        if !matches!(self.state, SessionState::Active { .. }) {
            return Err(CancelBlocked::NotActive);
        }
        if self.cancel_in_flight || self.cancel_requested {
            return Err(CancelBlocked::AlreadyRequested);
        }
        self.cancel_in_flight = true;
        Ok(())
    }

    /// Record the cancel response. A successful cancel does not assert the
    /// cancelled state; the server's next snapshot is the authority. A failed
    /// cancel leaves the session active and a retry is permitted.
    pub fn cancel_resolved(&mut self, accepted: bool) {
        self.cancel_in_flight = false;
        if accepted {
            self.cancel_requested = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: &str) -> StatusSnapshot {
        StatusSnapshot {
            status: status.to_string(),
            ..StatusSnapshot::default()
        }
    }

    fn active_monitor() -> TrainingSessionMonitor {
        let mut monitor = TrainingSessionMonitor::new();
        monitor.begin_submit();
        monitor.submit_accepted("1001".to_string());
        monitor
    }

    #[test]
    fn accepted_start_enters_active() {
        let monitor = active_monitor();
        assert_eq!(monitor.job_id(), Some(&"1001".to_string()));
        assert!(matches!(
            monitor.state(),
            SessionState::Active {
                phase: JobPhase::Initializing,
                ..
            }
        ));
    }

    #[test]
    fn rejected_start_finishes_failed_without_polling() {
        let mut monitor = TrainingSessionMonitor::new();
        monitor.begin_submit();
        monitor.submit_failed("missing templates");
        assert_eq!(
            monitor.state(),
            &SessionState::Finished(TerminalOutcome::Failed)
        );
        assert_eq!(monitor.failure_message(), Some("missing templates"));
        // Snapshots after a failed start are stray and must be ignored.
        assert!(monitor.apply_snapshot(1, snapshot("running")).is_none());
    }

    #[test]
    fn non_terminal_snapshots_keep_session_active() {
        let mut monitor = active_monitor();
        let event = monitor.apply_snapshot(1, snapshot("preparing_data"));
        assert!(matches!(event, Some(SessionEvent::Progress(_))));
        assert!(matches!(
            monitor.state(),
            SessionState::Active {
                phase: JobPhase::PreparingDataset,
                ..
            }
        ));
    }

    #[test]
    fn unknown_status_tag_stays_active() {
        let mut monitor = active_monitor();
        let event = monitor.apply_snapshot(1, snapshot("quantizing"));
        assert!(matches!(event, Some(SessionEvent::Progress(_))));
        assert!(matches!(monitor.state(), SessionState::Active { .. }));
    }

    #[test]
    fn terminal_event_fires_exactly_once() {
        let mut monitor = active_monitor();
        let first = monitor.apply_snapshot(1, snapshot("completed"));
        assert!(matches!(
            first,
            Some(SessionEvent::Terminal {
                outcome: TerminalOutcome::Completed,
                ..
            })
        ));
        // A pending fetch resolving late must not re-render a different
        // terminal state or resurrect the session.
        assert!(monitor.apply_snapshot(2, snapshot("failed")).is_none());
        assert!(monitor.apply_snapshot(3, snapshot("running")).is_none());
        assert_eq!(
            monitor.state(),
            &SessionState::Finished(TerminalOutcome::Completed)
        );
    }

    #[test]
    fn stale_sequence_numbers_are_discarded() {
        let mut monitor = active_monitor();
        let mut late = snapshot("running");
        late.current_epoch = Some(2);
        let mut newer = snapshot("running");
        newer.current_epoch = Some(5);

        assert!(monitor.apply_snapshot(2, newer).is_some());
        assert!(monitor.apply_snapshot(1, late).is_none());
        assert_eq!(
            monitor.latest_snapshot().and_then(|s| s.current_epoch),
            Some(5)
        );
    }

    #[test]
    fn not_found_is_a_terminal_failure_variant() {
        let mut monitor = active_monitor();
        let event = monitor.apply_snapshot(1, snapshot("not_found"));
        assert!(matches!(
            event,
            Some(SessionEvent::Terminal {
                outcome: TerminalOutcome::NotFound,
                ..
            })
        ));
        assert!(!TerminalOutcome::NotFound.is_success());
    }

    #[test]
    fn cancel_gate_rejects_double_cancel() {
        let mut monitor = active_monitor();
        assert_eq!(monitor.begin_cancel(), Ok(()));
        assert_eq!(monitor.begin_cancel(), Err(CancelBlocked::AlreadyRequested));

        // A rejected cancel resolves the gate and allows a retry.
        monitor.cancel_resolved(false);
        assert!(!monitor.cancel_requested());
        assert_eq!(monitor.begin_cancel(), Ok(()));

        // An accepted cancel awaits server confirmation but stays active.
        monitor.cancel_resolved(true);
        assert!(monitor.cancel_requested());
        assert!(matches!(monitor.state(), SessionState::Active { .. }));
    }

    #[test]
    fn cancel_requires_an_active_session() {
        let mut monitor = TrainingSessionMonitor::new();
        assert_eq!(monitor.begin_cancel(), Err(CancelBlocked::NotActive));

        let mut monitor = active_monitor();
        monitor.apply_snapshot(1, snapshot("completed"));
        assert_eq!(monitor.begin_cancel(), Err(CancelBlocked::NotActive));
    }

    #[test]
    fn server_confirmation_completes_a_cancel() {
        let mut monitor = active_monitor();
        monitor.begin_cancel().unwrap();
        monitor.cancel_resolved(true);
        let event = monitor.apply_snapshot(1, snapshot("cancelled"));
        assert!(matches!(
            event,
            Some(SessionEvent::Terminal {
                outcome: TerminalOutcome::Cancelled,
                ..
            })
        ));
    }
}
