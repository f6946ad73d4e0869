//! Background polling and session orchestration.
//!
//! One worker thread per session polls the status endpoint on a fixed
//! interval, tags each snapshot with a dispatch sequence number, and forwards
//! it over an mpsc channel. The thread stops on the first terminal snapshot,
//! when the stop flag is set, or when the receiving side goes away. Polls are
//! dispatched strictly one after another, so at most one status request is
//! outstanding per job.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
    },
    thread,
    time::{Duration, Instant},
};

use crate::training::api::{CancelRequestError, StartError, StatusError, TrainingApi};
use crate::training::monitor::{
    CancelBlocked, JobId, SessionEvent, SessionState, TerminalOutcome, TrainingSessionMonitor,
};
use crate::training::request::TrainingRequest;
use crate::training::save::{NotCompleted, TrainedModelDraft};
use crate::training::snapshot::StatusSnapshot;

/// One poll result, tagged with its dispatch sequence number.
#[derive(Debug)]
pub struct PollMessage {
    pub seq: u64,
    pub result: Result<StatusSnapshot, StatusError>,
}

/// Failure to cancel a session.
#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    /// Rejected locally before any request was made.
    #[error(transparent)]
    Blocked(#[from] CancelBlocked),
    /// The cancel request itself failed; the session stays active.
    #[error(transparent)]
    Request(#[from] CancelRequestError),
}

/// The poller thread stopped before a terminal snapshot was delivered.
#[derive(Debug, thiserror::Error)]
#[error("Status poller stopped before a terminal state was reached")]
pub struct PollerStopped;

/// Spawn the status poller for one job.
pub fn spawn_status_poller(
    api: TrainingApi,
    job_id: JobId,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> Receiver<PollMessage> {
    let (tx, rx) = std::sync::mpsc::channel();
    thread::spawn(move || poll_loop(&api, &job_id, interval, &stop, &tx));
    rx
}

fn poll_loop(
    api: &TrainingApi,
    job_id: &JobId,
    interval: Duration,
    stop: &AtomicBool,
    tx: &Sender<PollMessage>,
) {
    let mut seq = 0u64;
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        seq += 1;
        match api.fetch_status(job_id) {
            Ok(snapshot) => {
                let terminal = snapshot.phase().is_terminal();
                if tx.send(PollMessage {
                    seq,
                    result: Ok(snapshot),
                })
                .is_err()
                {
                    break;
                }
                if terminal {
                    break;
                }
            }
            Err(err) => {
                // Transport errors are not fatal; the next tick retries.
                tracing::warn!(%job_id, "Status poll failed: {err}");
                if tx.send(PollMessage {
                    seq,
                    result: Err(err),
                })
                .is_err()
                {
                    break;
                }
            }
        }
        thread::sleep(interval);
    }
}

/// One training session from submission to terminal outcome.
///
/// Owns the job identifier, the state machine, and the poller; the event
/// channel is drained only through [`TrainingSession::next_event`], so state
/// is updated in the order responses are received.
#[derive(Debug)]
pub struct TrainingSession {
    api: TrainingApi,
    request: TrainingRequest,
    monitor: TrainingSessionMonitor,
    poll_rx: Receiver<PollMessage>,
    stop: Arc<AtomicBool>,
    job_id: JobId,
    started_at: Instant,
}

impl TrainingSession {
    /// Validate and submit the request, then begin polling.
    ///
    /// An invalid request fails fast with no network call; a rejected or
    /// network-failed start fails the session without any polling.
    pub fn start(
        api: TrainingApi,
        request: TrainingRequest,
        poll_interval: Duration,
    ) -> Result<Self, StartError> {
        request.validate()?;
        let mut monitor = TrainingSessionMonitor::new();
        monitor.begin_submit();
        let job_id = match api.start_training(&request) {
            Ok(job_id) => job_id,
            Err(err) => {
                monitor.submit_failed(err.to_string());
                return Err(err);
            }
        };
        monitor.submit_accepted(job_id.clone());
        tracing::info!(%job_id, model_name = %request.model_name, "Training started");

        let stop = Arc::new(AtomicBool::new(false));
        let poll_rx =
            spawn_status_poller(api.clone(), job_id.clone(), poll_interval, stop.clone());
        Ok(Self {
            api,
            request,
            monitor,
            poll_rx,
            stop,
            job_id,
            started_at: Instant::now(),
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn state(&self) -> &SessionState {
        self.monitor.state()
    }

    /// Wall-clock time since the job went active; feeds the estimated
    /// progress ramp.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Block until the next state-changing event.
    ///
    /// Poll transport errors and stale snapshots are absorbed here: they
    /// leave state unchanged and the loop keeps waiting for the next tick.
    pub fn next_event(&mut self) -> Result<SessionEvent, PollerStopped> {
        loop {
            let message = self.poll_rx.recv().map_err(|_| PollerStopped)?;
            let snapshot = match message.result {
                Ok(snapshot) => snapshot,
                Err(_) => continue,
            };
            if let Some(event) = self.monitor.apply_snapshot(message.seq, snapshot) {
                return Ok(event);
            }
        }
    }

    /// Drive the session to its terminal outcome, invoking `on_event` for
    /// every state change including the terminal one (which fires exactly
    /// once).
    pub fn run_to_terminal(
        &mut self,
        mut on_event: impl FnMut(&SessionEvent),
    ) -> Result<(TerminalOutcome, StatusSnapshot), PollerStopped> {
        loop {
            let event = self.next_event()?;
            on_event(&event);
            if let SessionEvent::Terminal { outcome, snapshot } = event {
                return Ok((outcome, snapshot));
            }
        }
    }

    /// Request cancellation of the active job.
    ///
    /// Success stops the scheduler from being needed much longer but does not
    /// itself assert the cancelled state; the server's next snapshot is the
    /// authority. At most one cancel request may be outstanding.
    pub fn cancel(&mut self) -> Result<(), CancelError> {
        self.monitor.begin_cancel()?;
        match self.api.cancel_training(&self.job_id) {
            Ok(()) => {
                self.monitor.cancel_resolved(true);
                tracing::info!(job_id = %self.job_id, "Cancel request accepted");
                Ok(())
            }
            Err(err) => {
                self.monitor.cancel_resolved(false);
                Err(err.into())
            }
        }
    }

    /// Assemble the save draft for a completed session.
    pub fn save_draft(&self) -> Result<TrainedModelDraft, NotCompleted> {
        let snapshot = self
            .monitor
            .latest_snapshot()
            .cloned()
            .unwrap_or_default();
        TrainedModelDraft::from_completed(&self.job_id, &self.request, &snapshot)
    }

    /// Persist the trained model via the save endpoint.
    pub fn save_trained_model(&self) -> Result<TrainedModelDraft, SaveOutcomeError> {
        let draft = self.save_draft()?;
        self.api.save_trained_model(&draft)?;
        Ok(draft)
    }
}

/// Failure to persist a completed session's model.
#[derive(Debug, thiserror::Error)]
pub enum SaveOutcomeError {
    #[error(transparent)]
    NotCompleted(#[from] NotCompleted),
    #[error(transparent)]
    Request(#[from] crate::training::api::SaveError),
}

impl Drop for TrainingSession {
    fn drop(&mut self) {
        // Cooperative stop; the poller also exits on its own once the
        // receiver is gone.
        self.stop.store(true, Ordering::Relaxed);
    }
}
