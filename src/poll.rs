//! Status poller: drive one job from `idle` to `completed` or `failed`.
//!
//! ```text
//!          start()            status=completed
//!   Idle ──────────▶ Polling ─────────────────▶ Completed
//!                     │  ▲
//!        transient err│  │ ok (failures reset)
//!                     ▼  │
//!                    (retry, backoff) ──────────▶ Failed
//!                        status=failed | budget exhausted | fatal error
//! ```
//!
//! [`PollState`] is the pure state machine; it never performs I/O and is what
//! the unit tests exercise. [`StatusPoller::spawn`] wraps it in a tokio task
//! (a *poll cycle*) that issues requests, sleeps between them, and reports
//! [`PollEvent`]s over a channel.
//!
//! ## Cancellation
//!
//! Each cycle owns a [`CancellationToken`]. The token is checked while a
//! request is in flight, again as soon as the request resolves, and during
//! the sleep. A response that arrives after cancellation is dropped before it
//! touches the state machine, so no event is ever produced for it. Events
//! carry their cycle id as well, letting the receiver discard anything left
//! over from a superseded cycle.

use crate::backend::JobBackend;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::mode::ProcessorMode;
use crate::model::{JobId, JobSnapshot, JobStatus, ResultItem, StatusResponse};
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity of one poll cycle; unique within a workflow.
pub type CycleId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollPhase {
    Idle,
    Polling,
    Completed,
    Failed,
}

impl PollPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PollPhase::Completed | PollPhase::Failed)
    }
}

/// Why a cycle ended in [`PollPhase::Failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollFailure {
    /// The backend reported `status: failed`.
    JobFailed { reason: String },
    /// Too many consecutive transport failures.
    GaveUp { attempts: u32, last_error: String },
    /// A non-retryable error such as an unknown job id.
    Fatal { error: String },
}

impl PollFailure {
    pub fn into_error(self, job_id: &JobId) -> ClientError {
        match self {
            PollFailure::JobFailed { reason } | PollFailure::Fatal { error: reason } => {
                ClientError::JobFailed {
                    job_id: job_id.to_string(),
                    reason,
                }
            }
            PollFailure::GaveUp {
                attempts,
                last_error,
            } => ClientError::PollingGaveUp {
                job_id: job_id.to_string(),
                attempts,
                last_error,
            },
        }
    }
}

impl std::fmt::Display for PollFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollFailure::JobFailed { reason } => write!(f, "job failed: {reason}"),
            PollFailure::GaveUp {
                attempts,
                last_error,
            } => write!(f, "gave up after {attempts} failed status requests: {last_error}"),
            PollFailure::Fatal { error } => f.write_str(error),
        }
    }
}

/// Result of feeding one response or error into [`PollState`].
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Non-terminal status applied; poll again after the normal interval.
    Continue,
    /// Transient failure; poll again after backing off.
    Retry { attempt: u32 },
    Completed(Vec<ResultItem>),
    Failed(PollFailure),
    /// The machine is not polling (not started, or already terminal).
    Ignored,
}

/// The poll state machine for one job.
#[derive(Debug, Clone)]
pub struct PollState {
    snapshot: JobSnapshot,
    phase: PollPhase,
    consecutive_failures: u32,
    max_failures: u32,
    last_error: Option<String>,
}

impl PollState {
    pub fn new(job_id: JobId, mode: Option<ProcessorMode>, max_failures: u32) -> Self {
        Self {
            snapshot: JobSnapshot::new(job_id, mode),
            phase: PollPhase::Idle,
            consecutive_failures: 0,
            max_failures: max_failures.max(1),
            last_error: None,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn snapshot(&self) -> &JobSnapshot {
        &self.snapshot
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `Idle → Polling`. Returns `false` if already started.
    pub fn start(&mut self) -> bool {
        if self.phase != PollPhase::Idle {
            return false;
        }
        self.phase = PollPhase::Polling;
        true
    }

    pub fn apply_response(&mut self, response: StatusResponse) -> PollOutcome {
        if self.phase != PollPhase::Polling {
            return PollOutcome::Ignored;
        }

        self.consecutive_failures = 0;
        self.last_error = None;
        self.snapshot.status = response.status;
        self.snapshot.progress = response.progress;
        if response.processor.is_some() {
            self.snapshot.processor = response.processor;
        }

        match response.status {
            JobStatus::Completed => {
                self.phase = PollPhase::Completed;
                PollOutcome::Completed(response.results)
            }
            JobStatus::Failed => {
                self.phase = PollPhase::Failed;
                let reason = response
                    .results
                    .iter()
                    .find_map(|r| r.error.clone())
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "the server reported the job as failed".to_string());
                PollOutcome::Failed(PollFailure::JobFailed { reason })
            }
            JobStatus::Queued | JobStatus::Processing => PollOutcome::Continue,
        }
    }

    pub fn apply_error(&mut self, error: &ClientError) -> PollOutcome {
        if self.phase != PollPhase::Polling {
            return PollOutcome::Ignored;
        }

        let message = error.to_string();
        if !error.is_transient() {
            self.phase = PollPhase::Failed;
            self.snapshot.status = JobStatus::Failed;
            self.last_error = Some(message.clone());
            return PollOutcome::Failed(PollFailure::Fatal { error: message });
        }

        self.consecutive_failures += 1;
        self.last_error = Some(message.clone());
        if self.consecutive_failures >= self.max_failures {
            self.phase = PollPhase::Failed;
            self.snapshot.status = JobStatus::Failed;
            return PollOutcome::Failed(PollFailure::GaveUp {
                attempts: self.consecutive_failures,
                last_error: message,
            });
        }
        PollOutcome::Retry {
            attempt: self.consecutive_failures,
        }
    }
}

/// Message from a running poll cycle.
#[derive(Debug, Clone)]
pub struct PollEvent {
    pub cycle: CycleId,
    pub kind: PollEventKind,
}

#[derive(Debug, Clone)]
pub enum PollEventKind {
    /// A non-terminal status response was applied.
    Progress(JobSnapshot),
    /// Sent at most once per cycle.
    Completed {
        snapshot: JobSnapshot,
        results: Vec<ResultItem>,
    },
    /// Sent at most once per cycle.
    Failed {
        snapshot: JobSnapshot,
        failure: PollFailure,
    },
}

/// Starts poll cycles against a backend.
pub struct StatusPoller {
    backend: Arc<dyn JobBackend>,
    config: ClientConfig,
}

impl StatusPoller {
    pub fn new(backend: Arc<dyn JobBackend>, config: ClientConfig) -> Self {
        Self { backend, config }
    }

    /// Spawn a cycle for `job_id`. The first request is issued immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        &self,
        cycle: CycleId,
        job_id: JobId,
        mode: Option<ProcessorMode>,
        events: UnboundedSender<PollEvent>,
    ) -> PollCycle {
        let token = CancellationToken::new();
        let task = PollTask {
            backend: Arc::clone(&self.backend),
            callback: self.config.progress_callback.clone(),
            config: self.config.clone(),
            cycle,
            token: token.clone(),
            events,
            state: PollState::new(job_id.clone(), mode, self.config.max_poll_failures),
        };
        let handle = tokio::spawn(task.run());
        PollCycle {
            id: cycle,
            job_id,
            token,
            handle: Some(handle),
        }
    }
}

/// Handle to a running poll cycle.
///
/// Dropping the handle cancels the cycle.
#[derive(Debug)]
pub struct PollCycle {
    id: CycleId,
    job_id: JobId,
    token: CancellationToken,
    handle: Option<JoinHandle<PollPhase>>,
}

impl PollCycle {
    pub fn id(&self) -> CycleId {
        self.id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Stop the cycle. No request is issued and no event is sent afterwards.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("Cancelling poll cycle {} for job {}", self.id, self.job_id);
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A clone of the cycle's token, e.g. for a Ctrl-C handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the task to exit and return the phase it ended in.
    ///
    /// A cancelled cycle reports the phase it was in when it stopped.
    pub async fn join(mut self) -> PollPhase {
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(PollPhase::Failed),
            None => PollPhase::Failed,
        }
    }
}

impl Drop for PollCycle {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

struct PollTask {
    backend: Arc<dyn JobBackend>,
    callback: Option<ProgressCallback>,
    config: ClientConfig,
    cycle: CycleId,
    token: CancellationToken,
    events: UnboundedSender<PollEvent>,
    state: PollState,
}

impl PollTask {
    async fn run(mut self) -> PollPhase {
        self.state.start();
        let job_id = self.state.snapshot().job_id.clone();
        info!("Polling job {} (cycle {})", job_id, self.cycle);

        loop {
            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                r = self.backend.status(&job_id) => r,
            };
            // The response may have resolved in the same tick as the cancel.
            if self.token.is_cancelled() {
                debug!("Dropping status response for cancelled cycle {}", self.cycle);
                break;
            }

            let outcome = match result {
                Ok(response) => self.state.apply_response(response),
                Err(e) => {
                    warn!("Job {}: status request failed: {}", job_id, e);
                    self.state.apply_error(&e)
                }
            };

            let delay = match outcome {
                PollOutcome::Continue => {
                    let snapshot = self.state.snapshot().clone();
                    if !self.emit(PollEventKind::Progress(snapshot)) {
                        break;
                    }
                    self.config.poll_delay(0)
                }
                PollOutcome::Retry { attempt } => {
                    let delay = self.config.poll_delay(attempt);
                    warn!(
                        "Job {}: retry {}/{} after {}ms",
                        job_id,
                        attempt,
                        self.config.max_poll_failures,
                        delay.as_millis()
                    );
                    if let Some(ref cb) = self.callback {
                        cb.on_poll_error(
                            &job_id,
                            attempt,
                            self.config.max_poll_failures,
                            self.state.last_error().unwrap_or_default(),
                        );
                    }
                    delay
                }
                PollOutcome::Completed(results) => {
                    info!("Job {} completed with {} result(s)", job_id, results.len());
                    let snapshot = self.state.snapshot().clone();
                    self.emit(PollEventKind::Completed { snapshot, results });
                    break;
                }
                PollOutcome::Failed(failure) => {
                    warn!("Job {} failed: {}", job_id, failure);
                    let snapshot = self.state.snapshot().clone();
                    self.emit(PollEventKind::Failed { snapshot, failure });
                    break;
                }
                PollOutcome::Ignored => break,
            };

            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.state.phase()
    }

    /// Returns `false` once nobody is listening.
    fn emit(&self, kind: PollEventKind) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        self.events
            .send(PollEvent {
                cycle: self.cycle,
                kind,
            })
            .is_ok()
    }
}
