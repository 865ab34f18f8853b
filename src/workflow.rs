//! Workflow coordinator: one job from file selection to downloadable results.
//!
//! [`Workflow`] owns all client-side state for the lifecycle:
//!
//! 1. **Select**: pick a [`ProcessorMode`] and add documents.
//! 2. **Submit**: validate and upload; a job id comes back.
//! 3. **Poll**: a [`PollCycle`] reports progress over a channel; the
//!    coordinator applies each event to its own state.
//! 4. **Retrieve**: once complete, [`Workflow::retriever`] lends the manifest
//!    to a [`ResultRetriever`].
//! 5. **Reset**: cancel everything and start over.
//!
//! The coordinator is a plain `&mut self` state holder. Poll tasks never touch
//! it directly; they send [`PollEvent`]s tagged with their cycle id, and
//! [`Workflow::apply`] drops anything that is not from the current cycle.
//!
//! # Example
//! ```rust,no_run
//! use docjob_client::{ClientConfig, ProcessorMode, Workflow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), docjob_client::ClientError> {
//!     let mut wf = Workflow::new(ClientConfig::default())?;
//!     wf.select_mode(ProcessorMode::ExtractEquations);
//!     wf.add_paths(&["thesis.docx", "notes.docx"]).await?;
//!     wf.submit().await?;
//!     let results = wf.wait_for_completion().await?;
//!     println!("{} result(s)", results.len());
//!
//!     let retriever = wf.retriever()?;
//!     for (position, item) in results.iter().enumerate() {
//!         if item.is_success() {
//!             retriever.download_item(position, "out").await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use crate::backend::{Endpoints, HttpBackend, JobBackend};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::mode::ProcessorMode;
use crate::model::{JobId, JobSnapshot, ResultItem};
use crate::poll::{CycleId, PollCycle, PollEvent, PollEventKind, PollFailure, PollPhase, StatusPoller};
use crate::progress::ProgressCallback;
use crate::retrieve::ResultRetriever;
use crate::submit::{validate_selection, Submitter, UploadFile};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// Client-side state for one submission at a time.
pub struct Workflow {
    config: ClientConfig,
    backend: Arc<dyn JobBackend>,
    endpoints: Endpoints,
    submitter: Submitter,
    poller: StatusPoller,
    callback: Option<ProgressCallback>,

    mode: ProcessorMode,
    selection: Vec<UploadFile>,

    active_job: Option<JobId>,
    completed_job: Option<JobId>,
    results: Vec<ResultItem>,
    snapshot: Option<JobSnapshot>,
    last_error: Option<String>,
    failure: Option<(JobId, PollFailure)>,

    cycle: Option<PollCycle>,
    next_cycle: CycleId,
    events_tx: UnboundedSender<PollEvent>,
    events_rx: UnboundedReceiver<PollEvent>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("backend", &self.backend.name())
            .field("mode", &self.mode)
            .field("selection", &self.selection.len())
            .field("active_job", &self.active_job)
            .field("completed_job", &self.completed_job)
            .field("results", &self.results.len())
            .field("last_error", &self.last_error)
            .field("cycle", &self.cycle.as_ref().map(PollCycle::id))
            .finish()
    }
}

impl Workflow {
    /// Build a workflow. Uses `config.backend` when set, otherwise an
    /// [`HttpBackend`] for `config.base_url`.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let backend: Arc<dyn JobBackend> = match config.backend {
            Some(ref b) => Arc::clone(b),
            None => Arc::new(HttpBackend::new(&config)?),
        };
        let endpoints = Endpoints::new(&config.base_url)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        debug!("Workflow using '{}' backend at {}", backend.name(), config.base_url);

        Ok(Self {
            submitter: Submitter::new(Arc::clone(&backend), config.clone()),
            poller: StatusPoller::new(Arc::clone(&backend), config.clone()),
            callback: config.progress_callback.clone(),
            endpoints,
            backend,
            config,
            mode: ProcessorMode::default(),
            selection: Vec::new(),
            active_job: None,
            completed_job: None,
            results: Vec::new(),
            snapshot: None,
            last_error: None,
            failure: None,
            cycle: None,
            next_cycle: 0,
            events_tx,
            events_rx,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn JobBackend> {
        &self.backend
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn mode(&self) -> ProcessorMode {
        self.mode
    }

    pub fn selection(&self) -> &[UploadFile] {
        &self.selection
    }

    /// Job currently being polled.
    pub fn active_job(&self) -> Option<&JobId> {
        self.active_job.as_ref()
    }

    /// Job whose results are available.
    pub fn completed_job(&self) -> Option<&JobId> {
        self.completed_job.as_ref()
    }

    /// Manifest of the completed job; empty otherwise.
    pub fn results(&self) -> &[ResultItem] {
        &self.results
    }

    /// Latest status seen for the current job.
    pub fn snapshot(&self) -> Option<&JobSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn phase(&self) -> PollPhase {
        if self.completed_job.is_some() {
            PollPhase::Completed
        } else if self.active_job.is_some() {
            PollPhase::Polling
        } else if self.failure.is_some() {
            PollPhase::Failed
        } else {
            PollPhase::Idle
        }
    }

    /// Cancellation token of the running poll cycle, if any.
    ///
    /// Cancelling it makes [`Self::wait_for_completion`] return
    /// [`ClientError::Cancelled`].
    pub fn cancellation_token(&self) -> Option<tokio_util::sync::CancellationToken> {
        self.cycle.as_ref().map(PollCycle::cancellation_token)
    }

    // ── Selection ────────────────────────────────────────────────────────

    pub fn select_mode(&mut self, mode: ProcessorMode) {
        self.mode = mode;
    }

    pub fn add_file(&mut self, file: UploadFile) {
        self.selection.push(file);
    }

    /// Read `paths` from disk and append them to the selection.
    ///
    /// Nothing is added if any file cannot be read.
    pub async fn add_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize, ClientError> {
        let files = UploadFile::from_paths(paths).await?;
        let n = files.len();
        self.selection.extend(files);
        Ok(n)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Upload the current selection and start polling the new job.
    ///
    /// On failure the selection is kept so the caller can retry. A selection
    /// rejected locally leaves any running or completed job untouched.
    pub async fn submit(&mut self) -> Result<JobId, ClientError> {
        if let Err(e) = validate_selection(&self.selection, &self.config) {
            self.last_error = Some(e.to_string());
            return Err(e);
        }

        self.stop_cycle();
        self.clear_job_state();

        match self.submitter.submit(&self.selection, self.mode).await {
            Ok(job_id) => {
                self.selection.clear();
                self.start_polling(job_id.clone(), Some(self.mode));
                Ok(job_id)
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Poll an existing job without uploading anything.
    pub fn attach(&mut self, job_id: JobId) {
        info!("Attaching to job {}", job_id);
        self.stop_cycle();
        self.clear_job_state();
        self.start_polling(job_id, None);
    }

    /// Apply one event from a poll cycle. Returns `false` if it was stale.
    pub fn apply(&mut self, event: PollEvent) -> bool {
        let current = self.cycle.as_ref().map(PollCycle::id);
        if current != Some(event.cycle) {
            debug!("Ignoring event from stale poll cycle {}", event.cycle);
            return false;
        }

        match event.kind {
            PollEventKind::Progress(snapshot) => {
                if let Some(ref cb) = self.callback {
                    cb.on_status(&snapshot);
                }
                self.snapshot = Some(snapshot);
            }
            PollEventKind::Completed { snapshot, results } => {
                self.cycle = None;
                let job_id = self
                    .active_job
                    .take()
                    .unwrap_or_else(|| snapshot.job_id.clone());
                self.results = results;
                self.last_error = None;
                if let Some(ref cb) = self.callback {
                    cb.on_status(&snapshot);
                    cb.on_job_complete(&job_id, &self.results);
                }
                self.snapshot = Some(snapshot);
                self.completed_job = Some(job_id);
            }
            PollEventKind::Failed { snapshot, failure } => {
                self.cycle = None;
                let job_id = self
                    .active_job
                    .take()
                    .unwrap_or_else(|| snapshot.job_id.clone());
                let message = failure.to_string();
                if let Some(ref cb) = self.callback {
                    cb.on_job_failed(&job_id, &message);
                }
                self.last_error = Some(message);
                self.snapshot = Some(snapshot);
                self.failure = Some((job_id, failure));
            }
        }
        true
    }

    /// Apply poll events until the current job completes or fails.
    ///
    /// Returns the manifest, or [`ClientError::JobFailed`] /
    /// [`ClientError::PollingGaveUp`]. If the cycle's cancellation token
    /// fires, the workflow is reset and [`ClientError::Cancelled`] returned.
    pub async fn wait_for_completion(&mut self) -> Result<Vec<ResultItem>, ClientError> {
        loop {
            if self.completed_job.is_some() {
                return Ok(self.results.clone());
            }
            let Some(ref cycle) = self.cycle else {
                return Err(match self.failure.clone() {
                    Some((job_id, failure)) => failure.into_error(&job_id),
                    None => ClientError::NoCompletedJob,
                });
            };

            let token = cycle.cancellation_token();
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                e = self.events_rx.recv() => e,
            };

            match event {
                Some(event) => {
                    self.apply(event);
                }
                None => {
                    let job_id = self
                        .active_job
                        .as_ref()
                        .map(JobId::to_string)
                        .unwrap_or_default();
                    warn!("Polling cancelled for job {}", job_id);
                    self.reset();
                    return Err(ClientError::Cancelled { job_id });
                }
            }
        }
    }

    /// Cancel any poll cycle and forget the selection, job, and results.
    pub fn reset(&mut self) {
        self.stop_cycle();
        self.clear_job_state();
        self.selection.clear();
        // Drain anything a finished cycle left behind.
        while self.events_rx.try_recv().is_ok() {}
    }

    /// Download actions over the completed job's manifest.
    pub fn retriever(&self) -> Result<ResultRetriever<'_>, ClientError> {
        let job_id = self.completed_job.as_ref().ok_or(ClientError::NoCompletedJob)?;
        Ok(ResultRetriever::new(
            Arc::clone(&self.backend),
            &self.endpoints,
            job_id,
            &self.results,
            self.callback.clone(),
        ))
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn start_polling(&mut self, job_id: JobId, mode: Option<ProcessorMode>) {
        self.next_cycle += 1;
        let cycle = self.next_cycle;
        self.snapshot = Some(JobSnapshot::new(job_id.clone(), mode));
        self.active_job = Some(job_id.clone());
        self.cycle = Some(
            self.poller
                .spawn(cycle, job_id, mode, self.events_tx.clone()),
        );
    }

    fn stop_cycle(&mut self) {
        if let Some(cycle) = self.cycle.take() {
            cycle.cancel();
        }
    }

    fn clear_job_state(&mut self) {
        self.active_job = None;
        self.completed_job = None;
        self.results.clear();
        self.snapshot = None;
        self.last_error = None;
        self.failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DownloadedFile, JobStatus, Progress, StatusResponse, SubmitResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts every upload and reports jobs as processing forever.
    #[derive(Default)]
    struct StuckBackend {
        submits: AtomicUsize,
    }

    #[async_trait]
    impl JobBackend for StuckBackend {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn submit(
            &self,
            _files: &[UploadFile],
            _mode: ProcessorMode,
        ) -> Result<SubmitResponse, ClientError> {
            let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SubmitResponse {
                job_id: JobId::new(format!("job-{n}")),
                status: Some(JobStatus::Queued),
                message: None,
            })
        }

        async fn status(&self, job_id: &JobId) -> Result<StatusResponse, ClientError> {
            Ok(StatusResponse {
                job_id: Some(job_id.clone()),
                status: JobStatus::Processing,
                progress: Progress::new(0, 1),
                processor: None,
                results: vec![],
            })
        }

        async fn download(
            &self,
            _job_id: &JobId,
            _index: Option<usize>,
        ) -> Result<DownloadedFile, ClientError> {
            Err(ClientError::Internal("unused".into()))
        }
    }

    fn workflow(backend: Arc<StuckBackend>) -> Workflow {
        let config = ClientConfig::builder()
            .backend(backend)
            .poll_interval_ms(5)
            .build()
            .unwrap();
        Workflow::new(config).unwrap()
    }

    fn event(cycle: CycleId, job: &str, results: Vec<ResultItem>) -> PollEvent {
        PollEvent {
            cycle,
            kind: PollEventKind::Completed {
                snapshot: JobSnapshot::new(JobId::new(job), None),
                results,
            },
        }
    }

    #[tokio::test]
    async fn empty_selection_is_rejected_without_a_request() {
        let backend = Arc::new(StuckBackend::default());
        let mut wf = workflow(backend.clone());

        let err = wf.submit().await.unwrap_err();
        assert!(matches!(err, ClientError::NoFilesSelected));
        assert_eq!(backend.submits.load(Ordering::SeqCst), 0);
        assert!(wf.active_job().is_none());
        assert!(wf.last_error().is_some());
    }

    #[tokio::test]
    async fn invalid_selection_is_kept_for_retry() {
        let backend = Arc::new(StuckBackend::default());
        let mut wf = workflow(backend.clone());
        wf.add_file(UploadFile::new("scan.pdf", b"%PDF".to_vec()));

        assert!(wf.submit().await.is_err());
        assert_eq!(wf.selection().len(), 1);
        assert_eq!(backend.submits.load(Ordering::SeqCst), 0);
        assert_eq!(wf.phase(), PollPhase::Idle);
    }

    #[tokio::test]
    async fn rejected_selection_leaves_running_job_alone() {
        let backend = Arc::new(StuckBackend::default());
        let mut wf = workflow(backend.clone());
        wf.add_file(UploadFile::new("a.docx", b"PK".to_vec()));
        let job = wf.submit().await.unwrap();
        let token = wf.cancellation_token().unwrap();

        wf.add_file(UploadFile::new("scan.pdf", b"%PDF".to_vec()));
        let err = wf.submit().await.unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedFileType { .. }));

        assert_eq!(wf.active_job(), Some(&job));
        assert_eq!(wf.phase(), PollPhase::Polling);
        assert!(!token.is_cancelled());
        assert!(wf.last_error().unwrap().contains("scan.pdf"));
        assert_eq!(wf.selection().len(), 1);
        assert_eq!(backend.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submit_clears_selection_and_starts_polling() {
        let backend = Arc::new(StuckBackend::default());
        let mut wf = workflow(backend);
        wf.select_mode(ProcessorMode::VerifyAndScan);
        wf.add_file(UploadFile::new("a.docx", b"PK".to_vec()));

        let job = wf.submit().await.unwrap();
        assert_eq!(job.as_str(), "job-1");
        assert!(wf.selection().is_empty());
        assert_eq!(wf.active_job(), Some(&job));
        assert_eq!(wf.phase(), PollPhase::Polling);
        assert_eq!(wf.snapshot().unwrap().processor_label(), "Scan & Verify");
    }

    #[tokio::test]
    async fn events_from_superseded_cycles_are_ignored() {
        let backend = Arc::new(StuckBackend::default());
        let mut wf = workflow(backend);
        wf.add_file(UploadFile::new("a.docx", b"PK".to_vec()));
        wf.submit().await.unwrap();
        wf.add_file(UploadFile::new("b.docx", b"PK".to_vec()));
        wf.submit().await.unwrap();

        // Cycle 1 belonged to job-1 and has been replaced.
        assert!(!wf.apply(event(1, "job-1", vec![ResultItem::new("a.html")])));
        assert!(wf.completed_job().is_none());
        assert_eq!(wf.active_job().map(JobId::as_str), Some("job-2"));

        assert!(wf.apply(event(2, "job-2", vec![ResultItem::new("b.html")])));
        assert_eq!(wf.completed_job().map(JobId::as_str), Some("job-2"));
        assert!(wf.active_job().is_none());
        assert_eq!(wf.results().len(), 1);
    }

    #[tokio::test]
    async fn completion_is_applied_once() {
        let backend = Arc::new(StuckBackend::default());
        let mut wf = workflow(backend);
        wf.attach(JobId::new("abc123"));

        assert!(wf.apply(event(1, "abc123", vec![ResultItem::new("a.html")])));
        // The cycle is gone, so a duplicate terminal event is stale.
        assert!(!wf.apply(event(1, "abc123", vec![])));
        assert_eq!(wf.results().len(), 1);
        assert!(wf.retriever().is_ok());
    }

    #[tokio::test]
    async fn failure_event_records_reason() {
        let backend = Arc::new(StuckBackend::default());
        let mut wf = workflow(backend);
        wf.attach(JobId::new("abc123"));

        wf.apply(PollEvent {
            cycle: 1,
            kind: PollEventKind::Failed {
                snapshot: JobSnapshot::new(JobId::new("abc123"), None),
                failure: PollFailure::JobFailed {
                    reason: "converter crashed".into(),
                },
            },
        });
        assert_eq!(wf.phase(), PollPhase::Failed);
        assert!(wf.active_job().is_none());
        assert!(wf.last_error().unwrap().contains("converter crashed"));

        match wf.wait_for_completion().await.unwrap_err() {
            ClientError::JobFailed { job_id, reason } => {
                assert_eq!(job_id, "abc123");
                assert_eq!(reason, "converter crashed");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reset_cancels_polling_and_clears_state() {
        let backend = Arc::new(StuckBackend::default());
        let mut wf = workflow(backend);
        wf.add_file(UploadFile::new("a.docx", b"PK".to_vec()));
        wf.submit().await.unwrap();
        let token = wf.cancellation_token().unwrap();

        wf.reset();
        assert!(token.is_cancelled());
        assert_eq!(wf.phase(), PollPhase::Idle);
        assert!(wf.snapshot().is_none());
        assert!(matches!(wf.retriever(), Err(ClientError::NoCompletedJob)));
        assert!(matches!(
            wf.wait_for_completion().await,
            Err(ClientError::NoCompletedJob)
        ));
    }

    #[tokio::test]
    async fn cancelling_the_token_ends_the_wait() {
        let backend = Arc::new(StuckBackend::default());
        let mut wf = workflow(backend);
        wf.attach(JobId::new("abc123"));

        let token = wf.cancellation_token().unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        });

        match wf.wait_for_completion().await.unwrap_err() {
            ClientError::Cancelled { job_id } => assert_eq!(job_id, "abc123"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(wf.phase(), PollPhase::Idle);
    }
}
