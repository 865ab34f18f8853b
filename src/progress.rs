//! Observer hook for job lifecycle events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::ClientConfigBuilder::progress_callback`] to receive events
//! from the submitter, the status poller and the result retriever. The CLI
//! uses it to drive a progress bar; a GUI can forward the events to its own
//! event loop.
//!
//! # Example
//!
//! ```rust
//! use docjob_client::{ClientConfig, JobProgressCallback, JobSnapshot};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     updates: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_status(&self, snapshot: &JobSnapshot) {
//!         self.updates.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} {:.0}%", snapshot.job_id, snapshot.percentage());
//!     }
//! }
//!
//! let config = ClientConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { updates: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::model::{JobId, JobSnapshot, ResultItem};
use crate::mode::ProcessorMode;
use std::path::Path;
use std::sync::Arc;

/// Called by the workflow components as a job moves through its lifecycle.
///
/// The poller runs on a tokio task, so implementations must be
/// `Send + Sync`. All methods default to no-ops.
pub trait JobProgressCallback: Send + Sync {
    /// Called before the upload request is sent.
    fn on_submit_start(&self, file_count: usize, mode: ProcessorMode) {
        let _ = (file_count, mode);
    }

    /// Called once the backend has accepted the upload.
    fn on_submitted(&self, job_id: &JobId) {
        let _ = job_id;
    }

    fn on_submit_error(&self, error: &str) {
        let _ = error;
    }

    /// Called after every successfully decoded status response.
    fn on_status(&self, snapshot: &JobSnapshot) {
        let _ = snapshot;
    }

    /// Called when a status request fails.
    ///
    /// # Arguments
    /// * `attempt`: consecutive failures so far (1-based)
    /// * `max`: failures tolerated before the job is marked failed
    fn on_poll_error(&self, job_id: &JobId, attempt: u32, max: u32, error: &str) {
        let _ = (job_id, attempt, max, error);
    }

    /// Called exactly once per job when it completes.
    fn on_job_complete(&self, job_id: &JobId, results: &[ResultItem]) {
        let _ = (job_id, results);
    }

    fn on_job_failed(&self, job_id: &JobId, reason: &str) {
        let _ = (job_id, reason);
    }

    /// Called after an artifact has been written to disk.
    fn on_download_complete(&self, path: &Path, bytes: u64) {
        let _ = (path, bytes);
    }

    fn on_download_error(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ClientConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;
