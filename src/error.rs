//! Error types for the docjob-client library.
//!
//! Every fallible operation returns [`ClientError`]. The variants are grouped
//! by the stage that produces them:
//!
//! * **Selection / submission**: the upload never reached the backend, or the
//!   backend refused it. The workflow keeps the file selection so the caller
//!   can fix the problem and resubmit.
//! * **Transport**: a single HTTP exchange failed. The status poller counts
//!   these toward its failure budget instead of giving up immediately.
//! * **Job**: the backend reported a terminal failure, or polling gave up.
//! * **Download**: an artifact could not be fetched or written to disk.
//!
//! Per-item processing failures are *not* errors at this level: they arrive
//! as [`crate::model::ResultItem::error`] inside an otherwise successful job.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the docjob-client library.
#[derive(Debug, Error)]
pub enum ClientError {
    // ── Selection errors ──────────────────────────────────────────────────
    /// Submission attempted with an empty file selection.
    #[error("No files selected.\nAdd at least one document before submitting.")]
    NoFilesSelected,

    /// More files than the backend accepts per request.
    #[error("Too many files: {count} selected, at most {max} allowed per job")]
    TooManyFiles { count: usize, max: usize },

    /// File extension is not one the backend can process.
    #[error("Unsupported file type '{name}'\nAllowed extensions: {allowed}")]
    UnsupportedFileType { name: String, allowed: String },

    /// File exceeds the per-file upload limit.
    #[error("File '{name}' is {size} bytes, limit is {max} bytes")]
    FileTooLarge { name: String, size: u64, max: u64 },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Reading an input file failed for another reason.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Submission errors ─────────────────────────────────────────────────
    /// The backend could not be reached or rejected the upload.
    #[error("Job submission failed: {source}")]
    SubmissionFailed {
        #[source]
        source: Box<ClientError>,
    },

    // ── Transport errors ──────────────────────────────────────────────────
    /// Connection-level failure (DNS, refused, reset).
    #[error("Request to '{url}' failed: {reason}\nIs the processing server running?")]
    Transport { url: String, reason: String },

    /// Request exceeded the configured timeout.
    #[error("Request to '{url}' timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// Backend answered with a non-success status code.
    #[error("HTTP {status} from '{url}': {detail}")]
    HttpStatus {
        url: String,
        status: u16,
        detail: String,
    },

    /// Response body could not be decoded.
    #[error("Invalid response from '{url}': {detail}")]
    InvalidResponse { url: String, detail: String },

    /// The backend does not know this job (expired or never existed).
    #[error("Job '{job_id}' not found on the server")]
    JobNotFound { job_id: String },

    // ── Job errors ────────────────────────────────────────────────────────
    /// The backend reported the job as failed.
    #[error("Job '{job_id}' failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    /// Status polling stopped after too many consecutive transport failures.
    #[error("Gave up polling job '{job_id}' after {attempts} consecutive failures.\nLast error: {last_error}")]
    PollingGaveUp {
        job_id: String,
        attempts: u32,
        last_error: String,
    },

    /// The poll cycle was cancelled before the job reached a terminal state.
    #[error("Polling of job '{job_id}' was cancelled")]
    Cancelled { job_id: String },

    /// An operation needed a completed job but none is present.
    #[error("No completed job; submit documents and wait for completion first")]
    NoCompletedJob,

    // ── Download errors ───────────────────────────────────────────────────
    /// Manifest position does not exist.
    #[error("Result {index} is out of range (job has {total} results)")]
    ItemOutOfRange { index: usize, total: usize },

    /// The item failed on the backend and has no content.
    #[error("Result '{filename}' has no downloadable content: {reason}")]
    ItemNotDownloadable { filename: String, reason: String },

    /// Bulk archive requested for a manifest that does not qualify.
    #[error("Download-all is only available for jobs with more than one result and no failed items")]
    BulkDownloadUnavailable,

    /// Fetching an artifact failed.
    #[error("Download from '{url}' failed: {source}")]
    DownloadFailed {
        url: String,
        #[source]
        source: Box<ClientError>,
    },

    /// Could not write a downloaded artifact to disk.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Whether the poller should keep trying after this error.
    ///
    /// A missing job never comes back, and a request the client built wrong
    /// will be built wrong again; everything else is worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport { .. }
            | ClientError::Timeout { .. }
            | ClientError::InvalidResponse { .. } => true,
            ClientError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
