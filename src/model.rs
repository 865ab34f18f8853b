//! Job, progress and result types shared by every component.
//!
//! The wire types ([`StatusResponse`], [`SubmitResponse`]) mirror the backend's
//! JSON exactly; [`JobSnapshot`] is the client-side view the poller hands to
//! the workflow after each status response.

use crate::mode::{processor_label, ProcessorMode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque job identifier assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Backend-reported job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Units of work done out of the total, sent by the backend as `"N/M"`.
///
/// Parsing is lenient: anything that is not two unsigned integers separated by
/// `/` reads as `0/0`, which renders as 0 %.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(completed: u64, total: u64) -> Self {
        Self { completed, total }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (c, t) = s.trim().split_once('/')?;
        Some(Self {
            completed: c.trim().parse().ok()?,
            total: t.trim().parse().ok()?,
        })
    }

    /// `completed / total × 100`, or 0 when `total` is 0.
    ///
    /// Not clamped: a backend reporting `4/3` yields 133.3.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

impl From<String> for Progress {
    fn from(s: String) -> Self {
        Self::parse(&s).unwrap_or_default()
    }
}

impl From<Progress> for String {
    fn from(p: Progress) -> Self {
        p.to_string()
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// One produced artifact, or a per-item failure, in a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultItem {
    /// Name of the uploaded source file.
    pub filename: String,

    /// Name of the produced artifact, when the backend reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Processing error for this item; such items have no content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Position of the source file in the submitted batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ResultItem {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// An empty error string counts as success.
    pub fn is_success(&self) -> bool {
        self.error.as_deref().map_or(true, str::is_empty)
    }

    /// Preferred local name for the downloaded artifact.
    pub fn display_name(&self) -> &str {
        self.output_filename.as_deref().unwrap_or(&self.filename)
    }
}

/// Body of `GET /api/status/{job_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub processor: Option<String>,
    #[serde(default)]
    pub results: Vec<ResultItem>,
}

/// Body of `POST /api/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client-side view of a job after the latest status response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: Progress,
    /// Mode chosen at submission; `None` when attached to an existing job.
    pub mode: Option<ProcessorMode>,
    /// Raw processor tag echoed by the backend.
    pub processor: Option<String>,
}

impl JobSnapshot {
    pub fn new(job_id: JobId, mode: Option<ProcessorMode>) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            progress: Progress::default(),
            mode,
            processor: None,
        }
    }

    pub fn percentage(&self) -> f64 {
        self.progress.percentage()
    }

    /// Label from the backend's tag, else from the submitted mode.
    pub fn processor_label(&self) -> &'static str {
        match (&self.processor, self.mode) {
            (Some(tag), _) => processor_label(tag),
            (None, Some(mode)) => mode.label(),
            (None, None) => crate::mode::GENERIC_LABEL,
        }
    }
}

/// A fetched artifact before it is written to disk.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// Name suggested by `Content-Disposition`, if any.
    pub suggested_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}
