//! # docjob-client
//!
//! Client for a document-processing server: upload Word documents, follow
//! the job while the server works on them, then fetch the results.
//!
//! ## Why this crate?
//!
//! The server's API is small but stateful. A job is created by one upload,
//! observed through repeated status requests, and only then do its artifacts
//! become downloadable. Getting the details right is fiddly: stale responses
//! from an abandoned job, per-item download indices that skip failed items,
//! bounded retries when the server blips. This crate packages that lifecycle
//! behind one coordinator.
//!
//! ## Lifecycle
//!
//! ```text
//! select files + mode
//!  │
//!  ├─ 1. Submit    validate locally, POST /api/process      → job id
//!  ├─ 2. Poll      GET /api/status/{id} every 2 s           → progress N/M
//!  │               (transient errors back off, then give up)
//!  ├─ 3. Complete  manifest of result items, some may carry errors
//!  └─ 4. Retrieve  GET /api/download/{id}/{n} or the whole archive
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docjob_client::{ClientConfig, ProcessorMode, Workflow};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("http://localhost:8000")
//!         .build()?;
//!     let mut wf = Workflow::new(config)?;
//!     wf.select_mode(ProcessorMode::ConvertToHtml);
//!     wf.add_paths(&["report.docx"]).await?;
//!     wf.submit().await?;
//!
//!     let results = wf.wait_for_completion().await?;
//!     let retriever = wf.retriever()?;
//!     if retriever.bulk_available() {
//!         retriever.download_all("out").await?;
//!     } else {
//!         for saved in retriever.download_each("out").await {
//!             println!("{}", saved?.display());
//!         }
//!     }
//!     eprintln!("{} item(s)", results.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docjob` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docjob-client = { version = "0.1", default-features = false }
//! ```
//!
//! ## Processing Modes
//!
//! | Mode | Wire tag | Label |
//! |------|----------|-------|
//! | `convert-to-html` | `word_to_html` | Word to HTML |
//! | `extract-equations` | `latex_equations` | Equation Extraction (LaTeX) |
//! | `verify-and-scan` | `scan_verify` | Scan & Verify |
//! | `complete-conversion` | `full_word` | Complete Word Conversion |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod format;
pub mod mode;
pub mod model;
pub mod poll;
pub mod progress;
pub mod retrieve;
pub mod submit;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{content_disposition_filename, Endpoints, HttpBackend, JobBackend};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::ClientError;
pub use format::format_size;
pub use mode::{processor_label, ProcessorMode};
pub use model::{
    DownloadedFile, JobId, JobSnapshot, JobStatus, Progress, ResultItem, StatusResponse,
    SubmitResponse,
};
pub use poll::{
    CycleId, PollCycle, PollEvent, PollEventKind, PollFailure, PollOutcome, PollPhase, PollState,
    StatusPoller,
};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use retrieve::{bulk_download_available, safe_file_name, ResultEntry, ResultRetriever};
pub use submit::{validate_selection, Submitter, UploadFile};
pub use workflow::Workflow;
