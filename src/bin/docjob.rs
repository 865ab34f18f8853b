//! CLI binary for docjob-client.
//!
//! A thin shim over the library crate that maps CLI flags to `ClientConfig`,
//! drives a `Workflow` to completion and saves the results.

use anyhow::{Context, Result};
use clap::Parser;
use docjob_client::{
    format_size, ClientConfig, ClientError, HttpBackend, JobBackend, JobId, JobProgressCallback,
    JobSnapshot, ProcessorMode, ProgressCallback, ResultEntry, ResultItem, Workflow,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal observer: a spinner while uploading, then a bar that follows the
/// server's `N/M` progress.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Set once the first status with a known total arrives.
    bar_active: AtomicBool,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            bar_active: AtomicBool::new(false),
        })
    }

    fn activate_bar(&self, total: u64, label: &str) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total);
        self.bar.set_style(style);
        self.bar.set_prefix(label.to_string());
        self.bar.reset_eta();
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_submit_start(&self, file_count: usize, mode: ProcessorMode) {
        self.bar.set_prefix("Uploading");
        self.bar
            .set_message(format!("{file_count} file(s) for {}", mode.label()));
    }

    fn on_submitted(&self, job_id: &JobId) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Job {job_id} submitted"))
        ));
        self.bar.set_prefix("Waiting");
        self.bar.set_message("queued…");
    }

    // The error itself is reported by main.
    fn on_submit_error(&self, _error: &str) {
        self.bar.finish_and_clear();
    }

    fn on_status(&self, snapshot: &JobSnapshot) {
        let total = snapshot.progress.total;
        if total > 0 && !self.bar_active.swap(true, Ordering::SeqCst) {
            self.activate_bar(total, snapshot.processor_label());
        }
        if self.bar_active.load(Ordering::SeqCst) {
            self.bar.set_position(snapshot.progress.completed);
            self.bar
                .set_message(format!("{:.0}%", snapshot.percentage()));
        } else {
            self.bar.set_message(snapshot.status.to_string());
        }
    }

    fn on_poll_error(&self, _job_id: &JobId, attempt: u32, max: u32, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} status check {attempt}/{max} failed  {}",
            cyan("⚠"),
            dim(&msg)
        ));
    }

    fn on_job_complete(&self, _job_id: &JobId, results: &[ResultItem]) {
        self.bar.finish_and_clear();
        let failed = results.iter().filter(|r| !r.is_success()).count();
        let ok = results.len() - failed;
        if failed == 0 {
            eprintln!("{} {} file(s) processed", green("✔"), bold(&ok.to_string()));
        } else {
            eprintln!(
                "{} {}/{} file(s) processed  ({} failed)",
                if ok == 0 { red("✘") } else { cyan("⚠") },
                bold(&ok.to_string()),
                results.len(),
                red(&failed.to_string()),
            );
        }
    }

    fn on_job_failed(&self, job_id: &JobId, reason: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} Job {job_id} failed: {}", red("✘"), red(reason));
    }

    fn on_download_complete(&self, path: &Path, bytes: u64) {
        eprintln!(
            "  {} {}  {}",
            green("✓"),
            path.display(),
            dim(&format_size(bytes))
        );
    }

    fn on_download_error(&self, error: &str) {
        eprintln!("  {} {}", red("✗"), red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert two documents to HTML, save results in ./out
  docjob report.docx notes.docx -o out

  # Extract equations as LaTeX from a thesis
  docjob --mode extract-equations thesis.docx

  # Talk to a remote server
  docjob --server https://docs.example.com report.docx

  # Resume a job started earlier
  docjob --job 3f2a9c1e-... -o out

  # Machine-readable manifest, no downloads
  docjob --json --no-download report.docx > manifest.json

  # Is the server up?
  docjob --check

MODES:
  convert-to-html      Word to HTML (default)
  extract-equations    Equation Extraction (LaTeX)
  verify-and-scan      Scan & Verify
  complete-conversion  Complete Word Conversion

LIMITS (enforced before upload):
  At most 10 files per job, 25 MB each, .docx or .doc only.

ENVIRONMENT VARIABLES:
  DOCJOB_SERVER        Server base URL (default http://localhost:8000)
  DOCJOB_MODE          Processing mode
  DOCJOB_OUTPUT        Output directory
  RUST_LOG             Log filter, overrides -v / -q
"#;

/// Submit Word documents to a processing server and download the results.
#[derive(Parser, Debug)]
#[command(
    name = "docjob",
    version,
    about = "Submit Word documents to a processing server and download the results",
    long_about = "Upload Word documents to a document-processing server, follow the job \
until it finishes, then download each result or the packaged archive.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to submit (.docx / .doc).
    files: Vec<PathBuf>,

    /// Processing mode.
    #[arg(short, long, env = "DOCJOB_MODE", value_enum, default_value = "convert-to-html")]
    mode: ModeArg,

    /// Server base URL.
    #[arg(short, long, env = "DOCJOB_SERVER", default_value = "http://localhost:8000")]
    server: String,

    /// Directory to save downloaded results into.
    #[arg(short, long, env = "DOCJOB_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Follow an existing job instead of uploading files.
    #[arg(long, env = "DOCJOB_JOB", conflicts_with = "files")]
    job: Option<String>,

    /// Print the manifest only; do not download anything.
    #[arg(long, env = "DOCJOB_NO_DOWNLOAD")]
    no_download: bool,

    /// Output a JSON report instead of a table.
    #[arg(long, env = "DOCJOB_JSON")]
    json: bool,

    /// Delay between status checks in milliseconds.
    #[arg(long, env = "DOCJOB_POLL_INTERVAL_MS", default_value_t = 2000)]
    poll_interval_ms: u64,

    /// Consecutive failed status checks tolerated before giving up.
    #[arg(long, env = "DOCJOB_MAX_POLL_FAILURES", default_value_t = 5)]
    max_poll_failures: u32,

    /// Timeout for status and download requests in seconds.
    #[arg(long, env = "DOCJOB_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "DOCJOB_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCJOB_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCJOB_QUIET")]
    quiet: bool,

    /// Check that the server is reachable and exit.
    #[arg(long)]
    check: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    ConvertToHtml,
    ExtractEquations,
    VerifyAndScan,
    CompleteConversion,
}

impl From<ModeArg> for ProcessorMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::ConvertToHtml => ProcessorMode::ConvertToHtml,
            ModeArg::ExtractEquations => ProcessorMode::ExtractEquations,
            ModeArg::VerifyAndScan => ProcessorMode::VerifyAndScan,
            ModeArg::CompleteConversion => ProcessorMode::CompleteConversion,
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    job_id: &'a JobId,
    processor: &'static str,
    bulk_download: bool,
    results: Vec<ResultEntry>,
    saved: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs while it is visible.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress && !cli.check {
        Some(CliProgressCallback::new() as Arc<dyn JobProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Health check ─────────────────────────────────────────────────────
    if cli.check {
        let backend = HttpBackend::new(&config).context("Invalid configuration")?;
        backend
            .health()
            .await
            .with_context(|| format!("Server at {} is not reachable", config.base_url))?;
        if !cli.quiet {
            println!("{} Server at {} is running", green("✔"), config.base_url);
        }
        return Ok(());
    }

    // ── Submit or attach ─────────────────────────────────────────────────
    let mut wf = Workflow::new(config).context("Invalid configuration")?;

    if let Some(ref id) = cli.job {
        wf.attach(JobId::new(id.clone()));
    } else {
        wf.select_mode(cli.mode.into());
        wf.add_paths(&cli.files)
            .await
            .context("Failed to read input files")?;
        wf.submit().await.context("Submission failed")?;
    }

    // Ctrl-C cancels the poll cycle; wait_for_completion then returns.
    if let Some(token) = wf.cancellation_token() {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });
    }

    let results = match wf.wait_for_completion().await {
        Ok(results) => results,
        Err(ClientError::Cancelled { job_id }) => {
            eprintln!("{} Cancelled; job {job_id} keeps running on the server", cyan("⚠"));
            std::process::exit(130);
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Job did not complete")),
    };

    // ── Results ──────────────────────────────────────────────────────────
    let retriever = wf.retriever().context("No results available")?;
    let entries = retriever.entries();

    if !cli.json && !cli.quiet {
        print_table(&entries);
    }

    let mut saved = Vec::new();
    let mut download_errors = 0usize;
    if !cli.no_download && results.iter().any(ResultItem::is_success) {
        if retriever.bulk_available() {
            match retriever.download_all(&cli.output).await {
                Ok(path) => saved.push(path),
                Err(e) => {
                    download_errors += 1;
                    report_download_error(&cli, show_progress, &e);
                }
            }
        } else {
            for outcome in retriever.download_each(&cli.output).await {
                match outcome {
                    Ok(path) => saved.push(path),
                    Err(e) => {
                        download_errors += 1;
                        report_download_error(&cli, show_progress, &e);
                    }
                }
            }
        }
    }

    if cli.json {
        let report = JsonReport {
            job_id: retriever.job_id(),
            processor: wf
                .snapshot()
                .map(JobSnapshot::processor_label)
                .unwrap_or(docjob_client::mode::GENERIC_LABEL),
            bulk_download: retriever.bulk_available(),
            results: entries,
            saved,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet && !show_progress {
        for path in &saved {
            println!("Saved {}", path.display());
        }
    }

    if download_errors > 0 {
        anyhow::bail!("{download_errors} download(s) failed");
    }
    Ok(())
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .base_url(cli.server.clone())
        .poll_interval_ms(cli.poll_interval_ms)
        .max_poll_failures(cli.max_poll_failures)
        .request_timeout_secs(cli.request_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_table(entries: &[ResultEntry]) {
    for entry in entries {
        let size = entry.size.as_deref().unwrap_or("-");
        match entry.error {
            None => println!(
                "  {} {:<40} {:>10}",
                green("✓"),
                entry.filename,
                dim(size)
            ),
            Some(ref err) => println!("  {} {:<40} {}", red("✗"), entry.filename, red(err)),
        }
    }
}

fn report_download_error(cli: &Cli, show_progress: bool, e: &ClientError) {
    // The progress callback has already printed it.
    if !show_progress && !cli.quiet {
        eprintln!("{} {e}", red("✗"));
    }
}
