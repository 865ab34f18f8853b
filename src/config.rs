//! Configuration for the job client.
//!
//! Every tunable lives in [`ClientConfig`], built via
//! [`ClientConfigBuilder`]. Defaults match the reference backend: a local
//! server on port 8000, a 2-second poll period, and the backend's own upload
//! limits (10 Word documents of at most 25 MiB each).

use crate::backend::JobBackend;
use crate::error::ClientError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`crate::workflow::Workflow`].
///
/// # Example
/// ```rust
/// use docjob_client::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("http://docs.internal:8000")
///     .poll_interval_ms(1000)
///     .max_poll_failures(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Root URL of the processing server. Default: `http://localhost:8000`.
    pub base_url: String,

    /// Delay between status requests in milliseconds. Default: 2000.
    pub poll_interval_ms: u64,

    /// Consecutive failed status requests tolerated before the job is
    /// marked failed. Default: 5.
    ///
    /// The delay doubles after each failure (2 s → 4 s → 8 s …) up to
    /// [`Self::poll_backoff_max_ms`], so the default budget covers roughly
    /// half a minute of server downtime.
    pub max_poll_failures: u32,

    /// Upper bound on the backed-off poll delay in milliseconds. Default: 30 000.
    pub poll_backoff_max_ms: u64,

    /// Timeout for status and download requests in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// Timeout for the upload request in seconds. Default: 300.
    pub upload_timeout_secs: u64,

    /// Maximum files per submission. Default: 10.
    pub max_files: usize,

    /// Maximum size of a single uploaded file in bytes. Default: 25 MiB.
    pub max_file_size_bytes: u64,

    /// Accepted file extensions, lowercase with leading dot. Default:
    /// `.docx`, `.doc`. An empty list accepts any file.
    pub allowed_extensions: Vec<String>,

    /// Pre-constructed backend. Takes precedence over `base_url`.
    pub backend: Option<Arc<dyn JobBackend>>,

    /// Optional observer for lifecycle events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            poll_interval_ms: 2000,
            max_poll_failures: 5,
            poll_backoff_max_ms: 30_000,
            request_timeout_secs: 30,
            upload_timeout_secs: 300,
            max_files: 10,
            max_file_size_bytes: 25 * 1024 * 1024,
            allowed_extensions: vec![".docx".to_string(), ".doc".to_string()],
            backend: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_poll_failures", &self.max_poll_failures)
            .field("poll_backoff_max_ms", &self.poll_backoff_max_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("max_files", &self.max_files)
            .field("max_file_size_bytes", &self.max_file_size_bytes)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Delay before the next status request after `failures` consecutive
    /// transport failures: `interval × 2^(failures-1)`, capped.
    pub fn poll_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.poll_interval();
        }
        let factor = 2u64.saturating_pow(failures - 1);
        let ms = self
            .poll_interval_ms
            .saturating_mul(factor)
            .min(self.poll_backoff_max_ms.max(self.poll_interval_ms));
        Duration::from_millis(ms)
    }

    /// Whether `name` carries an accepted extension.
    pub fn is_allowed_file(&self, name: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        let lower = name.to_lowercase();
        self.allowed_extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }
}

/// Builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl fmt::Debug for ClientConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(1);
        self
    }

    pub fn max_poll_failures(mut self, n: u32) -> Self {
        self.config.max_poll_failures = n.max(1);
        self
    }

    pub fn poll_backoff_max_ms(mut self, ms: u64) -> Self {
        self.config.poll_backoff_max_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs.max(1);
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.max_files = n;
        self
    }

    pub fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_size_bytes = bytes;
        self
    }

    /// Replace the accepted extensions. Entries are normalised to lowercase
    /// with a leading dot.
    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| {
                let e = e.as_ref().trim().to_lowercase();
                if e.starts_with('.') {
                    e
                } else {
                    format!(".{e}")
                }
            })
            .collect();
        self
    }

    pub fn backend(mut self, backend: Arc<dyn JobBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        let c = &self.config;
        if c.backend.is_none() {
            let url = reqwest::Url::parse(&c.base_url).map_err(|e| {
                ClientError::InvalidConfig(format!("base URL '{}' is invalid: {e}", c.base_url))
            })?;
            if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
                return Err(ClientError::InvalidConfig(format!(
                    "base URL must be http(s), got '{}'",
                    c.base_url
                )));
            }
        }
        if c.max_files == 0 {
            return Err(ClientError::InvalidConfig("max_files must be ≥ 1".into()));
        }
        if c.poll_interval_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "poll interval must be ≥ 1 ms".into(),
            ));
        }
        Ok(self.config)
    }
}
