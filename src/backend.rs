//! HTTP contract with the processing server.
//!
//! [`JobBackend`] is the seam between the workflow and the network: the
//! submitter, the poller and the retriever only ever talk to a
//! `dyn JobBackend`. [`HttpBackend`] is the real implementation on reqwest;
//! tests plug in an in-process fake.
//!
//! | Operation    | Request                              |
//! |--------------|--------------------------------------|
//! | submit       | `POST /api/process` (multipart)      |
//! | status       | `GET  /api/status/{job_id}`          |
//! | download one | `GET  /api/download/{job_id}/{n}`    |
//! | download all | `GET  /api/download/{job_id}`        |
//! | health       | `GET  /`                             |

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::mode::ProcessorMode;
use crate::model::{DownloadedFile, JobId, StatusResponse, SubmitResponse};
use crate::submit::UploadFile;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::{debug, info};

/// Transport used by the workflow components.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Upload `files` and start a job.
    async fn submit(
        &self,
        files: &[UploadFile],
        mode: ProcessorMode,
    ) -> Result<SubmitResponse, ClientError>;

    /// Fetch the current status of a job.
    async fn status(&self, job_id: &JobId) -> Result<StatusResponse, ClientError>;

    /// Fetch one artifact (`Some(n)`, backend index) or the archive (`None`).
    async fn download(
        &self,
        job_id: &JobId,
        index: Option<usize>,
    ) -> Result<DownloadedFile, ClientError>;

    /// Check that the server is up.
    async fn health(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

// ── Endpoints ────────────────────────────────────────────────────────────

/// Builds every backend URL from the configured base.
///
/// Job ids are pushed as path segments, so ids containing `/` or spaces are
/// percent-encoded rather than altering the route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url).map_err(|e| {
            ClientError::InvalidConfig(format!("base URL '{base_url}' is invalid: {e}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidConfig(format!(
                "base URL '{base_url}' cannot carry a path"
            )));
        }
        Ok(Self { base })
    }

    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn health(&self) -> Url {
        self.base.clone()
    }

    pub fn process(&self) -> Url {
        self.join(&["api", "process"])
    }

    pub fn status(&self, job_id: &JobId) -> Url {
        self.join(&["api", "status", job_id.as_str()])
    }

    /// Per-item download; `index` counts successful items only.
    pub fn download_item(&self, job_id: &JobId, index: usize) -> Url {
        self.join(&["api", "download", job_id.as_str(), &index.to_string()])
    }

    pub fn download_all(&self, job_id: &JobId) -> Url {
        self.join(&["api", "download", job_id.as_str()])
    }
}

// ── HttpBackend ──────────────────────────────────────────────────────────

/// [`JobBackend`] over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoints: Endpoints,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ClientError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoints: Endpoints::new(&config.base_url)?,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, ClientError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| send_error(&url, self.request_timeout, e))?;
        Ok(response)
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn submit(
        &self,
        files: &[UploadFile],
        mode: ProcessorMode,
    ) -> Result<SubmitResponse, ClientError> {
        let url = self.endpoints.process();
        info!("Uploading {} file(s) to {} as {}", files.len(), url, mode.wire_tag());

        let mut form = Form::new().text("processor_type", mode.wire_tag());
        for file in files {
            let part = Part::bytes(file.bytes.clone()).file_name(file.name.clone());
            form = form.part("files", part);
        }

        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(|e| send_error(&url, self.upload_timeout, e))?;

        let response = check_status(&url, response, None).await?;
        decode_json(&url, response).await
    }

    async fn status(&self, job_id: &JobId) -> Result<StatusResponse, ClientError> {
        let url = self.endpoints.status(job_id);
        let response = self.get(url.clone()).await?;
        let response = check_status(&url, response, Some(job_id)).await?;
        let status: StatusResponse = decode_json(&url, response).await?;
        debug!("Job {}: {} {}", job_id, status.status, status.progress);
        Ok(status)
    }

    async fn download(
        &self,
        job_id: &JobId,
        index: Option<usize>,
    ) -> Result<DownloadedFile, ClientError> {
        let url = match index {
            Some(n) => self.endpoints.download_item(job_id, n),
            None => self.endpoints.download_all(job_id),
        };
        let response = self.get(url.clone()).await?;
        let response = check_status(&url, response, None).await?;

        let suggested_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(content_disposition_filename);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| send_error(&url, self.request_timeout, e))?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(DownloadedFile {
            suggested_name,
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    async fn health(&self) -> Result<(), ClientError> {
        let url = self.endpoints.health();
        let response = self.get(url.clone()).await?;
        check_status(&url, response, None).await?;
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn send_error(url: &Url, timeout: Duration, e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        }
    } else {
        ClientError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Turn a non-2xx response into an error, keeping the server's message.
///
/// A 404 on a job-scoped request becomes [`ClientError::JobNotFound`].
async fn check_status(
    url: &Url,
    response: reqwest::Response,
    job_id: Option<&JobId>,
) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = job_id {
            return Err(ClientError::JobNotFound {
                job_id: id.to_string(),
            });
        }
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::HttpStatus {
        url: url.to_string(),
        status: status.as_u16(),
        detail: error_detail(&body),
    })
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    url: &Url,
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let body = response.text().await.map_err(|e| ClientError::Transport {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse {
        url: url.to_string(),
        detail: e.to_string(),
    })
}

/// Extract `error` / `detail` from a JSON error body, else the raw text.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail", "message"] {
            if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
                return s.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.len() > 200 {
        let mut end = 200;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    } else {
        trimmed.to_string()
    }
}

static RE_FILENAME_EXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*(?:[\w-]+)?'[\w-]*'([^;]+)"#).unwrap()
});
static RE_FILENAME_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename\s*=\s*"([^"]*)""#).unwrap());
static RE_FILENAME_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename\s*=\s*([^;"\s]+)"#).unwrap());

/// Filename suggested by a `Content-Disposition` header.
///
/// The RFC 5987 `filename*=` form wins over plain `filename=`.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    if let Some(c) = RE_FILENAME_EXT.captures(header) {
        let decoded = percent_decode_str(c[1].trim().trim_matches('"'))
            .decode_utf8_lossy()
            .into_owned();
        if !decoded.is_empty() {
            return Some(decoded);
        }
    }
    RE_FILENAME_QUOTED
        .captures(header)
        .or_else(|| RE_FILENAME_BARE.captures(header))
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}
