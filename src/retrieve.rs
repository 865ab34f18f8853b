//! Result retriever: per-item and bulk downloads for a completed job.
//!
//! ## Addressing
//!
//! Callers address results by their **position in the manifest** (the order
//! the status endpoint returned them). The backend's per-item route, however,
//! indexes its list of *successful* results only. [`ResultRetriever`]
//! translates between the two so that a failed item in the middle of a batch
//! does not shift every later download onto the wrong file.
//!
//! ## Writes
//!
//! Artifacts are written to a temp file in the target directory and renamed
//! into place, so an interrupted download never leaves a truncated file under
//! the final name.

use crate::backend::{Endpoints, JobBackend};
use crate::error::ClientError;
use crate::format::format_size;
use crate::model::{DownloadedFile, JobId, ResultItem};
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Whether the "download all" archive should be offered for `items`.
///
/// Requires more than one item and no per-item errors.
pub fn bulk_download_available(items: &[ResultItem]) -> bool {
    items.len() > 1 && items.iter().all(ResultItem::is_success)
}

/// One manifest row, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntry {
    pub position: usize,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// `None` for failed items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Download actions over one completed job's manifest.
pub struct ResultRetriever<'a> {
    backend: Arc<dyn JobBackend>,
    endpoints: &'a Endpoints,
    job_id: &'a JobId,
    items: &'a [ResultItem],
    callback: Option<ProgressCallback>,
}

impl<'a> ResultRetriever<'a> {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        endpoints: &'a Endpoints,
        job_id: &'a JobId,
        items: &'a [ResultItem],
        callback: Option<ProgressCallback>,
    ) -> Self {
        Self {
            backend,
            endpoints,
            job_id,
            items,
            callback,
        }
    }

    pub fn job_id(&self) -> &JobId {
        self.job_id
    }

    pub fn items(&self) -> &[ResultItem] {
        self.items
    }

    pub fn bulk_available(&self) -> bool {
        bulk_download_available(self.items)
    }

    /// Backend index for the item at `position`.
    pub fn backend_index(&self, position: usize) -> Result<usize, ClientError> {
        let item = self.items.get(position).ok_or(ClientError::ItemOutOfRange {
            index: position,
            total: self.items.len(),
        })?;
        if !item.is_success() {
            return Err(ClientError::ItemNotDownloadable {
                filename: item.filename.clone(),
                reason: item.error.clone().unwrap_or_default(),
            });
        }
        Ok(self.items[..position].iter().filter(|i| i.is_success()).count())
    }

    /// Deterministic download URL for the item at `position`.
    pub fn item_url(&self, position: usize) -> Result<String, ClientError> {
        let index = self.backend_index(position)?;
        Ok(self.endpoints.download_item(self.job_id, index).to_string())
    }

    pub fn archive_url(&self) -> String {
        self.endpoints.download_all(self.job_id).to_string()
    }

    /// Every manifest row with its size label and download URL.
    pub fn entries(&self) -> Vec<ResultEntry> {
        self.items
            .iter()
            .enumerate()
            .map(|(position, item)| ResultEntry {
                position,
                filename: item.display_name().to_string(),
                size: item.size.map(format_size),
                content_type: item.content_type.clone(),
                download_url: self.item_url(position).ok(),
                error: item.error.clone().filter(|e| !e.is_empty()),
            })
            .collect()
    }

    /// Download the item at `position` into `dir`.
    pub async fn download_item(
        &self,
        position: usize,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf, ClientError> {
        let result = self.fetch_item(position, dir.as_ref()).await;
        self.report(result)
    }

    /// Download the packaged archive of all results into `dir`.
    pub async fn download_all(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ClientError> {
        let result = self.fetch_archive(dir.as_ref()).await;
        self.report(result)
    }

    /// Download every successful item individually.
    ///
    /// One failure does not stop the others; results are in manifest order
    /// and failed manifest items are skipped.
    pub async fn download_each(&self, dir: impl AsRef<Path>) -> Vec<Result<PathBuf, ClientError>> {
        let dir = dir.as_ref();
        let mut out = Vec::new();
        for (position, item) in self.items.iter().enumerate() {
            if item.is_success() {
                out.push(self.download_item(position, dir).await);
            }
        }
        out
    }

    async fn fetch_item(&self, position: usize, dir: &Path) -> Result<(PathBuf, u64), ClientError> {
        let index = self.backend_index(position)?;
        let item = &self.items[position];
        let url = self.endpoints.download_item(self.job_id, index).to_string();
        info!("Downloading '{}' from {}", item.display_name(), url);

        let file = self
            .backend
            .download(self.job_id, Some(index))
            .await
            .map_err(|e| ClientError::DownloadFailed {
                url: url.clone(),
                source: Box::new(e),
            })?;

        let name = file
            .suggested_name
            .as_deref()
            .and_then(safe_file_name)
            .or_else(|| safe_file_name(item.display_name()))
            .unwrap_or_else(|| format!("result_{position}"));
        write_atomic(dir, &name, &file).await
    }

    async fn fetch_archive(&self, dir: &Path) -> Result<(PathBuf, u64), ClientError> {
        if !self.bulk_available() {
            return Err(ClientError::BulkDownloadUnavailable);
        }
        let url = self.archive_url();
        info!("Downloading archive for job {} from {}", self.job_id, url);

        let file = self
            .backend
            .download(self.job_id, None)
            .await
            .map_err(|e| ClientError::DownloadFailed {
                url: url.clone(),
                source: Box::new(e),
            })?;

        let fallback = format!("results_{}.zip", self.job_id);
        let name = file
            .suggested_name
            .as_deref()
            .and_then(safe_file_name)
            .or_else(|| safe_file_name(&fallback))
            .unwrap_or_else(|| "results.zip".to_string());
        write_atomic(dir, &name, &file).await
    }

    fn report(
        &self,
        result: Result<(PathBuf, u64), ClientError>,
    ) -> Result<PathBuf, ClientError> {
        if let Some(ref cb) = self.callback {
            match &result {
                Ok((path, bytes)) => cb.on_download_complete(path, *bytes),
                Err(e) => cb.on_download_error(&e.to_string()),
            }
        }
        result.map(|(path, _)| path)
    }
}

/// Reduce a server-suggested name to a bare file name.
///
/// Strips any directory part (either separator) and rejects names that would
/// resolve outside the target directory.
pub fn safe_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

/// Write `file` to `dir/name` via a temp file; returns the path and byte count.
async fn write_atomic(
    dir: &Path,
    name: &str,
    file: &DownloadedFile,
) -> Result<(PathBuf, u64), ClientError> {
    let dest = dir.join(name);
    let write_err = |source: std::io::Error| ClientError::OutputWriteFailed {
        path: dest.clone(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(write_err)?;

    let tmp = tempfile::Builder::new()
        .prefix(".docjob-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(write_err)?;
    tokio::fs::write(tmp.path(), &file.bytes)
        .await
        .map_err(write_err)?;
    tmp.persist(&dest).map_err(|e| write_err(e.error))?;

    let bytes = file.bytes.len() as u64;
    info!("Saved {} ({})", dest.display(), format_size(bytes));
    Ok((dest, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::ProcessorMode;
    use crate::model::{StatusResponse, SubmitResponse};
    use crate::submit::UploadFile;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn bulk_requires_more_than_one_clean_item() {
        assert!(!bulk_download_available(&[]));
        assert!(!bulk_download_available(&[ResultItem::new("a.html")]));
        assert!(bulk_download_available(&[
            ResultItem::new("a.html"),
            ResultItem::new("b.html")
        ]));
        assert!(!bulk_download_available(&[
            ResultItem::new("a.html"),
            ResultItem::failed("b.docx", "parse failed"),
            ResultItem::new("c.html"),
        ]));
    }

    #[test]
    fn safe_names() {
        assert_eq!(safe_file_name("a.html").as_deref(), Some("a.html"));
        assert_eq!(safe_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(safe_file_name(r"C:\out\b.html").as_deref(), Some("b.html"));
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name("dir/"), None);
    }

    /// Records requested indices and serves a fixed body.
    #[derive(Default)]
    struct RecordingBackend {
        requested: Mutex<Vec<Option<usize>>>,
        suggested_name: Option<String>,
    }

    #[async_trait]
    impl JobBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        async fn submit(
            &self,
            _files: &[UploadFile],
            _mode: ProcessorMode,
        ) -> Result<SubmitResponse, ClientError> {
            Err(ClientError::Internal("unused".into()))
        }

        async fn status(&self, _job_id: &JobId) -> Result<StatusResponse, ClientError> {
            Err(ClientError::Internal("unused".into()))
        }

        async fn download(
            &self,
            _job_id: &JobId,
            index: Option<usize>,
        ) -> Result<DownloadedFile, ClientError> {
            self.requested.lock().unwrap().push(index);
            Ok(DownloadedFile {
                suggested_name: self.suggested_name.clone(),
                content_type: Some("application/octet-stream".into()),
                bytes: b"<html></html>".to_vec(),
            })
        }
    }

    fn manifest_with_failure() -> Vec<ResultItem> {
        let mut a = ResultItem::new("a.docx");
        a.output_filename = Some("a.html".into());
        a.size = Some(1536);
        let mut c = ResultItem::new("c.docx");
        c.output_filename = Some("c.html".into());
        vec![a, ResultItem::failed("b.docx", "parse failed"), c]
    }

    #[test]
    fn backend_index_skips_failed_items() {
        let backend: Arc<dyn JobBackend> = Arc::new(RecordingBackend::default());
        let endpoints = Endpoints::new("http://localhost:8000").unwrap();
        let job = JobId::new("abc123");
        let items = manifest_with_failure();
        let r = ResultRetriever::new(backend, &endpoints, &job, &items, None);

        assert_eq!(r.backend_index(0).unwrap(), 0);
        assert!(matches!(
            r.backend_index(1),
            Err(ClientError::ItemNotDownloadable { .. })
        ));
        assert_eq!(r.backend_index(2).unwrap(), 1);
        assert!(matches!(
            r.backend_index(3),
            Err(ClientError::ItemOutOfRange { index: 3, total: 3 })
        ));
        assert_eq!(
            r.item_url(2).unwrap(),
            "http://localhost:8000/api/download/abc123/1"
        );
    }

    #[test]
    fn entries_render_sizes_and_errors() {
        let backend: Arc<dyn JobBackend> = Arc::new(RecordingBackend::default());
        let endpoints = Endpoints::new("http://localhost:8000").unwrap();
        let job = JobId::new("abc123");
        let items = manifest_with_failure();
        let entries = ResultRetriever::new(backend, &endpoints, &job, &items, None).entries();

        assert_eq!(entries[0].filename, "a.html");
        assert_eq!(entries[0].size.as_deref(), Some("1.5 KB"));
        assert!(entries[0].download_url.is_some());
        assert_eq!(entries[1].error.as_deref(), Some("parse failed"));
        assert!(entries[1].download_url.is_none());
    }

    #[tokio::test]
    async fn download_item_writes_file_under_output_name() {
        let backend = Arc::new(RecordingBackend::default());
        let endpoints = Endpoints::new("http://localhost:8000").unwrap();
        let job = JobId::new("abc123");
        let items = manifest_with_failure();
        let dir = tempfile::tempdir().unwrap();

        let r = ResultRetriever::new(backend.clone(), &endpoints, &job, &items, None);
        let path = r.download_item(2, dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("c.html"));
        assert_eq!(std::fs::read(&path).unwrap(), b"<html></html>");
        assert_eq!(*backend.requested.lock().unwrap(), vec![Some(1)]);

        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn suggested_name_wins_and_is_sanitised() {
        let backend = Arc::new(RecordingBackend {
            suggested_name: Some("../evil.html".into()),
            ..Default::default()
        });
        let endpoints = Endpoints::new("http://localhost:8000").unwrap();
        let job = JobId::new("abc123");
        let items = vec![ResultItem::new("a.docx")];
        let dir = tempfile::tempdir().unwrap();

        let r = ResultRetriever::new(backend, &endpoints, &job, &items, None);
        let path = r.download_item(0, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("evil.html"));
    }

    #[tokio::test]
    async fn bulk_download_refused_when_an_item_failed() {
        let backend = Arc::new(RecordingBackend::default());
        let endpoints = Endpoints::new("http://localhost:8000").unwrap();
        let job = JobId::new("abc123");
        let items = manifest_with_failure();
        let dir = tempfile::tempdir().unwrap();

        let r = ResultRetriever::new(backend.clone(), &endpoints, &job, &items, None);
        let err = r.download_all(dir.path()).await.unwrap_err();
        assert!(matches!(err, ClientError::BulkDownloadUnavailable));
        assert!(backend.requested.lock().unwrap().is_empty());

        let saved = r.download_each(dir.path()).await;
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(Result::is_ok));
        assert_eq!(*backend.requested.lock().unwrap(), vec![Some(0), Some(1)]);
    }

    #[tokio::test]
    async fn archive_falls_back_to_job_name() {
        let backend = Arc::new(RecordingBackend::default());
        let endpoints = Endpoints::new("http://localhost:8000").unwrap();
        let job = JobId::new("abc123");
        let items = vec![ResultItem::new("a.docx"), ResultItem::new("b.docx")];
        let dir = tempfile::tempdir().unwrap();

        let r = ResultRetriever::new(backend, &endpoints, &job, &items, None);
        let path = r.download_all(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("results_abc123.zip"));
    }

    #[derive(Default)]
    struct SavedFiles {
        saved: Mutex<Vec<(PathBuf, u64)>>,
        errors: Mutex<Vec<String>>,
    }

    impl crate::progress::JobProgressCallback for SavedFiles {
        fn on_download_complete(&self, path: &Path, bytes: u64) {
            self.saved.lock().unwrap().push((path.to_path_buf(), bytes));
        }

        fn on_download_error(&self, error: &str) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    #[tokio::test]
    async fn observer_gets_written_byte_count() {
        let backend = Arc::new(RecordingBackend::default());
        let endpoints = Endpoints::new("http://localhost:8000").unwrap();
        let job = JobId::new("abc123");
        let items = manifest_with_failure();
        let dir = tempfile::tempdir().unwrap();
        let cb = Arc::new(SavedFiles::default());

        let callback: ProgressCallback = cb.clone();
        let r = ResultRetriever::new(backend, &endpoints, &job, &items, Some(callback));
        let path = r.download_item(0, dir.path()).await.unwrap();
        assert!(r.download_item(1, dir.path()).await.is_err());

        let saved = cb.saved.lock().unwrap();
        assert_eq!(*saved, vec![(path, b"<html></html>".len() as u64)]);
        assert_eq!(saved[0].1, 13);
        assert_eq!(cb.errors.lock().unwrap().len(), 1);
    }
}
