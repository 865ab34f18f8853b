//! Upload submitter: validate a file selection and create a job.
//!
//! Validation mirrors the backend's own limits so that a bad selection fails
//! locally, before any bytes go over the wire.

use crate::backend::JobBackend;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::mode::ProcessorMode;
use crate::model::JobId;
use crate::progress::ProgressCallback;
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One document selected for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// File name sent in the multipart part; must carry the extension.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Read a file from disk; the upload name is the path's final component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ClientError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => ClientError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => ClientError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ClientError::FileNotFound {
                path: path.to_path_buf(),
            })?;

        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(Self { name, bytes })
    }

    /// Read several files concurrently, preserving order.
    pub async fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Self>, ClientError> {
        let owned: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        try_join_all(owned.iter().map(Self::from_path)).await
    }
}

/// Check a selection against the configured limits.
///
/// Runs entirely locally; an empty selection is always rejected.
pub fn validate_selection(files: &[UploadFile], config: &ClientConfig) -> Result<(), ClientError> {
    if files.is_empty() {
        return Err(ClientError::NoFilesSelected);
    }
    if files.len() > config.max_files {
        return Err(ClientError::TooManyFiles {
            count: files.len(),
            max: config.max_files,
        });
    }
    for file in files {
        if !config.is_allowed_file(&file.name) {
            return Err(ClientError::UnsupportedFileType {
                name: file.name.clone(),
                allowed: config.allowed_extensions.join(", "),
            });
        }
        if file.size() > config.max_file_size_bytes {
            return Err(ClientError::FileTooLarge {
                name: file.name.clone(),
                size: file.size(),
                max: config.max_file_size_bytes,
            });
        }
    }
    Ok(())
}

/// Sends a validated selection to the backend.
pub struct Submitter {
    backend: Arc<dyn JobBackend>,
    config: ClientConfig,
    callback: Option<ProgressCallback>,
}

impl Submitter {
    pub fn new(backend: Arc<dyn JobBackend>, config: ClientConfig) -> Self {
        let callback = config.progress_callback.clone();
        Self {
            backend,
            config,
            callback,
        }
    }

    /// Validate, upload, and return the new job's id.
    ///
    /// Validation failures are returned as-is; anything that goes wrong on the
    /// wire is wrapped in [`ClientError::SubmissionFailed`].
    pub async fn submit(
        &self,
        files: &[UploadFile],
        mode: ProcessorMode,
    ) -> Result<JobId, ClientError> {
        validate_selection(files, &self.config)?;

        if let Some(ref cb) = self.callback {
            cb.on_submit_start(files.len(), mode);
        }

        match self.backend.submit(files, mode).await {
            Ok(response) => {
                info!(
                    "Job {} created: {} file(s), mode {}",
                    response.job_id,
                    files.len(),
                    mode
                );
                if let Some(ref cb) = self.callback {
                    cb.on_submitted(&response.job_id);
                }
                Ok(response.job_id)
            }
            Err(e) => {
                warn!("Submission failed: {}", e);
                if let Some(ref cb) = self.callback {
                    cb.on_submit_error(&e.to_string());
                }
                Err(ClientError::SubmissionFailed {
                    source: Box::new(e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docx(name: &str, len: usize) -> UploadFile {
        UploadFile::new(name, vec![0u8; len])
    }

    #[test]
    fn empty_selection_rejected() {
        let err = validate_selection(&[], &ClientConfig::default()).unwrap_err();
        assert!(matches!(err, ClientError::NoFilesSelected));
    }

    #[test]
    fn too_many_files_rejected() {
        let config = ClientConfig::builder().max_files(2).build().unwrap();
        let files = vec![docx("a.docx", 1), docx("b.docx", 1), docx("c.docx", 1)];
        let err = validate_selection(&files, &config).unwrap_err();
        assert!(matches!(err, ClientError::TooManyFiles { count: 3, max: 2 }));
    }

    #[test]
    fn wrong_extension_rejected() {
        let files = vec![docx("a.docx", 1), docx("scan.pdf", 1)];
        let err = validate_selection(&files, &ClientConfig::default()).unwrap_err();
        match err {
            ClientError::UnsupportedFileType { name, .. } => assert_eq!(name, "scan.pdf"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn oversized_file_rejected() {
        let config = ClientConfig::builder().max_file_size_bytes(10).build().unwrap();
        let err = validate_selection(&[docx("big.docx", 11)], &config).unwrap_err();
        assert!(matches!(err, ClientError::FileTooLarge { size: 11, max: 10, .. }));
    }

    #[test]
    fn valid_selection_passes() {
        let files = vec![docx("a.docx", 100), docx("B.DOC", 100)];
        assert!(validate_selection(&files, &ClientConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.docx");
        std::fs::write(&path, b"PK\x03\x04").unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "report.docx");
        assert_eq!(file.bytes, b"PK\x03\x04");
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let err = UploadFile::from_path("/definitely/not/here.docx")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn from_paths_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["b.docx", "a.docx", "c.docx"];
        let paths: Vec<PathBuf> = names
            .iter()
            .map(|n| {
                let p = dir.path().join(n);
                std::fs::write(&p, n.as_bytes()).unwrap();
                p
            })
            .collect();

        let files = UploadFile::from_paths(&paths).await.unwrap();
        let got: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(got, names);
    }

    /// Backend that refuses every upload.
    struct RefusingBackend;

    #[async_trait::async_trait]
    impl JobBackend for RefusingBackend {
        fn name(&self) -> &str {
            "refusing"
        }

        async fn submit(
            &self,
            _files: &[UploadFile],
            _mode: ProcessorMode,
        ) -> Result<crate::model::SubmitResponse, ClientError> {
            Err(ClientError::HttpStatus {
                url: "http://localhost:8000/api/process".into(),
                status: 500,
                detail: "disk full".into(),
            })
        }

        async fn status(
            &self,
            _job_id: &JobId,
        ) -> Result<crate::model::StatusResponse, ClientError> {
            Err(ClientError::Internal("unused".into()))
        }

        async fn download(
            &self,
            _job_id: &JobId,
            _index: Option<usize>,
        ) -> Result<crate::model::DownloadedFile, ClientError> {
            Err(ClientError::Internal("unused".into()))
        }
    }

    #[derive(Default)]
    struct Events(std::sync::Mutex<Vec<String>>);

    impl crate::progress::JobProgressCallback for Events {
        fn on_submit_start(&self, file_count: usize, _mode: ProcessorMode) {
            self.0.lock().unwrap().push(format!("start {file_count}"));
        }

        fn on_submitted(&self, job_id: &JobId) {
            self.0.lock().unwrap().push(format!("submitted {job_id}"));
        }

        fn on_submit_error(&self, error: &str) {
            self.0.lock().unwrap().push(format!("error {error}"));
        }
    }

    #[tokio::test]
    async fn refused_upload_reaches_observer() {
        let events = Arc::new(Events::default());
        let config = ClientConfig::builder()
            .progress_callback(events.clone())
            .build()
            .unwrap();
        let submitter = Submitter::new(Arc::new(RefusingBackend), config);

        let err = submitter
            .submit(&[docx("a.docx", 1)], ProcessorMode::ConvertToHtml)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SubmissionFailed { .. }));

        let seen = events.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], "start 1");
        assert!(seen[1].starts_with("error "));
        assert!(seen[1].contains("disk full"));
    }
}
