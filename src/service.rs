//! The service facade: uploads, documents, jobs, and both submission paths.
//!
//! [`OcrService`] owns every collaborator (database, storage, adapter,
//! processor, queue) and is what the HTTP layer talks to. It is cheap to
//! clone; clones share one set of collaborators.
//!
//! Synchronous and asynchronous OCR both end in [`JobProcessor::run`]:
//!
//! ```text
//! process_sync  ─────────────────────────────────────▶ JobProcessor::run(doc, None)
//! process_async ──▶ JobQueue::submit ─▶ dispatcher ─▶ JobProcessor::run_in_slot(doc, Some(job))
//! ```

use crate::config::ServiceConfig;
use crate::db::document_repo::{self, NewDocument};
use crate::db::{job_repo, Database};
use crate::error::{Result, ServiceError};
use crate::model::{Document, JobStatus, JobStatusView, ProcessingJob};
use crate::pipeline::ocr::resolve_provider;
use crate::pipeline::retry::{OcrAdapter, RetryPolicy};
use crate::processor::JobProcessor;
use crate::queue::{DocumentLocks, JobQueue};
use crate::storage::FileStorage;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// A completed job's stored Markdown, ready to serve.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub job_id: i64,
    pub path: PathBuf,
    /// File name of the stored output (`<stem>_<job>.md`).
    pub filename: String,
    pub content: Bytes,
}

/// Entry point for every operation the server exposes.
#[derive(Clone)]
pub struct OcrService {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServiceConfig,
    db: Database,
    storage: FileStorage,
    locks: DocumentLocks,
    processor: JobProcessor,
    queue: JobQueue,
}

impl std::fmt::Debug for OcrService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrService")
            .field("config", &self.inner.config)
            .field("queue", &self.inner.queue)
            .finish_non_exhaustive()
    }
}

impl OcrService {
    /// Opens the database at `config.database_path` and starts the workers.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let db = Database::open(&config.database_path)?;
        Self::with_database(config, db).await
    }

    /// Like [`new`](Self::new) but with a caller-supplied database.
    pub async fn with_database(config: ServiceConfig, db: Database) -> Result<Self> {
        let provider = resolve_provider(&config)?;
        let storage = FileStorage::new(&config.upload_dir, &config.export_dir, config.max_upload_size);
        storage.ensure_dirs().await?;

        let adapter = OcrAdapter::new(
            provider,
            RetryPolicy::new(config.max_retries, config.retry_backoff),
        );
        let locks = DocumentLocks::default();
        let processor = JobProcessor::new(
            db.clone(),
            storage.clone(),
            adapter,
            locks.clone(),
            config.progress_callback.clone(),
        );
        let queue = JobQueue::start(
            processor.clone(),
            db.clone(),
            config.worker_count,
            config.queue_capacity,
        );

        info!(
            "OCR service ready (model {}, {} attempts, uploads in {}, exports in {})",
            config.model,
            config.max_retries,
            config.upload_dir.display(),
            config.export_dir.display()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                db,
                storage,
                locks,
                processor,
                queue,
            }),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    // ── Documents ────────────────────────────────────────────────────────

    /// Stores an uploaded PDF and records it as UPLOADED.
    ///
    /// The name is checked before any byte is written; the size is checked
    /// as the body streams in. On any failure the partial file is removed
    /// and no document row exists.
    pub async fn upload_document<S, E>(&self, original_filename: &str, body: S) -> Result<Document>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut writer = self.inner.storage.begin_upload(original_filename)?;
        tokio::pin!(body);

        while let Some(chunk) = body.next().await {
            let written = match chunk {
                Ok(bytes) => writer.write_chunk(&bytes).await,
                Err(e) => Err(ServiceError::Internal(format!("upload interrupted: {e}"))),
            };
            if let Err(e) = written {
                warn!("Rejecting upload '{}': {}", original_filename, e);
                writer.abort().await;
                return Err(e);
            }
        }

        let stored = writer.finish().await?;
        let inserted = document_repo::insert(
            &self.inner.db,
            &NewDocument {
                filename: stored.filename.clone(),
                original_filename: original_filename.to_string(),
                file_path: stored.path.clone(),
                file_size: stored.size as i64,
            },
        );

        match inserted {
            Ok(doc) => {
                info!(
                    "Uploaded document {} ('{}', {} bytes)",
                    doc.id, doc.original_filename, doc.file_size
                );
                Ok(doc)
            }
            Err(e) => {
                if let Err(cleanup) = self.inner.storage.remove_if_exists(&stored.path).await {
                    warn!("Could not remove {}: {}", stored.path.display(), cleanup);
                }
                Err(e.into())
            }
        }
    }

    /// [`upload_document`](Self::upload_document) for a body already in memory.
    pub async fn upload_bytes(&self, original_filename: &str, bytes: Bytes) -> Result<Document> {
        let body = futures::stream::once(async move { Ok::<_, std::convert::Infallible>(bytes) });
        self.upload_document(original_filename, body).await
    }

    pub fn list_documents(&self, skip: u32, limit: u32) -> Result<Vec<Document>> {
        Ok(document_repo::list(&self.inner.db, skip, limit)?)
    }

    pub fn get_document(&self, document_id: i64) -> Result<Document> {
        document_repo::find_by_id(&self.inner.db, document_id)?
            .ok_or(ServiceError::DocumentNotFound(document_id))
    }

    /// Deletes a document, its stored PDF, its jobs and their outputs.
    ///
    /// Waits for any run on the document to finish first. Files that are
    /// already gone or cannot be removed are logged and never block
    /// deletion of the record.
    pub async fn delete_document(&self, document_id: i64) -> Result<()> {
        let guard = self.inner.locks.acquire(document_id).await;

        let document = self.get_document(document_id)?;
        let outputs: Vec<PathBuf> = job_repo::list_for_document(&self.inner.db, document_id)?
            .into_iter()
            .filter_map(|job| job.output_path)
            .collect();

        if let Err(e) = self.inner.storage.remove_if_exists(&document.file_path).await {
            warn!("Could not remove {}: {}", document.file_path.display(), e);
        }
        document_repo::delete(&self.inner.db, document_id)?;

        for path in &outputs {
            if let Err(e) = self.inner.storage.remove_if_exists(path).await {
                warn!("Could not remove output {}: {}", path.display(), e);
            }
        }

        drop(guard);
        info!(
            "Deleted document {} and {} output file(s)",
            document_id,
            outputs.len()
        );
        Ok(())
    }

    /// Jobs for a document, newest first.
    pub fn jobs_for_document(&self, document_id: i64) -> Result<Vec<ProcessingJob>> {
        self.get_document(document_id)?;
        Ok(job_repo::list_for_document(&self.inner.db, document_id)?)
    }

    // ── Submission ───────────────────────────────────────────────────────

    /// Runs OCR inline and returns the finished job.
    pub async fn process_sync(&self, document_id: i64) -> Result<ProcessingJob> {
        self.inner.processor.run(document_id, None).await
    }

    /// Queues OCR and returns the PENDING job immediately.
    pub async fn process_async(&self, document_id: i64) -> Result<JobStatusView> {
        self.get_document(document_id)?;
        let job = self.inner.queue.submit(document_id).await?;
        info!("Document {} queued as job {}", document_id, job.id);
        Ok(JobStatusView::from(&job))
    }

    // ── Jobs ─────────────────────────────────────────────────────────────

    pub fn get_job(&self, job_id: i64) -> Result<ProcessingJob> {
        job_repo::find_by_id(&self.inner.db, job_id)?.ok_or(ServiceError::JobNotFound(job_id))
    }

    pub fn job_status(&self, job_id: i64) -> Result<JobStatusView> {
        Ok(JobStatusView::from(&self.get_job(job_id)?))
    }

    /// The stored Markdown of a COMPLETED job.
    ///
    /// Any other status is `JobNotCompleted`; never a partial file.
    pub async fn job_output(&self, job_id: i64) -> Result<JobOutput> {
        let job = self.get_job(job_id)?;
        let path = match (job.status, job.output_path) {
            (JobStatus::Completed, Some(path)) => path,
            (JobStatus::Completed, None) => return Err(ServiceError::OutputMissing { job_id }),
            (status @ (JobStatus::Pending | JobStatus::Processing | JobStatus::Failed), _) => {
                return Err(ServiceError::JobNotCompleted { job_id, status })
            }
        };

        let content = match self.inner.storage.read(&path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(ServiceError::ReadFailed { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                return Err(ServiceError::OutputMissing { job_id })
            }
            Err(e) => return Err(e),
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("job_{job_id}.md"));

        Ok(JobOutput {
            job_id,
            path,
            filename,
            content,
        })
    }

    /// Stops accepting background work and waits for the queue to drain.
    pub async fn shutdown(&self) {
        self.inner.queue.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::model::{DocumentStatus, PageText};
    use crate::pipeline::ocr::mock::ScriptedProvider;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn service(provider: Arc<ScriptedProvider>, max_upload: u64) -> (TempDir, OcrService) {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig::builder()
            .upload_dir(dir.path().join("uploads"))
            .export_dir(dir.path().join("exports"))
            .max_upload_size(max_upload)
            .max_retries(2)
            .retry_backoff(Duration::from_millis(1))
            .provider(provider)
            .build()
            .unwrap();
        let svc = OcrService::with_database(config, Database::open_in_memory().unwrap())
            .await
            .unwrap();
        (dir, svc)
    }

    fn upload_dir_entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path().join("uploads")).unwrap().count()
    }

    #[tokio::test]
    async fn upload_records_exact_size() {
        let (dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 4096).await;
        let doc = svc.upload_bytes("scan.pdf", Bytes::from(vec![7u8; 1000])).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        assert_eq!(doc.file_size, 1000);
        assert_eq!(std::fs::metadata(&doc.file_path).unwrap().len(), 1000);
        assert_eq!(upload_dir_entries(&dir), 1);
    }

    #[tokio::test]
    async fn rejected_uploads_leave_nothing_behind() {
        let (dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 100).await;

        let err = svc.upload_bytes("notes.txt", Bytes::from_static(b"hi")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotAPdf { .. }));

        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from(vec![0u8; 80])),
            Ok(Bytes::from(vec![0u8; 80])),
        ]);
        let err = svc.upload_document("big.pdf", chunks).await.unwrap_err();
        assert!(matches!(err, ServiceError::FileTooLarge { .. }));

        assert_eq!(upload_dir_entries(&dir), 0);
        assert!(svc.list_documents(0, 100).unwrap().is_empty());
    }

    #[tokio::test]
    async fn interrupted_stream_is_cleaned_up() {
        let (dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 1000).await;
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"%PDF")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let err = svc.upload_document("a.pdf", chunks).await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert_eq!(upload_dir_entries(&dir), 0);
    }

    #[tokio::test]
    async fn sync_processing_and_download() {
        let (_dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(2)), 4096).await;
        let doc = svc.upload_bytes("paper.pdf", Bytes::from_static(b"%PDF-1.4")).await.unwrap();

        let job = svc.process_sync(doc.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let out = svc.job_output(job.id).await.unwrap();
        let text = String::from_utf8(out.content.to_vec()).unwrap();
        let first = text.find("## Page 1").unwrap();
        let second = text.find("## Page 2").unwrap();
        assert!(first < second);
        assert_eq!(out.filename, format!("{}_{}.md", doc.filename.trim_end_matches(".pdf"), job.id));
        assert_eq!(svc.get_document(doc.id).unwrap().download_filename(), "paper_ocr.md");
    }

    #[tokio::test]
    async fn download_before_completion_is_refused() {
        let (_dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 4096).await;
        let doc = svc.upload_bytes("p.pdf", Bytes::from_static(b"%PDF")).await.unwrap();
        let pending = job_repo::insert_pending(&svc.inner.db, doc.id).unwrap();

        let err = svc.job_output(pending.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::JobNotCompleted { status: JobStatus::Pending, .. }
        ));
    }

    #[tokio::test]
    async fn deleted_output_file_is_reported_missing() {
        let (_dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 4096).await;
        let doc = svc.upload_bytes("p.pdf", Bytes::from_static(b"%PDF")).await.unwrap();
        let job = svc.process_sync(doc.id).await.unwrap();
        std::fs::remove_file(job.output_path.as_ref().unwrap()).unwrap();

        assert!(matches!(
            svc.job_output(job.id).await,
            Err(ServiceError::OutputMissing { .. })
        ));
    }

    #[tokio::test]
    async fn delete_removes_file_jobs_and_outputs() {
        let (_dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 4096).await;
        let doc = svc.upload_bytes("d.pdf", Bytes::from_static(b"%PDF")).await.unwrap();
        let job = svc.process_sync(doc.id).await.unwrap();
        let output = job.output_path.clone().unwrap();

        svc.delete_document(doc.id).await.unwrap();

        assert!(!doc.file_path.exists());
        assert!(!output.exists());
        assert!(matches!(svc.get_document(doc.id), Err(ServiceError::DocumentNotFound(_))));
        assert!(matches!(svc.get_job(job.id), Err(ServiceError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn delete_with_missing_file_still_removes_record() {
        let (_dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 4096).await;
        let doc = svc.upload_bytes("d.pdf", Bytes::from_static(b"%PDF")).await.unwrap();
        std::fs::remove_file(&doc.file_path).unwrap();

        svc.delete_document(doc.id).await.unwrap();
        assert!(svc.get_document(doc.id).is_err());
    }

    #[tokio::test]
    async fn delete_with_unremovable_file_still_removes_record() {
        let (_dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 4096).await;
        let doc = svc.upload_bytes("d.pdf", Bytes::from_static(b"%PDF")).await.unwrap();
        // A directory in the file's place makes `remove_file` fail with
        // something other than NotFound.
        std::fs::remove_file(&doc.file_path).unwrap();
        std::fs::create_dir(&doc.file_path).unwrap();

        svc.delete_document(doc.id).await.unwrap();
        assert!(matches!(svc.get_document(doc.id), Err(ServiceError::DocumentNotFound(_))));
        assert!(doc.file_path.is_dir());
    }

    #[tokio::test]
    async fn async_failure_is_only_visible_through_job_status() {
        let provider = ScriptedProvider::always(Err(OcrError::Timeout { secs: 120 }));
        let (_dir, svc) = service(provider, 4096).await;
        let doc = svc.upload_bytes("slow.pdf", Bytes::from_static(b"%PDF")).await.unwrap();

        let view = svc.process_async(doc.id).await.unwrap();
        assert_eq!(view.status, JobStatus::Pending);
        assert_eq!(view.document_id, doc.id);

        // Draining the queue waits for the background run.
        svc.shutdown().await;

        let status = svc.job_status(view.job_id).unwrap();
        assert_eq!(status.status, JobStatus::Failed);
        assert!(status.error_message.unwrap().contains("timed out"));
        assert_eq!(svc.get_document(doc.id).unwrap().status, DocumentStatus::Failed);
    }

    #[tokio::test]
    async fn async_on_unknown_document_creates_no_job() {
        let (_dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 4096).await;
        assert!(matches!(
            svc.process_async(42).await,
            Err(ServiceError::DocumentNotFound(42))
        ));
    }

    #[tokio::test]
    async fn submissions_after_shutdown_are_refused() {
        let (_dir, svc) = service(ScriptedProvider::always(ScriptedProvider::pages(1)), 4096).await;
        let doc = svc.upload_bytes("s.pdf", Bytes::from_static(b"%PDF")).await.unwrap();
        svc.shutdown().await;

        assert!(matches!(svc.process_async(doc.id).await, Err(ServiceError::QueueClosed)));
        assert!(svc.jobs_for_document(doc.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_runs_on_one_document_both_finish_consistently() {
        let provider = ScriptedProvider::always(Ok(vec![PageText::new(0, "x")]));
        let (_dir, svc) = service(provider.clone(), 4096).await;
        let doc = svc.upload_bytes("c.pdf", Bytes::from_static(b"%PDF")).await.unwrap();

        let (a, b) = tokio::join!(svc.process_sync(doc.id), svc.process_sync(doc.id));
        assert_eq!(a.unwrap().status, JobStatus::Completed);
        assert_eq!(b.unwrap().status, JobStatus::Completed);
        assert_eq!(provider.calls(), 2);

        let jobs = svc.jobs_for_document(doc.id).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.is_consistent()));
        assert_eq!(svc.get_document(doc.id).unwrap().status, DocumentStatus::Completed);
    }
}
