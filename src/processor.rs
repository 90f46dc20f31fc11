//! The job processor: one OCR run for one document, end to end.
//!
//! [`JobProcessor::run`] is the only code that moves documents and jobs
//! through their lifecycles. The synchronous endpoint calls it inline and
//! the background workers call it from the queue, so both paths share one
//! state machine.
//!
//! ## Ordering
//!
//! Each state change is its own committed statement, written before the
//! next step starts:
//!
//! ```text
//! resolve/create job ─▶ document PROCESSING ─▶ job PROCESSING (+1 attempt)
//!   ─▶ read PDF ─▶ OCR with retry ─▶ assemble ─▶ write export
//!   ─▶ job COMPLETED ─▶ document COMPLETED
//! ```
//!
//! Any error once the document enters PROCESSING, including a failure to
//! move the job there, sends both entities to FAILED with the same message
//! before the error is returned, so neither is left in PROCESSING when
//! `run` returns.

use crate::db::{document_repo, job_repo, Database};
use crate::error::{Result, ServiceError};
use crate::model::{Document, DocumentStatus, JobStatus, PageText, ProcessingJob};
use crate::pipeline::assemble::assemble_markdown;
use crate::pipeline::postprocess::clean_page;
use crate::pipeline::retry::OcrAdapter;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::queue::DocumentLocks;
use crate::storage::FileStorage;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Runs OCR jobs. Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct JobProcessor {
    db: Database,
    storage: FileStorage,
    adapter: OcrAdapter,
    locks: DocumentLocks,
    progress: ProgressCallback,
}

impl std::fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcessor")
            .field("storage", &self.storage)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl JobProcessor {
    pub fn new(
        db: Database,
        storage: FileStorage,
        adapter: OcrAdapter,
        locks: DocumentLocks,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            db,
            storage,
            adapter,
            locks,
            progress: progress.unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    /// Run one OCR attempt for `document_id`.
    ///
    /// With `job_id` the existing job is reused (the async path creates it
    /// up front); without one a fresh PENDING job is created first.
    ///
    /// # Errors
    /// - `DocumentNotFound` / `JobNotFound` / `JobDocumentMismatch` before
    ///   any state is touched.
    /// - The processing failure (read, OCR, write, database) after both
    ///   entities have been recorded as FAILED.
    ///
    /// Runs for the same document are serialised; runs for different
    /// documents proceed in parallel.
    pub async fn run(&self, document_id: i64, job_id: Option<i64>) -> Result<ProcessingJob> {
        let _guard = self.locks.acquire(document_id).await;
        self.run_locked(document_id, job_id).await
    }

    /// [`run`](Self::run) bounded by `slots`.
    ///
    /// The slot is taken only once the document lock is held, so a run
    /// queued behind another run on the same document never occupies one.
    pub async fn run_in_slot(
        &self,
        document_id: i64,
        job_id: Option<i64>,
        slots: &Semaphore,
    ) -> Result<ProcessingJob> {
        let _guard = self.locks.acquire(document_id).await;
        let _slot = slots.acquire().await.map_err(|_| ServiceError::QueueClosed)?;
        self.run_locked(document_id, job_id).await
    }

    async fn run_locked(&self, document_id: i64, job_id: Option<i64>) -> Result<ProcessingJob> {
        let started = Instant::now();

        // ── Step 1: Resolve document and job ─────────────────────────────
        let document = document_repo::find_by_id(&self.db, document_id)?
            .ok_or(ServiceError::DocumentNotFound(document_id))?;
        let job = self.resolve_job(document_id, job_id)?;

        // ── Step 2: Enter PROCESSING ─────────────────────────────────────
        self.set_document_status(document_id, document.status, DocumentStatus::Processing, None)?;
        check_job_transition(job.id, job.status, JobStatus::Processing);
        if let Err(e) = job_repo::mark_processing(&self.db, job.id) {
            let e = ServiceError::from(e);
            let message = e.to_string();
            error!("Could not start job {} for document {}: {}", job.id, document_id, message);
            self.record_failure(document_id, job.id, &message);
            self.progress.on_job_failed(job.id, &message);
            return Err(e);
        }

        info!(
            "Processing document {} ('{}') as job {} (attempt {})",
            document_id,
            document.original_filename,
            job.id,
            job.attempts + 1
        );
        self.progress.on_job_start(document_id, job.id);

        // ── Step 3: Execute and record the outcome ───────────────────────
        match self.execute(&document, job.id).await {
            Ok(page_count) => {
                info!(
                    "Job {} completed: {} pages in {}ms",
                    job.id,
                    page_count,
                    started.elapsed().as_millis()
                );
                self.progress.on_job_complete(job.id, page_count);
                let job = job_repo::find_by_id(&self.db, job.id)?
                    .ok_or(ServiceError::JobNotFound(job.id))?;
                debug_assert!(job.is_consistent(), "job {} committed without its output", job.id);
                Ok(job)
            }
            Err(e) => {
                let message = e.to_string();
                error!("Failed to process document {}: {}", document_id, message);
                self.record_failure(document_id, job.id, &message);
                self.progress.on_job_failed(job.id, &message);
                Err(e)
            }
        }
    }

    fn resolve_job(&self, document_id: i64, job_id: Option<i64>) -> Result<ProcessingJob> {
        let Some(job_id) = job_id else {
            let job = job_repo::insert_pending(&self.db, document_id)?;
            debug!("Created job {} for document {}", job.id, document_id);
            return Ok(job);
        };

        let job = job_repo::find_by_id(&self.db, job_id)?.ok_or(ServiceError::JobNotFound(job_id))?;
        if job.document_id != document_id {
            return Err(ServiceError::JobDocumentMismatch {
                job_id,
                document_id,
            });
        }
        Ok(job)
    }

    /// Steps 4–6: read, OCR, assemble, persist. Returns the page count.
    async fn execute(&self, document: &Document, job_id: i64) -> Result<usize> {
        let bytes = self.storage.read(&document.file_path).await?;
        debug!("Read {} bytes from {}", bytes.len(), document.file_path.display());

        let pages: Vec<PageText> = self
            .adapter
            .extract_pages(&bytes)
            .await?
            .into_iter()
            .map(|p| PageText {
                markdown: clean_page(&p.markdown).into_owned(),
                ..p
            })
            .collect();
        let markdown = assemble_markdown(&pages);

        let output_path = self
            .storage
            .write_export(&document.filename, job_id, &markdown)
            .await?;

        let committed = job_repo::mark_completed(&self.db, job_id, &output_path, &markdown)
            .map_err(ServiceError::from)
            .and_then(|()| {
                self.set_document_status(
                    document.id,
                    DocumentStatus::Processing,
                    DocumentStatus::Completed,
                    None,
                )
            });
        if let Err(e) = committed {
            // The job is about to be marked FAILED; do not leave its output behind.
            if let Err(cleanup) = self.storage.remove_if_exists(&output_path).await {
                warn!("Could not remove orphaned output {}: {}", output_path.display(), cleanup);
            }
            return Err(e);
        }

        Ok(pages.len())
    }

    /// Best-effort: a failing write here is logged, never returned, so the
    /// caller still sees the original processing error.
    fn record_failure(&self, document_id: i64, job_id: i64, message: &str) {
        if let Err(e) = job_repo::mark_failed(&self.db, job_id, message) {
            error!("Could not mark job {} as failed: {}", job_id, e);
        }
        if let Err(e) = self.set_document_status(
            document_id,
            DocumentStatus::Processing,
            DocumentStatus::Failed,
            Some(message),
        ) {
            error!("Could not mark document {} as failed: {}", document_id, e);
        }
    }

    fn set_document_status(
        &self,
        document_id: i64,
        from: DocumentStatus,
        to: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        if !from.can_transition_to(to) {
            warn!("Document {}: unexpected transition {} → {}", document_id, from, to);
        }
        document_repo::set_status(&self.db, document_id, to, error)?;
        Ok(())
    }
}

fn check_job_transition(job_id: i64, from: JobStatus, to: JobStatus) {
    if !from.can_transition_to(to) {
        warn!("Job {}: unexpected transition {} → {}", job_id, from, to);
    } else if from == JobStatus::Processing {
        warn!("Job {} was left PROCESSING by an interrupted run; resuming", job_id);
    }
}
