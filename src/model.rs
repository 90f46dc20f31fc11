//! Domain types: documents, processing jobs, and OCR pages.
//!
//! Both status fields are closed enums stored as lowercase strings in
//! SQLite. Every transition site matches them exhaustively, so adding a
//! status is a compile error everywhere it matters rather than a silent
//! string mismatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ── Status enums ─────────────────────────────────────────────────────────

/// Lifecycle of an uploaded document.
///
/// ```text
/// UPLOADED ──▶ PROCESSING ──▶ COMPLETED
///                  ▲   │
///                  │   └────▶ FAILED
///                  └── (reprocess from COMPLETED / FAILED)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// PROCESSING → PROCESSING is accepted: a crash between commits can
    /// leave a document in PROCESSING, and the next run must recover it.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match (self, next) {
            (_, Uploaded) => false,
            (Uploaded | Processing | Completed | Failed, Processing) => true,
            (Processing, Completed | Failed) => true,
            (Uploaded | Completed | Failed, Completed | Failed) => false,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status '{other}'")),
        }
    }
}

/// Lifecycle of one OCR attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// Any state may re-enter PROCESSING (resume of a PENDING row, rerun of
    /// a finished one, recovery after a crash); terminal states are only
    /// reachable from PROCESSING.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (_, Pending) => false,
            (Pending | Processing | Completed | Failed, Processing) => true,
            (Processing, Completed | Failed) => true,
            (Pending | Completed | Failed, Completed | Failed) => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

// ── Entities ─────────────────────────────────────────────────────────────

/// An uploaded PDF and its processing status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    /// Name on disk inside the upload directory (`<uuid>.pdf`).
    pub filename: String,
    /// Name the client uploaded the file under.
    pub original_filename: String,
    pub file_path: PathBuf,
    pub file_size: i64,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Attachment name used when the synchronous OCR path returns the
    /// Markdown directly: `<original-name-without-extension>_ocr.md`.
    pub fn download_filename(&self) -> String {
        let stem = match self.original_filename.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => self.original_filename.as_str(),
        };
        format!("{stem}_ocr.md")
    }
}

/// One OCR run for a document, including its outcome.
///
/// `output_path`, `markdown_content` and `completed_at` are `Some` exactly
/// when `status == Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: i64,
    pub document_id: i64,
    pub status: JobStatus,
    pub output_path: Option<PathBuf>,
    pub markdown_content: Option<String>,
    pub error_message: Option<String>,
    /// Number of `run` invocations against this job (not provider retries).
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
    /// Checks the success-field invariant. Debug builds assert it after
    /// every completed run.
    pub fn is_consistent(&self) -> bool {
        let success_fields =
            self.output_path.is_some() && self.markdown_content.is_some() && self.completed_at.is_some();
        let no_success_fields =
            self.output_path.is_none() && self.markdown_content.is_none() && self.completed_at.is_none();
        match self.status {
            JobStatus::Completed => success_fields,
            JobStatus::Pending | JobStatus::Processing | JobStatus::Failed => no_success_fields,
        }
    }
}

/// Compact job view returned by the async submission and status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: i64,
    pub document_id: i64,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&ProcessingJob> for JobStatusView {
    fn from(job: &ProcessingJob) -> Self {
        Self {
            job_id: job.id,
            document_id: job.document_id,
            status: job.status,
            error_message: job.error_message.clone(),
        }
    }
}

/// One page of OCR output as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 0-based page position in the source document.
    pub index: usize,
    pub markdown: String,
}

impl PageText {
    pub fn new(index: usize, markdown: impl Into<String>) -> Self {
        Self {
            index,
            markdown: markdown.into(),
        }
    }

    /// 1-based page number used in headings.
    pub fn page_number(&self) -> usize {
        self.index + 1
    }
}
