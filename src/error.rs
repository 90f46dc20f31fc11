//! Error types for the mistral-ocr-api library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ServiceError`]: **fatal** for the operation at hand (a rejected
//!   upload, an unknown identifier, an OCR run that ended FAILED).
//!   Returned as `Err(ServiceError)` from every public operation and mapped
//!   to an HTTP status by [`crate::server`].
//!
//! * [`OcrError`]: **transient**, a single provider call failed. The retry
//!   loop in [`crate::pipeline::retry`] logs these and tries again; only the
//!   last one survives, folded into [`ServiceError::OcrFailed`].

use crate::db::DatabaseError;
use crate::model::JobStatus;
use std::borrow::Borrow;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// All fatal errors returned by the mistral-ocr-api library.
#[derive(Debug, Error)]
pub enum ServiceError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Uploaded file name does not end in `.pdf`.
    #[error("Only PDF files are allowed (got '{filename}')")]
    NotAPdf { filename: String },

    /// Uploaded file exceeds the configured maximum size.
    #[error("File size exceeds maximum allowed size of {}MB", megabytes(.max))]
    FileTooLarge { size: u64, max: u64 },

    /// Multipart request did not carry a `file` part.
    #[error("No file provided in upload request")]
    MissingFile,

    /// Multipart body could not be parsed.
    #[error("Malformed upload request: {0}")]
    MalformedUpload(String),

    // ── Lookup errors ─────────────────────────────────────────────────────
    #[error("Document {0} not found")]
    DocumentNotFound(i64),

    #[error("Job {0} not found")]
    JobNotFound(i64),

    /// A job id was supplied for a run, but it belongs to another document.
    #[error("Job {job_id} does not belong to document {document_id}")]
    JobDocumentMismatch { job_id: i64, document_id: i64 },

    /// Result requested for a job that has not reached COMPLETED.
    #[error("Job {job_id} is not completed yet. Status: {status}")]
    JobNotCompleted { job_id: i64, status: JobStatus },

    /// Job is COMPLETED but its output file is gone from the export directory.
    #[error("Output file not found for job {job_id}")]
    OutputMissing { job_id: i64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// Every attempt against the OCR provider failed.
    #[error("All {attempts} attempts failed. Last error: {last_error}")]
    OcrFailed { attempts: u32, last_error: String },

    /// No provider was injected and no API key is configured.
    #[error("OCR provider is not configured.\n{hint}")]
    ProviderNotConfigured { hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Infrastructure ────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Background queue no longer accepts work (service shutting down).
    #[error("Job queue is closed")]
    QueueClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single failed call to the OCR provider.
///
/// Retried by [`crate::pipeline::retry::OcrAdapter`]; never stored.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// Connection refused, DNS failure, TLS error, broken pipe.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// HTTP 429.
    #[error("rate limited by provider{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP 401 / 403.
    #[error("authentication rejected (HTTP {status}): {detail}")]
    Auth { status: u16, detail: String },

    /// Any other non-success HTTP status.
    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body was not the expected JSON shape.
    #[error("could not decode provider response: {0}")]
    Decode(String),

    /// Provider answered successfully but with zero pages.
    #[error("provider returned no pages")]
    EmptyResult,
}

fn megabytes<T: Borrow<u64>>(bytes: T) -> String {
    format!("{:.1}", *bytes.borrow() as f64 / (1024.0 * 1024.0))
}

fn retry_hint<T: Borrow<Option<u64>>>(secs: T) -> String {
    match secs.borrow() {
        Some(s) => format!(" (retry after {s}s)"),
        None => String::new(),
    }
}
