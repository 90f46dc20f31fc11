//! # mistral-ocr-api
//!
//! Upload PDF documents, run them through the Mistral OCR API, and keep the
//! resulting Markdown.
//!
//! ## Why this crate?
//!
//! Scanned contracts, forms and Arabic-script documents carry no usable
//! text layer. Mistral's OCR model reads the whole PDF in one request and
//! answers with per-page Markdown; this crate wraps that call in the parts a
//! service needs around it: persistent documents and jobs, retries with
//! exponential backoff, a bounded background queue, and an HTTP API.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (multipart) ──▶ uploads/<uuid>.pdf + documents row (UPLOADED)
//!                                │
//!        sync  /ocr/process ─────┤
//!        async /ocr/process-async ─▶ PENDING job ─▶ queue ─▶ worker
//!                                │
//!  JobProcessor::run
//!   ├─ 1. Lock     per-document mutex
//!   ├─ 2. Mark     document + job → PROCESSING, attempts += 1
//!   ├─ 3. Encode   PDF → base64 data URL
//!   ├─ 4. OCR      POST /v1/ocr, up to N attempts, 1s → 2s → 4s … backoff
//!   ├─ 5. Polish   per-page line endings normalised to LF
//!   ├─ 6. Assemble "## Page N" sections, in page order
//!   └─ 7. Commit   exports/<stem>_<job>.md, both entities → COMPLETED
//!                  (or → FAILED with the last error)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mistral_ocr_api::{OcrService, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder()
//!         .api_key(std::env::var("MISTRAL_API_KEY")?)
//!         .build()?;
//!     let service = OcrService::new(config).await?;
//!
//!     let pdf = std::fs::read("scan.pdf")?;
//!     let doc = service.upload_bytes("scan.pdf", pdf.into()).await?;
//!     let job = service.process_sync(doc.id).await?;
//!     println!("{}", job.markdown_content.unwrap_or_default());
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-server` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the service in another application:
//! ```toml
//! mistral-ocr-api = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod queue;
pub mod server;
pub mod service;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use db::Database;
pub use error::{OcrError, ServiceError};
pub use model::{Document, DocumentStatus, JobStatus, JobStatusView, PageText, ProcessingJob};
pub use pipeline::ocr::{MistralOcrClient, OcrProvider};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use server::{router, serve};
pub use service::{JobOutput, OcrService};
