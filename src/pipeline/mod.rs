//! Pipeline stages for one OCR run.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the provider can be swapped without touching
//! the retry or assembly logic.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ encode ──▶ retry(ocr) ──▶ postprocess ──▶ assemble
//! (PDF)    (data URL)  (provider)     (per page)     (## Page N)
//! ```
//!
//! 1. [`encode`]: wrap the raw PDF as a base64 `data:` URL
//! 2. [`ocr`]: [`ocr::OcrProvider`] and its Mistral implementation,
//!    the only stage with network I/O
//! 3. [`retry`]: bounded exponential backoff around the provider call
//! 4. [`postprocess`]: normalise each page's line endings
//! 5. [`assemble`]: concatenate pages under headings; name the output file

pub mod assemble;
pub mod encode;
pub mod ocr;
pub mod postprocess;
pub mod retry;
