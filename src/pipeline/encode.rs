//! Document encoding: raw PDF bytes → base64 `data:` URL.
//!
//! The Mistral OCR endpoint accepts the document inline as a
//! `document_url`. A data URL avoids a separate file-upload round trip and
//! keeps each OCR attempt a single self-contained request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// MIME type sent for every document.
pub const PDF_MIME: &str = "application/pdf";

/// Encode a PDF as `data:application/pdf;base64,<payload>`.
///
/// Done once per run, not per attempt: the payload for a 50 MiB upload is
/// ~67 MiB of base64 and there is no reason to rebuild it on every retry.
pub fn pdf_data_url(bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded PDF: {} bytes → {} bytes base64", bytes.len(), b64.len());
    format!("data:{PDF_MIME};base64,{b64}")
}
