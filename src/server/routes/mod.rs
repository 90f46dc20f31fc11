//! API routes, mounted under [`super::API_PREFIX`].

pub mod documents;
pub mod jobs;
pub mod ocr;

use crate::service::OcrService;
use axum::extract::DefaultBodyLimit;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_SLACK: u64 = 1024 * 1024;

/// Build all API routes.
pub fn api_routes(max_upload_size: u64) -> Router<OcrService> {
    let body_limit = usize::try_from(max_upload_size.saturating_add(MULTIPART_SLACK))
        .unwrap_or(usize::MAX);

    Router::new()
        // Documents
        .route(
            "/documents/upload",
            post(documents::upload_document).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/documents", get(documents::list_documents))
        .route(
            "/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/:id/jobs", get(documents::list_document_jobs))
        // OCR
        .route("/ocr/process", post(ocr::process))
        .route("/ocr/process-async", post(ocr::process_async))
        // Jobs
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/status", get(jobs::get_job_status))
        .route("/jobs/:id/download", get(jobs::download_result))
}

/// A Markdown body served as a file download named `filename`.
pub(crate) fn markdown_attachment(filename: &str, content: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(filename)),
        ],
        content,
    )
        .into_response()
}

/// `attachment` disposition with an ASCII fallback name and an RFC 5987
/// `filename*` carrying the exact UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();

    if fallback == filename {
        return format!("attachment; filename=\"{fallback}\"");
    }

    let mut encoded = String::with_capacity(filename.len() * 3);
    for b in filename.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(b as char)
            }
            _ => encoded.push_str(&format!("%{b:02X}")),
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
