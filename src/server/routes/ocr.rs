//! OCR submission endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use super::markdown_attachment;
use crate::error::Result;
use crate::model::JobStatusView;
use crate::service::OcrService;

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub document_id: i64,
}

/// POST /api/v1/ocr/process - Run OCR now and return the Markdown file
///
/// Holds the connection open for the whole run, retries included. The
/// download is named after the original upload (`<name>_ocr.md`).
pub async fn process(
    State(service): State<OcrService>,
    Json(request): Json<ProcessRequest>,
) -> Result<Response> {
    let document = service.get_document(request.document_id)?;
    let job = service.process_sync(document.id).await?;
    let output = service.job_output(job.id).await?;

    Ok(markdown_attachment(&document.download_filename(), output.content))
}

/// POST /api/v1/ocr/process-async - Queue OCR and return immediately
pub async fn process_async(
    State(service): State<OcrService>,
    Json(request): Json<ProcessRequest>,
) -> Result<(StatusCode, Json<JobStatusView>)> {
    let view = service.process_async(request.document_id).await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}
