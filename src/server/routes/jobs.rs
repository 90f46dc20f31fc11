//! Job inspection endpoints

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;

use super::markdown_attachment;
use crate::error::Result;
use crate::model::{JobStatusView, ProcessingJob};
use crate::service::OcrService;

/// GET /api/v1/jobs/:id
pub async fn get_job(
    State(service): State<OcrService>,
    Path(id): Path<i64>,
) -> Result<Json<ProcessingJob>> {
    Ok(Json(service.get_job(id)?))
}

/// GET /api/v1/jobs/:id/status
pub async fn get_job_status(
    State(service): State<OcrService>,
    Path(id): Path<i64>,
) -> Result<Json<JobStatusView>> {
    Ok(Json(service.job_status(id)?))
}

/// GET /api/v1/jobs/:id/download - Markdown of a COMPLETED job
pub async fn download_result(
    State(service): State<OcrService>,
    Path(id): Path<i64>,
) -> Result<Response> {
    let output = service.job_output(id).await?;
    Ok(markdown_attachment(&output.filename, output.content))
}
