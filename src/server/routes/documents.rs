//! Document management endpoints

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::{Result, ServiceError};
use crate::model::{Document, ProcessingJob};
use crate::service::OcrService;

/// Name of the multipart part carrying the PDF.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// POST /api/v1/documents/upload - Upload a PDF
///
/// The `file` part is streamed straight to disk; other parts are skipped.
pub async fn upload_document(
    State(service): State<OcrService>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Document>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::MalformedUpload(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        tracing::debug!("Receiving upload '{}'", filename);

        let document = service.upload_document(&filename, field).await?;
        return Ok((StatusCode::CREATED, Json(document)));
    }

    Err(ServiceError::MissingFile)
}

/// GET /api/v1/documents - List documents
pub async fn list_documents(
    State(service): State<OcrService>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Document>>> {
    Ok(Json(service.list_documents(page.skip, page.limit)?))
}

/// GET /api/v1/documents/:id - Get a specific document
pub async fn get_document(
    State(service): State<OcrService>,
    Path(id): Path<i64>,
) -> Result<Json<Document>> {
    Ok(Json(service.get_document(id)?))
}

/// DELETE /api/v1/documents/:id - Delete a document and everything derived from it
pub async fn delete_document(
    State(service): State<OcrService>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    service.delete_document(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/documents/:id/jobs - Jobs for a document, newest first
pub async fn list_document_jobs(
    State(service): State<OcrService>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ProcessingJob>>> {
    Ok(Json(service.jobs_for_document(id)?))
}
