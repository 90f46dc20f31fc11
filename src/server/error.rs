//! `ServiceError` → HTTP response.
//!
//! Every error body has the same shape:
//!
//! ```json
//! { "error": { "type": "not_found", "message": "Document 7 not found" } }
//! ```

use crate::error::ServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

impl ServiceError {
    /// HTTP status and machine-readable error type for this error.
    pub fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ServiceError::NotAPdf { .. } => (StatusCode::BAD_REQUEST, "unsupported_type"),
            ServiceError::MissingFile | ServiceError::MalformedUpload(_) => {
                (StatusCode::BAD_REQUEST, "invalid_upload")
            }
            ServiceError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "file_too_large"),
            ServiceError::DocumentNotFound(_)
            | ServiceError::JobNotFound(_)
            | ServiceError::OutputMissing { .. } => (StatusCode::NOT_FOUND, "not_found"),
            ServiceError::JobDocumentMismatch { .. } => (StatusCode::BAD_REQUEST, "job_mismatch"),
            ServiceError::JobNotCompleted { .. } => (StatusCode::BAD_REQUEST, "job_not_completed"),
            ServiceError::OcrFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "ocr_failed"),
            ServiceError::ProviderNotConfigured { .. } | ServiceError::InvalidConfig(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error")
            }
            ServiceError::ReadFailed { .. } | ServiceError::WriteFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "io_error")
            }
            ServiceError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            ServiceError::QueueClosed => (StatusCode::SERVICE_UNAVAILABLE, "queue_closed"),
            ServiceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = match &self {
            ServiceError::OcrFailed { .. } => format!("OCR processing failed: {self}"),
            _ => self.to_string(),
        };

        if status.is_server_error() {
            error!("{} ({}): {}", status, error_type, message);
        }

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
