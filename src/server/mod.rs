//! HTTP surface: an axum router over [`OcrService`].
//!
//! All API routes live under `/api/v1`; `/` and `/health` sit at the root.
//! Handlers are thin: they parse the request, call one service method and
//! let [`ServiceError`](crate::error::ServiceError)'s `IntoResponse` impl
//! pick the status code.

mod error;
pub mod routes;

use crate::service::OcrService;
use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Prefix for every versioned API route.
pub const API_PREFIX: &str = "/api/v1";

/// Builds the full application router.
pub fn router(service: OcrService) -> Router {
    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest(API_PREFIX, routes::api_routes(service.config().max_upload_size))
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&service.config().cors_origins) {
        app = app.layer(cors);
    }

    app.with_state(service)
}

/// CORS for the configured origins, or `None` when the list is empty.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    )
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to Mistral OCR API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /api/v1/documents/upload": "Upload a PDF (multipart field 'file')",
            "GET /api/v1/documents": "List documents (?skip=&limit=)",
            "GET /api/v1/documents/:id": "Get a document",
            "DELETE /api/v1/documents/:id": "Delete a document and its outputs",
            "GET /api/v1/documents/:id/jobs": "Jobs for a document, newest first",
            "POST /api/v1/ocr/process": "Run OCR and return the Markdown file",
            "POST /api/v1/ocr/process-async": "Queue OCR and return the job id",
            "GET /api/v1/jobs/:id": "Get a job",
            "GET /api/v1/jobs/:id/status": "Get a job's status",
            "GET /api/v1/jobs/:id/download": "Download a completed job's Markdown"
        }
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Binds `addr` and serves until `shutdown` resolves.
///
/// Open connections are drained before this returns. The job queue is not
/// touched; call [`OcrService::shutdown`] afterwards to let background runs
/// finish.
pub async fn serve<F>(service: OcrService, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_origin_list_disables_cors() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_none());
    }

    #[test]
    fn valid_origins_enable_cors() {
        assert!(cors_layer(&["http://localhost:3000".to_string()]).is_some());
    }
}
