//! Shared helpers for the integration tests: test providers, an app
//! fixture backed by a temp dir and an in-memory database, and request
//! builders for the HTTP API.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use mistral_ocr_api::{
    router, Database, OcrError, OcrProvider, OcrService, PageText, ServiceConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};
use tower::ServiceExt;

pub const BOUNDARY: &str = "----ocr-test-boundary";

// ── Providers ────────────────────────────────────────────────────────────

/// Pages `0..n`, returned in reverse so callers must sort them.
pub fn pages_reversed(n: usize) -> Vec<PageText> {
    (0..n)
        .rev()
        .map(|i| PageText::new(i, format!("Text of page {}", i + 1)))
        .collect()
}

/// Fails the first `failures` calls, then returns `pages` pages.
pub struct FlakyProvider {
    failures: usize,
    pages: usize,
    calls: AtomicUsize,
}

impl FlakyProvider {
    pub fn new(failures: usize, pages: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            pages,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn process_document(&self, _document_url: &str) -> Result<Vec<PageText>, OcrError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(OcrError::Api {
                status: 503,
                message: format!("overloaded (call {})", n + 1),
            });
        }
        Ok(pages_reversed(self.pages))
    }
}

/// Blocks every call until the test releases it.
pub struct GatedProvider {
    pages: usize,
    gate: Semaphore,
    entered: Notify,
}

impl GatedProvider {
    pub fn new(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages,
            gate: Semaphore::new(0),
            entered: Notify::new(),
        })
    }

    /// Resolves once a call is waiting at the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Lets one waiting call through.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl OcrProvider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    async fn process_document(&self, document_url: &str) -> Result<Vec<PageText>, OcrError> {
        assert!(document_url.starts_with("data:application/pdf;base64,"));
        self.entered.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;
        permit.forget();
        Ok(pages_reversed(self.pages))
    }
}

// ── App fixture ──────────────────────────────────────────────────────────

pub struct TestApp {
    pub dir: TempDir,
    pub service: OcrService,
    pub router: Router,
}

impl TestApp {
    pub async fn new(provider: Arc<dyn OcrProvider>, max_upload_size: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let config = ServiceConfig::builder()
            .upload_dir(dir.path().join("uploads"))
            .export_dir(dir.path().join("exports"))
            .max_upload_size(max_upload_size)
            .max_retries(3)
            .retry_backoff(Duration::from_millis(1))
            .worker_count(2)
            .provider(provider)
            .build()
            .unwrap();
        let service = OcrService::with_database(config, Database::open_in_memory().unwrap())
            .await
            .unwrap();
        let router = router(service.clone());
        Self {
            dir,
            service,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub fn files_in(&self, sub: &str) -> usize {
        std::fs::read_dir(self.dir.path().join(sub))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Polls the status endpoint until the job reaches `want`.
    pub async fn wait_for_status(&self, job_id: i64, want: &str) -> serde_json::Value {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let resp = self.send(get(&format!("/api/v1/jobs/{job_id}/status"))).await;
                let json = resp.json();
                if json["status"] == want {
                    return json;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("job {job_id} never reached {want}"))
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }

    pub fn header(&self, name: header::HeaderName) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

// ── Request builders ─────────────────────────────────────────────────────

/// A bytes payload that starts like a PDF.
pub fn fake_pdf(len: usize) -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.resize(len.max(bytes.len()), b'x');
    bytes.truncate(len);
    bytes
}

/// `multipart/form-data` upload with a single `field` part.
pub fn upload_as(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/pdf\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/documents/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn upload(filename: &str, content: &[u8]) -> Request<Body> {
    upload_as("file", filename, content)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, value: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}
