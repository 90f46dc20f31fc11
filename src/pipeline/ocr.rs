//! OCR provider boundary.
//!
//! [`OcrProvider`] is the seam between the job pipeline and the remote OCR
//! service: given an encoded document it returns the pages, or one
//! [`OcrError`] describing why this single attempt failed. Retrying is not
//! the provider's business; see [`super::retry`].
//!
//! [`MistralOcrClient`] is the production implementation. Tests inject
//! their own provider through [`crate::ServiceConfigBuilder::provider`].

use crate::config::ServiceConfig;
use crate::error::{OcrError, Result, ServiceError};
use crate::model::PageText;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One remote OCR call.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Run OCR over a document given as a `data:` URL.
    ///
    /// Pages may come back in any order; the caller sorts them by index.
    async fn process_document(&self, document_url: &str) -> std::result::Result<Vec<PageText>, OcrError>;
}

/// Picks the provider for a service instance.
///
/// Priority: the injected provider, then a [`MistralOcrClient`] built from
/// `api_key`. With neither, the service cannot run OCR at all.
pub fn resolve_provider(config: &ServiceConfig) -> Result<Arc<dyn OcrProvider>> {
    if let Some(provider) = &config.provider {
        return Ok(Arc::clone(provider));
    }
    match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => Ok(Arc::new(MistralOcrClient::new(
            key,
            &config.api_base_url,
            &config.model,
            config.api_timeout_secs,
        )?)),
        None => Err(ServiceError::ProviderNotConfigured {
            hint: "Set MISTRAL_API_KEY (or --api-key), or inject a provider with \
                   ServiceConfigBuilder::provider."
                .into(),
        }),
    }
}

// ── Mistral wire format ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: DocumentRef<'a>,
    include_image_base64: bool,
}

#[derive(Debug, Serialize)]
struct DocumentRef<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    document_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Vec<OcrPage>,
}

#[derive(Debug, Deserialize)]
struct OcrPage {
    index: usize,
    #[serde(default)]
    markdown: String,
}

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY: usize = 500;

// ── Client ───────────────────────────────────────────────────────────────

/// Mistral OCR over HTTPS (`POST {base}/v1/ocr`).
#[derive(Debug, Clone)]
pub struct MistralOcrClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl MistralOcrClient {
    pub fn new(api_key: &str, base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ServiceError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/v1/ocr", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, e: reqwest::Error) -> OcrError {
        if e.is_timeout() {
            OcrError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            OcrError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl OcrProvider for MistralOcrClient {
    fn name(&self) -> &str {
        "mistral"
    }

    async fn process_document(&self, document_url: &str) -> std::result::Result<Vec<PageText>, OcrError> {
        let body = OcrRequest {
            model: &self.model,
            document: DocumentRef {
                kind: "document_url",
                document_url,
            },
            include_image_base64: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, &text));
        }

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let parsed: OcrResponse =
            serde_json::from_slice(&bytes).map_err(|e| OcrError::Decode(e.to_string()))?;
        debug!("Mistral OCR returned {} pages ({} bytes)", parsed.pages.len(), bytes.len());

        Ok(parsed
            .pages
            .into_iter()
            .map(|p| PageText::new(p.index, p.markdown))
            .collect())
    }
}

/// Maps a non-success HTTP status to the matching [`OcrError`].
fn status_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> OcrError {
    let detail = truncate(body.trim(), MAX_ERROR_BODY);
    match status {
        StatusCode::TOO_MANY_REQUESTS => OcrError::RateLimited {
            retry_after_secs: retry_after,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OcrError::Auth {
            status: status.as_u16(),
            detail,
        },
        _ => OcrError::Api {
            status: status.as_u16(),
            message: detail,
        },
    }
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

// ── Test double ──────────────────────────────────────────────────────────
