//! Service configuration.
//!
//! Every knob lives in [`ServiceConfig`], built once at startup via
//! [`ServiceConfigBuilder`] and handed to the service by value. Nothing reads
//! settings from ambient global state; the binary maps environment variables
//! onto the builder and the tests inject their own values directly.

use crate::error::{Result, ServiceError};
use crate::pipeline::ocr::OcrProvider;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default Mistral API root; `/v1/ocr` is appended by the client.
pub const DEFAULT_API_BASE_URL: &str = "https://api.mistral.ai";

/// Default OCR model identifier.
pub const DEFAULT_MODEL: &str = "mistral-ocr-latest";

/// Default upload size cap: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

/// Configuration for the OCR service.
///
/// # Example
/// ```rust
/// use mistral_ocr_api::ServiceConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .api_key("sk-test")
///     .max_retries(3)
///     .retry_backoff(Duration::from_millis(200))
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Bearer token for the Mistral API. Required unless `provider` is set.
    pub api_key: Option<String>,

    /// API root. Default: [`DEFAULT_API_BASE_URL`].
    pub api_base_url: String,

    /// OCR model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_size: u64,

    /// Directory for stored PDFs. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Directory for generated Markdown. Default: `exports`.
    pub export_dir: PathBuf,

    /// SQLite file. Default: `mistral_ocr.db`.
    pub database_path: PathBuf,

    /// Provider attempts per run, including the first. Default: 5.
    pub max_retries: u32,

    /// Delay before the second attempt; doubles after each further failure.
    /// Default: 1 s.
    pub retry_backoff: Duration,

    /// Per-request timeout for the provider call in seconds. Default: 120.
    ///
    /// OCR of a long PDF is a single request, so this is much larger than a
    /// typical API timeout.
    pub api_timeout_secs: u64,

    /// Background workers consuming the async job queue. Default: 4.
    pub worker_count: usize,

    /// Queued async submissions before `process_async` waits. Default: 64.
    pub queue_capacity: usize,

    /// Allowed CORS origins. Empty means no CORS layer.
    pub cors_origins: Vec<String>,

    /// Pre-constructed OCR provider. Takes precedence over `api_key`.
    pub provider: Option<Arc<dyn OcrProvider>>,

    /// Job lifecycle observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            upload_dir: PathBuf::from("uploads"),
            export_dir: PathBuf::from("exports"),
            database_path: PathBuf::from("mistral_ocr.db"),
            max_retries: 5,
            retry_backoff: Duration::from_secs(1),
            api_timeout_secs: 120,
            worker_count: 4,
            queue_capacity: 64,
            cors_origins: Vec::new(),
            provider: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .field("max_upload_size", &self.max_upload_size)
            .field("upload_dir", &self.upload_dir)
            .field("export_dir", &self.export_dir)
            .field("database_path", &self.database_path)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("worker_count", &self.worker_count)
            .field("queue_capacity", &self.queue_capacity)
            .field("cors_origins", &self.cors_origins)
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_upload_size(mut self, bytes: u64) -> Self {
        self.config.max_upload_size = bytes;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.export_dir = dir.into();
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff(mut self, delay: Duration) -> Self {
        self.config.retry_backoff = delay;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn worker_count(mut self, n: usize) -> Self {
        self.config.worker_count = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.queue_capacity = n;
        self
    }

    pub fn cors_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cors_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn OcrProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig> {
        let c = &self.config;
        if c.max_retries == 0 {
            return Err(ServiceError::InvalidConfig(
                "max_retries must be ≥ 1".into(),
            ));
        }
        if c.worker_count == 0 {
            return Err(ServiceError::InvalidConfig(
                "worker_count must be ≥ 1".into(),
            ));
        }
        if c.queue_capacity == 0 {
            return Err(ServiceError::InvalidConfig(
                "queue_capacity must be ≥ 1".into(),
            ));
        }
        if c.max_upload_size == 0 {
            return Err(ServiceError::InvalidConfig(
                "max_upload_size must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ServiceConfig::builder().build().unwrap();
        assert_eq!(c.max_upload_size, 50 * 1024 * 1024);
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.retry_backoff, Duration::from_secs(1));
        assert_eq!(c.model, "mistral-ocr-latest");
        assert_eq!(c.upload_dir, PathBuf::from("uploads"));
        assert_eq!(c.export_dir, PathBuf::from("exports"));
        assert!(c.cors_origins.is_empty());
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(ServiceConfig::builder().max_retries(0).build().is_err());
        assert!(ServiceConfig::builder().worker_count(0).build().is_err());
        assert!(ServiceConfig::builder().queue_capacity(0).build().is_err());
        assert!(ServiceConfig::builder().max_upload_size(0).build().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ServiceConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
