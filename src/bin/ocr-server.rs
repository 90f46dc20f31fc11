//! HTTP server binary for mistral-ocr-api.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServiceConfig`, then serves the API until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use mistral_ocr_api::config::{DEFAULT_API_BASE_URL, DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_MODEL};
use mistral_ocr_api::{serve, OcrService, ServiceConfig};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on the default port with the key from the environment
  export MISTRAL_API_KEY=...
  ocr-server

  # Custom storage locations and a browser front-end on another origin
  ocr-server --upload-dir /var/ocr/uploads --export-dir /var/ocr/exports \
             --cors-origins http://localhost:3000

  # Upload, process, download
  curl -F file=@scan.pdf http://localhost:8000/api/v1/documents/upload
  curl -X POST -H 'content-type: application/json' \
       -d '{"document_id": 1}' http://localhost:8000/api/v1/ocr/process -o scan_ocr.md

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY         Mistral API key (required)
  MISTRAL_API_BASE        Override the API base URL
  OCR_MODEL               OCR model id
  MAX_UPLOAD_SIZE         Upload limit in bytes
  UPLOAD_DIR, EXPORT_DIR  Storage directories
  DATABASE_PATH           SQLite database file
  MAX_RETRIES             Provider attempts per run
  RETRY_BACKOFF_MS        Wait after the first failed attempt
  BACKEND_CORS_ORIGINS    Comma-separated allowed origins
  RUST_LOG                Overrides --verbose (e.g. mistral_ocr_api=debug)
"#;

/// Serve the Mistral OCR API over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-server",
    version,
    about = "Upload PDFs and convert them to Markdown with Mistral OCR",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Mistral API key.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Mistral API base URL.
    #[arg(long, env = "MISTRAL_API_BASE", default_value = DEFAULT_API_BASE_URL)]
    api_base: String,

    /// OCR model id.
    #[arg(long, env = "OCR_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Maximum upload size in bytes.
    #[arg(long, env = "MAX_UPLOAD_SIZE", default_value_t = DEFAULT_MAX_UPLOAD_SIZE)]
    max_upload_size: u64,

    /// Directory for uploaded PDFs.
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory for generated Markdown.
    #[arg(long, env = "EXPORT_DIR", default_value = "exports")]
    export_dir: PathBuf,

    /// SQLite database file.
    #[arg(long, env = "DATABASE_PATH", default_value = "mistral_ocr.db")]
    database_path: PathBuf,

    /// Provider attempts per OCR run.
    #[arg(long, env = "MAX_RETRIES", default_value_t = 5,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_retries: u32,

    /// Wait after the first failed attempt, in milliseconds. Doubles each retry.
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value_t = 1000)]
    retry_backoff_ms: u64,

    /// Timeout for one OCR API call, in seconds.
    #[arg(long, env = "OCR_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Background OCR workers.
    #[arg(long, env = "OCR_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Queued async jobs before submissions wait.
    #[arg(long, env = "OCR_QUEUE_CAPACITY", default_value_t = 64)]
    queue_capacity: usize,

    /// Allowed CORS origins.
    #[arg(long, env = "BACKEND_CORS_ORIGINS", value_delimiter = ',')]
    cors_origins: Vec<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else {
        "info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = ServiceConfig::builder()
        .api_base_url(cli.api_base)
        .model(cli.model)
        .max_upload_size(cli.max_upload_size)
        .upload_dir(cli.upload_dir)
        .export_dir(cli.export_dir)
        .database_path(cli.database_path)
        .max_retries(cli.max_retries)
        .retry_backoff(Duration::from_millis(cli.retry_backoff_ms))
        .api_timeout_secs(cli.api_timeout)
        .worker_count(cli.workers)
        .queue_capacity(cli.queue_capacity)
        .cors_origins(
            cli.cors_origins
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty()),
        );
    if let Some(key) = cli.api_key {
        builder = builder.api_key(key);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Serve ────────────────────────────────────────────────────────────
    let service = OcrService::new(config)
        .await
        .context("Failed to start OCR service")?;

    let addr = SocketAddr::new(cli.host, cli.port);
    serve(service.clone(), addr, shutdown_signal())
        .await
        .with_context(|| format!("Server on {addr} failed"))?;

    info!("Waiting for queued OCR jobs to finish");
    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
