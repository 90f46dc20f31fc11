//! Progress-callback trait for job lifecycle events.
//!
//! Inject an [`Arc<dyn JobProgressCallback>`] via
//! [`crate::config::ServiceConfigBuilder::progress_callback`] to observe
//! runs as they start and finish, whether they were submitted
//! synchronously or through the background queue.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a broadcast channel, a WebSocket, a
//! metrics counter or a log line without the library knowing how the host
//! application communicates. The trait is `Send + Sync` because runs for
//! different documents execute concurrently on the worker pool.
//!
//! # Example
//!
//! ```rust
//! use mistral_ocr_api::{JobProgressCallback, ServiceConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, job_id: i64, page_count: usize) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("job {job_id}: {page_count} pages");
//!     }
//! }
//!
//! let config = ServiceConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { finished: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the job processor at the edges of every run.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Calls for different jobs may arrive concurrently
/// from different worker tasks; calls for one document never overlap.
pub trait JobProgressCallback: Send + Sync {
    /// Both entities have been moved to PROCESSING.
    fn on_job_start(&self, document_id: i64, job_id: i64) {
        let _ = (document_id, job_id);
    }

    /// The job reached COMPLETED with `page_count` pages of output.
    fn on_job_complete(&self, job_id: i64, page_count: usize) {
        let _ = (job_id, page_count);
    }

    /// The job reached FAILED; `error` is the stored error message.
    fn on_job_failed(&self, job_id: i64, error: &str) {
        let _ = (job_id, error);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        pages: AtomicUsize,
        failures: AtomicUsize,
    }

    impl JobProgressCallback for TrackingCallback {
        fn on_job_start(&self, _document_id: i64, _job_id: i64) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, _job_id: i64, page_count: usize) {
            self.pages.fetch_add(page_count, Ordering::SeqCst);
        }

        fn on_job_failed(&self, _job_id: i64, _error: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_job_start(1, 1);
        cb.on_job_complete(1, 3);
        cb.on_job_failed(2, "boom");
    }

    #[test]
    fn tracking_callback_through_arc_dyn() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();

        cb.on_job_start(1, 10);
        cb.on_job_complete(10, 2);
        cb.on_job_start(1, 11);
        cb.on_job_failed(11, "All 5 attempts failed");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
    }
}
