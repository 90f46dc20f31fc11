//! OCR adapter: provider call wrapped in bounded exponential backoff.
//!
//! ## Retry Strategy
//!
//! A run gets `max_attempts` provider calls. After failed attempt `k`
//! (1-based) the adapter waits `initial_backoff * 2^(k-1)` before trying
//! again: with the default 1 s and 5 attempts the waits are
//! 1 s → 2 s → 4 s → 8 s. There is no wait after the last attempt, no
//! jitter and no cap.
//!
//! Every failure is retried regardless of kind. A rejected API key will
//! burn all attempts; that is the price of treating the provider's error
//! taxonomy as unreliable.
//!
//! The adapter never touches the database. It only turns bytes into pages
//! or into [`ServiceError::OcrFailed`] carrying the last attempt's reason.

use crate::error::{OcrError, Result, ServiceError};
use crate::model::PageText;
use crate::pipeline::encode::pdf_data_url;
use crate::pipeline::ocr::OcrProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total provider calls, including the first. Always ≥ 1.
    pub max_attempts: u32,
    /// Wait after the first failure.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Wait after failed attempt `attempt` (1-based), or `None` after the last one.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Some(self.initial_backoff.saturating_mul(factor))
    }
}

/// Turns raw PDF bytes into ordered pages, retrying the provider.
#[derive(Clone)]
pub struct OcrAdapter {
    provider: Arc<dyn OcrProvider>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for OcrAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrAdapter")
            .field("provider", &self.provider.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl OcrAdapter {
    pub fn new(provider: Arc<dyn OcrProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Extract pages from `bytes`, sorted by page index.
    ///
    /// Returns as soon as one attempt succeeds. A successful response with
    /// no pages counts as a failed attempt.
    pub async fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        let document_url = pdf_data_url(bytes);
        let max = self.policy.max_attempts;
        let mut last_err: Option<OcrError> = None;

        for attempt in 1..=max {
            debug!("OCR attempt {}/{} via {}", attempt, max, self.provider.name());

            let outcome = match self.provider.process_document(&document_url).await {
                Ok(pages) if pages.is_empty() => Err(OcrError::EmptyResult),
                other => other,
            };

            match outcome {
                Ok(mut pages) => {
                    pages.sort_by_key(|p| p.index);
                    if attempt > 1 {
                        debug!("OCR succeeded on attempt {}/{}", attempt, max);
                    }
                    return Ok(pages);
                }
                Err(e) => {
                    warn!("OCR attempt {}/{} failed: {}", attempt, max, e);
                    last_err = Some(e);
                }
            }

            if let Some(delay) = self.policy.delay_after(attempt) {
                warn!("Retrying in {}ms", delay.as_millis());
                sleep(delay).await;
            }
        }

        Err(ServiceError::OcrFailed {
            attempts: max,
            last_error: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::mock::ScriptedProvider;

    fn overloaded() -> std::result::Result<Vec<PageText>, OcrError> {
        Err(OcrError::Api {
            status: 503,
            message: "overloaded".into(),
        })
    }

    #[test]
    fn delays_double_and_stop_at_last_attempt() {
        let p = RetryPolicy::new(5, Duration::from_secs(1));
        let delays: Vec<_> = (1..=5).map(|a| p.delay_after(a)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
                Some(Duration::from_secs(8)),
                None,
            ]
        );
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_twice_then_succeeds_with_exact_backoff() {
        let provider = ScriptedProvider::new(
            vec![overloaded(), overloaded()],
            ScriptedProvider::pages(2),
        );
        let adapter = OcrAdapter::new(
            provider.clone(),
            RetryPolicy::new(3, Duration::from_secs(1)),
        );

        let pages = adapter.extract_pages(b"%PDF").await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(provider.calls(), 3);

        let t = provider.call_times();
        assert_eq!(t[1] - t[0], Duration::from_secs(1));
        assert_eq!(t[2] - t[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_surfaces_last_error_without_trailing_sleep() {
        let provider = ScriptedProvider::new(
            vec![Err(OcrError::Transport("connection reset".into()))],
            overloaded(),
        );
        let adapter = OcrAdapter::new(
            provider.clone(),
            RetryPolicy::new(3, Duration::from_secs(1)),
        );

        let start = tokio::time::Instant::now();
        let err = adapter.extract_pages(b"%PDF").await.unwrap_err();
        assert_eq!(provider.calls(), 3);
        // 1s + 2s of backoff, nothing after the third failure.
        assert_eq!(start.elapsed(), Duration::from_secs(3));

        match err {
            ServiceError::OcrFailed { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("overloaded"), "got: {last_error}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_is_retried() {
        let provider = ScriptedProvider::new(vec![Ok(Vec::new())], ScriptedProvider::pages(1));
        let adapter = OcrAdapter::new(provider.clone(), RetryPolicy::new(2, Duration::from_millis(10)));
        assert_eq!(adapter.extract_pages(b"%PDF").await.unwrap().len(), 1);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn pages_are_sorted_by_index() {
        let provider = ScriptedProvider::always(Ok(vec![
            PageText::new(2, "c"),
            PageText::new(0, "a"),
            PageText::new(1, "b"),
        ]));
        let adapter = OcrAdapter::new(provider, RetryPolicy::new(1, Duration::ZERO));
        let pages = adapter.extract_pages(b"%PDF").await.unwrap();
        let order: Vec<_> = pages.iter().map(|p| p.markdown.as_str()).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }
}
