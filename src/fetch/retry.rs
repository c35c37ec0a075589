use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{FeedSource, FetchError, HttpSource};

/// Attempt budget and backoff curve for one feed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after attempt `n` is `backoff_base^n` seconds.
    pub backoff_base: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_base: 5,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = u64::from(self.backoff_base).saturating_pow(attempt);
        Duration::from_secs(secs).min(self.max_backoff)
    }
}

/// Retrying fetcher that always yields a usable answer.
///
/// `Ok(None)` stands for an empty feed: a client error, exhausted retries, or
/// a shutdown observed while backing off. Only an unclassified failure is
/// returned as `Err`.
pub struct FeedClient<S = HttpSource> {
    source: S,
    policy: RetryPolicy,
}

impl<S: FeedSource> FeedClient<S> {
    pub fn new(source: S, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(attempt, "Shutdown requested during fetch");
                    return Ok(None);
                }
                outcome = self.source.get(url) => outcome,
            };

            match outcome {
                Ok(bytes) => {
                    debug!(attempt, bytes = bytes.len(), "Feed fetched");
                    return Ok(Some(bytes));
                }
                Err(e) if e.is_transient() => {
                    if attempt == max_attempts {
                        warn!(attempt, error = %e, "Transient fetch failure on final attempt");
                        break;
                    }

                    let delay = self.policy.backoff(attempt);
                    warn!(
                        attempt,
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "Transient fetch failure, retrying"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(attempt, "Shutdown requested during fetch backoff");
                            return Ok(None);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e @ FetchError::Client(_)) => {
                    error!(error = %e, "Cannot fetch feed, returning empty feed");
                    return Ok(None);
                }
                Err(e) => {
                    error!(error = %e, "Unexpected fetch failure");
                    return Err(e);
                }
            }
        }

        error!(attempts = max_attempts, "Exceeded maximum retries, returning empty feed");
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed list of outcomes, then keeps answering 503.
    pub(crate) struct ScriptedSource {
        outcomes: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        pub(crate) fn new(outcomes: Vec<Result<Vec<u8>, FetchError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn get(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Server(StatusCode::SERVICE_UNAVAILABLE)))
        }
    }

    #[async_trait]
    impl<T: FeedSource> FeedSource for std::sync::Arc<T> {
        async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.as_ref().get(url).await
        }
    }

    /// Never answers.
    struct Hanging {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FeedSource for Hanging {
        async fn get(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    pub(crate) fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            backoff_base: 5,
            max_backoff: Duration::ZERO,
        }
    }

    const URL: &str = "https://example.com/feed";

    #[test]
    fn test_backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(25));
        assert_eq!(policy.backoff(3), Duration::from_secs(60));
        assert_eq!(policy.backoff(40), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let client = FeedClient::new(ScriptedSource::new(vec![Ok(vec![1, 2, 3])]), instant_policy());
        let result = client.fetch(URL, &CancellationToken::new()).await;

        assert_eq!(result, Ok(Some(vec![1, 2, 3])));
        assert_eq!(client.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::Server(StatusCode::BAD_GATEWAY)),
            Err(FetchError::Timeout("slow".into())),
            Err(FetchError::Connect("refused".into())),
            Ok(vec![42]),
        ]);
        let client = FeedClient::new(source, instant_policy());
        let result = client.fetch(URL, &CancellationToken::new()).await;

        assert_eq!(result, Ok(Some(vec![42])));
        assert_eq!(client.source.calls(), 4);
    }

    #[tokio::test]
    async fn test_client_error_aborts_immediately() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::Client(StatusCode::NOT_FOUND)),
            Ok(vec![1]),
        ]);
        let client = FeedClient::new(source, instant_policy());
        let result = client.fetch(URL, &CancellationToken::new()).await;

        assert_eq!(result, Ok(None));
        assert_eq!(client.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_empty_feed() {
        let client = FeedClient::new(
            ScriptedSource::new(vec![]),
            instant_policy().with_max_attempts(4),
        );
        let result = client.fetch(URL, &CancellationToken::new()).await;

        assert_eq!(result, Ok(None));
        assert_eq!(client.source.calls(), 4);
    }

    #[tokio::test]
    async fn test_unexpected_error_is_surfaced() {
        let source = ScriptedSource::new(vec![Err(FetchError::Unexpected("tls".into()))]);
        let client = FeedClient::new(source, instant_policy());
        let result = client.fetch(URL, &CancellationToken::new()).await;

        assert_eq!(result, Err(FetchError::Unexpected("tls".into())));
        assert_eq!(client.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_backoff() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff_base: 5,
            max_backoff: Duration::from_secs(3600),
        };
        let client = FeedClient::new(ScriptedSource::new(vec![]), policy);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), client.fetch(URL, &cancel))
            .await
            .expect("fetch should stop once cancelled");

        assert_eq!(result, Ok(None));
        assert_eq!(client.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_request() {
        let client = FeedClient::new(ScriptedSource::new(vec![Ok(vec![1])]), instant_policy());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(client.fetch(URL, &cancel).await, Ok(None));
        assert_eq!(client.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_request_in_flight() {
        let client = FeedClient::new(
            Hanging {
                calls: AtomicUsize::new(0),
            },
            instant_policy(),
        );
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), client.fetch(URL, &cancel))
            .await
            .expect("fetch should return as soon as shutdown is requested");

        assert_eq!(result, Ok(None));
        assert_eq!(client.source.calls.load(Ordering::SeqCst), 1);
    }
}
