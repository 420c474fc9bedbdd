use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::config::FetchConfig;
use crate::domain::Article;
use crate::errors::{ScrollError, ScrollResult};
use crate::sources::traits::{Connectivity, RawResponse, Transport};

/// Resilient client for the random-summary endpoint.
///
/// Holds no per-call state, so one client can back any number of loaders.
pub struct ArticleClient<T: Transport> {
    transport: T,
    connectivity: Arc<dyn Connectivity>,
    config: FetchConfig,
}

impl<T: Transport> ArticleClient<T> {
    pub fn new(transport: T, connectivity: Arc<dyn Connectivity>, config: FetchConfig) -> Self {
        Self {
            transport,
            connectivity,
            config,
        }
    }

    /// Fetch one random article.
    ///
    /// `Ok(None)` means upstream answered but the payload was not usable.
    /// Connectivity is checked before every attempt; an offline check fails
    /// immediately without touching the network.
    pub async fn fetch_one(&self) -> ScrollResult<Option<Article>> {
        let url = self.config.summary_url();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            if !self.connectivity.is_online() {
                return Err(ScrollError::Offline);
            }

            tracing::debug!(attempt = attempt + 1, %url, "requesting summary");
            let outcome = tokio::time::timeout(
                self.config.request_timeout,
                self.transport.get(&url, accept_json()),
            )
            .await;

            let (error, delay) = match outcome {
                // The request future is dropped here, so a late reply is never seen.
                Err(_) => (ScrollError::Timeout, self.linear_backoff(attempt)),
                Ok(Ok(response)) if response.status == 429 => {
                    let retry_after_secs = response.retry_after_secs();
                    let delay = match retry_after_secs {
                        Some(secs) => Duration::from_secs(secs),
                        None => self.exponential_backoff(attempt),
                    };
                    (ScrollError::RateLimited { retry_after_secs }, delay)
                }
                Ok(Ok(response)) if !response.is_success() => (
                    ScrollError::Status(response.status),
                    self.linear_backoff(attempt),
                ),
                Ok(Ok(response)) => return Ok(self.parse(response)),
                Ok(Err(e)) => (e, self.linear_backoff(attempt)),
            };

            attempt += 1;
            if attempt >= max_attempts {
                tracing::debug!(error = %error, attempts = attempt, "giving up on slot");
                return Err(error);
            }

            tracing::warn!(
                error = %error,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis() as u64,
                "summary request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch up to `count` articles with `count` concurrent slots.
    ///
    /// Per-slot failures only shrink the batch. A rate limit or timeout in
    /// any slot fails the whole batch, discarding the other slots' articles.
    pub async fn fetch_many(&self, count: usize) -> ScrollResult<Vec<Article>> {
        let results = join_all((0..count).map(|_| self.fetch_one())).await;

        let mut articles = Vec::with_capacity(count);
        for (slot, result) in results.into_iter().enumerate() {
            match result {
                Ok(Some(article)) => articles.push(article),
                Ok(None) => tracing::debug!(slot, "slot returned no usable article"),
                Err(e) if e.is_systemic() => {
                    tracing::warn!(slot, error = %e, "systemic failure, discarding batch");
                    return Err(e);
                }
                Err(e) => tracing::debug!(slot, error = %e, "slot failed"),
            }
        }

        if articles.is_empty() {
            if !self.connectivity.is_online() {
                return Err(ScrollError::Offline);
            }
            return Err(ScrollError::NoArticles);
        }

        tracing::debug!(requested = count, fetched = articles.len(), "batch complete");
        Ok(articles)
    }

    fn parse(&self, response: RawResponse) -> Option<Article> {
        let article = Article::from_json(response.body, &self.config.page_base);
        if article.is_none() {
            tracing::debug!("discarding invalid summary payload");
        }
        article
    }

    /// `retry_delay * n` where `n` is the one-based attempt that just failed.
    fn linear_backoff(&self, attempt: u32) -> Duration {
        self.config
            .retry_delay
            .checked_mul(attempt.saturating_add(1))
            .unwrap_or(Duration::MAX)
    }

    /// `retry_delay * 2^attempt` with a zero-based attempt index.
    fn exponential_backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.config.retry_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

fn accept_json() -> Vec<(String, String)> {
    vec![("Accept".to_string(), "application/json".to_string())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArticleId;
    use crate::sources::connectivity::ConnectivityMonitor;
    use crate::sources::testing::{summary, summary_with_extract, Reply, ScriptedTransport};
    use crate::sources::traits::MockTransport;
    use serde_json::json;
    use tokio::time::Instant;

    fn online() -> Arc<dyn Connectivity> {
        Arc::new(ConnectivityMonitor::new(true))
    }

    fn client<T: Transport>(transport: T, connectivity: Arc<dyn Connectivity>) -> ArticleClient<T> {
        ArticleClient::new(transport, connectivity, FetchConfig::default())
    }

    /// Virtual time may overshoot a deadline by a tick, never undershoot.
    fn assert_elapsed(started: Instant, secs: u64) {
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(secs), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(secs + 1), "elapsed {:?}", elapsed);
    }

    fn ids(articles: &[Article]) -> Vec<ArticleId> {
        articles.iter().map(|a| a.id.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_and_transform() {
        let transport = Arc::new(ScriptedTransport::always(Reply::Json(json!({
            "pageid": 42,
            "title": "Test Article",
            "extract": "This is a sufficiently long extract for the article to pass validation checks.",
            "thumbnail": { "source": "https://example.com/thumb.jpg" }
        }))));
        let client = client(transport.clone(), online());

        let articles = client.fetch_many(1).await.unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Test Article");
        assert_eq!(articles[0].id, ArticleId::Num(42));
        assert_eq!(articles[0].thumbnail.as_deref(), Some("https://example.com/thumb.jpg"));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_summary_endpoint_as_json() {
        let mut mock = MockTransport::new();
        mock.expect_get()
            .withf(|url, headers| {
                url.to_string() == "https://en.wikipedia.org/api/rest_v1/page/random/summary"
                    && headers.contains(&("Accept".to_string(), "application/json".to_string()))
            })
            .times(1)
            .returning(|_, _| Ok(RawResponse::ok(summary(1))));
        let client = client(mock, online());

        let article = client.fetch_one().await.unwrap();
        assert_eq!(article.unwrap().id, ArticleId::Num(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_carries_retry_after() {
        let mut mock = MockTransport::new();
        mock.expect_get()
            .times(3)
            .returning(|_, _| Ok(RawResponse::status(429).with_header("Retry-After", "5")));
        let client = client(mock, online());

        let started = Instant::now();
        let err = client.fetch_many(1).await.unwrap_err();

        assert!(matches!(
            err,
            ScrollError::RateLimited {
                retry_after_secs: Some(5)
            }
        ));
        // Two waits of Retry-After between three attempts
        assert_elapsed(started, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_without_header_backs_off_exponentially() {
        let transport = Arc::new(ScriptedTransport::always(Reply::RateLimited(None)));
        let client = client(transport.clone(), online());

        let started = Instant::now();
        let err = client.fetch_one().await.unwrap_err();

        assert!(matches!(err, ScrollError::RateLimited { retry_after_secs: None }));
        assert_eq!(transport.calls(), 3);
        // 1s + 2s
        assert_elapsed(started, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_recovers_on_retry() {
        let transport = Arc::new(ScriptedTransport::new(|n| match n {
            0 => Reply::RateLimited(Some(2)),
            _ => Reply::Json(summary(9)),
        }));
        let client = client(transport.clone(), online());

        let article = client.fetch_one().await.unwrap().unwrap();
        assert_eq!(article.id, ArticleId::Num(9));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_transport_times_out_after_retries() {
        let transport = Arc::new(ScriptedTransport::always(Reply::Hang));
        let client = client(transport.clone(), online());

        let started = Instant::now();
        let err = client.fetch_many(1).await.unwrap_err();

        assert!(matches!(err, ScrollError::Timeout));
        assert_eq!(transport.calls(), 3);
        // Three 10s bounds plus 1s and 2s of linear backoff
        assert_elapsed(started, 33);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_discarded() {
        let transport = Arc::new(ScriptedTransport::new(|n| match n {
            0 => Reply::Delayed(Duration::from_secs(15), summary(1)),
            _ => Reply::Json(summary(2)),
        }));
        let client = client(transport.clone(), online());

        let article = client.fetch_one().await.unwrap().unwrap();
        assert_eq!(article.id, ArticleId::Num(2));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_fails_without_network() {
        let mut mock = MockTransport::new();
        mock.expect_get().never();
        let client = client(mock, Arc::new(ConnectivityMonitor::new(false)));

        let started = Instant::now();
        let err = client.fetch_many(3).await.unwrap_err();

        assert!(matches!(err, ScrollError::Offline));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_rechecked_before_each_attempt() {
        let monitor = Arc::new(ConnectivityMonitor::new(true));
        let flag = monitor.clone();
        let transport = Arc::new(ScriptedTransport::new(move |_| {
            // First attempt fails and connectivity drops before the retry
            flag.set_online(false);
            Reply::NetworkError
        }));
        let client = client(transport.clone(), monitor);

        let err = client.fetch_one().await.unwrap_err();
        assert!(matches!(err, ScrollError::Offline));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_is_retried_then_raised() {
        let transport = Arc::new(ScriptedTransport::always(Reply::Status(503)));
        let client = client(transport.clone(), online());

        let started = Instant::now();
        let err = client.fetch_one().await.unwrap_err();

        assert!(matches!(err, ScrollError::Status(503)));
        assert_eq!(transport.calls(), 3);
        assert_elapsed(started, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_recovers() {
        let transport = Arc::new(ScriptedTransport::new(|n| match n {
            0 | 1 => Reply::NetworkError,
            _ => Reply::Json(summary(3)),
        }));
        let client = client(transport.clone(), online());

        let article = client.fetch_one().await.unwrap().unwrap();
        assert_eq!(article.id, ArticleId::Num(3));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_payload_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::always(Reply::Json(json!({ "pageid": 1 }))));
        let client = client(transport.clone(), online());

        assert!(client.fetch_one().await.unwrap().is_none());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_short_and_empty_extracts() {
        let transport = Arc::new(ScriptedTransport::new(|n| match n {
            0 => Reply::Json(summary_with_extract(10, "Too short")),
            1 => Reply::Json(summary_with_extract(11, "")),
            _ => Reply::Json(summary(12)),
        }));
        let client = client(transport.clone(), online());

        let articles = client.fetch_many(3).await.unwrap();
        assert_eq!(ids(&articles), vec![ArticleId::Num(12)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_malformed_articles() {
        let transport = Arc::new(ScriptedTransport::new(|n| match n {
            0 => Reply::Json(json!({ "pageid": 1, "extract": "Some text that is long enough to pass" })),
            _ => Reply::Json(summary(2)),
        }));
        let client = client(transport, online());

        let articles = client.fetch_many(2).await.unwrap();
        assert_eq!(ids(&articles), vec![ArticleId::Num(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_slot_does_not_fail_batch() {
        // Call 1 is slot two; every other call belongs to slot one
        let transport = Arc::new(ScriptedTransport::new(|n| match n {
            1 => Reply::Json(summary(5)),
            _ => Reply::NetworkError,
        }));
        let client = client(transport.clone(), online());

        let articles = client.fetch_many(2).await.unwrap();
        assert_eq!(ids(&articles), vec![ArticleId::Num(5)]);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_keeps_launch_order() {
        // Slot zero answers last but is still first in the batch
        let transport = Arc::new(ScriptedTransport::new(|n| match n {
            0 => Reply::Delayed(Duration::from_secs(2), summary(100)),
            1 => Reply::Delayed(Duration::from_secs(1), summary(200)),
            _ => Reply::Json(summary(300)),
        }));
        let client = client(transport, online());

        let articles = client.fetch_many(3).await.unwrap();
        assert_eq!(
            ids(&articles),
            vec![ArticleId::Num(100), ArticleId::Num(200), ArticleId::Num(300)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_systemic_error_overrides_partial_success() {
        let transport = Arc::new(ScriptedTransport::new(|n| match n {
            0 => Reply::Json(summary(1)),
            _ => Reply::RateLimited(Some(1)),
        }));
        let client = client(transport, online());

        let err = client.fetch_many(2).await.unwrap_err();
        assert!(matches!(
            err,
            ScrollError::RateLimited {
                retry_after_secs: Some(1)
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_invalid_while_online_is_no_articles() {
        let transport = Arc::new(ScriptedTransport::always(Reply::Json(json!({
            "pageid": 1,
            "title": "X",
            "extract": "short"
        }))));
        let client = client(transport, online());

        let err = client.fetch_many(3).await.unwrap_err();
        assert!(matches!(err, ScrollError::NoArticles));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_after_going_offline_is_offline() {
        let monitor = Arc::new(ConnectivityMonitor::new(true));
        let flag = monitor.clone();
        let transport = Arc::new(ScriptedTransport::new(move |_| {
            flag.set_online(false);
            Reply::Status(500)
        }));
        let client = client(transport, monitor);

        let err = client.fetch_many(2).await.unwrap_err();
        assert!(matches!(err, ScrollError::Offline));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule() {
        let client = client(ScriptedTransport::always(Reply::Hang), online());

        assert_eq!(client.linear_backoff(0), Duration::from_secs(1));
        assert_eq!(client.linear_backoff(1), Duration::from_secs(2));
        assert_eq!(client.exponential_backoff(0), Duration::from_secs(1));
        assert_eq!(client.exponential_backoff(1), Duration::from_secs(2));
        assert_eq!(client.exponential_backoff(2), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_saturates_on_huge_delays() {
        let config = FetchConfig {
            retry_delay: Duration::from_millis(1_000_000_000_000),
            max_attempts: 40,
            ..FetchConfig::default()
        };
        let client = ArticleClient::new(ScriptedTransport::always(Reply::Hang), online(), config);

        assert_eq!(client.exponential_backoff(39), Duration::MAX);
        assert_eq!(client.exponential_backoff(40), Duration::MAX);
        assert_eq!(
            client.linear_backoff(1),
            Duration::from_millis(2_000_000_000_000)
        );

        let config = FetchConfig {
            retry_delay: Duration::MAX,
            ..FetchConfig::default()
        };
        let client = ArticleClient::new(ScriptedTransport::always(Reply::Hang), online(), config);
        assert_eq!(client.linear_backoff(0), Duration::MAX);
        assert_eq!(client.linear_backoff(1), Duration::MAX);
    }
}
