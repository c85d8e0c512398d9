use std::sync::atomic::{AtomicUsize, Ordering};

use shared::error::{ApiError, ErrorCode};

use super::*;

struct CountingFetcher {
    calls: AtomicUsize,
    delay: Duration,
    fail_first: usize,
}

impl CountingFetcher {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail_first: 0,
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn failing_first(fail_first: usize) -> Self {
        Self {
            fail_first,
            ..Self::new()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceFetcher for CountingFetcher {
    async fn fetch_signed_url(&self, key: &str) -> Result<String, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        if call <= self.fail_first {
            return Err(ClientError::Api(ApiError::new(
                ErrorCode::Internal,
                "signing backend unavailable",
            )));
        }
        Ok(format!("https://cdn.test/{key}"))
    }
}

#[tokio::test]
async fn absolute_urls_short_circuit_without_a_network_call() {
    let fetcher = Arc::new(CountingFetcher::new());
    let resolver = MediaResolver::new(fetcher.clone());

    let resolved = resolver.resolve("https://static.example/pic.png").await;

    assert_eq!(resolved.as_deref(), Some("https://static.example/pic.png"));
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(
        resolver.cached("https://static.example/pic.png").as_deref(),
        Some("https://static.example/pic.png")
    );
}

#[tokio::test]
async fn repeated_lookups_hit_the_cache() {
    let fetcher = Arc::new(CountingFetcher::new());
    let resolver = MediaResolver::new(fetcher.clone());

    let first = resolver.resolve("avatars/alice.png").await;
    let second = resolver.resolve("avatars/alice.png").await;

    assert_eq!(first.as_deref(), Some("https://cdn.test/avatars/alice.png"));
    assert_eq!(first, second);
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn concurrent_lookups_for_one_key_share_a_single_call() {
    let fetcher = Arc::new(CountingFetcher::with_delay(Duration::from_millis(50)));
    let resolver = Arc::new(MediaResolver::new(fetcher.clone()));

    let (first, second) = tokio::join!(
        resolver.resolve("avatars/alice.png"),
        resolver.resolve("avatars/alice.png"),
    );

    assert_eq!(first.as_deref(), Some("https://cdn.test/avatars/alice.png"));
    assert_eq!(first, second);
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn failures_are_not_cached_and_retry_on_next_access() {
    let fetcher = Arc::new(CountingFetcher::failing_first(1));
    let resolver = MediaResolver::new(fetcher.clone());

    assert_eq!(resolver.resolve("avatars/alice.png").await, None);
    assert_eq!(resolver.cached("avatars/alice.png"), None);

    let retried = resolver.resolve("avatars/alice.png").await;
    assert_eq!(
        retried.as_deref(),
        Some("https://cdn.test/avatars/alice.png")
    );
    assert_eq!(fetcher.call_count(), 2);
}

#[tokio::test]
async fn expired_entries_are_resolved_again() {
    let fetcher = Arc::new(CountingFetcher::new());
    let resolver = MediaResolver::with_ttl(fetcher.clone(), Duration::from_millis(10));

    resolver.resolve("avatars/alice.png").await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(
        resolver.cached("avatars/alice.png"),
        None,
        "expired entries must read as misses"
    );
    let refreshed = resolver.resolve("avatars/alice.png").await;
    assert_eq!(
        refreshed.as_deref(),
        Some("https://cdn.test/avatars/alice.png")
    );
    assert_eq!(fetcher.call_count(), 2);
}
