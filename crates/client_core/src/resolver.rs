use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use shared::protocol::SignedUrlResponse;

use crate::error::{into_api_result, ClientError};

/// Signed URLs outlive typical render churn but not the session; entries
/// older than this are treated as misses and re-resolved.
const SIGNED_URL_TTL: Duration = Duration::from_secs(600);

/// Seam between the resolver and the REST endpoint that exchanges an opaque
/// storage key for a time-limited URL.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch_signed_url(&self, key: &str) -> Result<String, ClientError>;
}

pub struct HttpResourceFetcher {
    http: reqwest::Client,
    api_base: String,
    bearer: Arc<Mutex<Option<String>>>,
}

impl HttpResourceFetcher {
    pub fn new(
        http: reqwest::Client,
        api_base: String,
        bearer: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            http,
            api_base,
            bearer,
        }
    }
}

#[async_trait]
impl ResourceFetcher for HttpResourceFetcher {
    async fn fetch_signed_url(&self, key: &str) -> Result<String, ClientError> {
        let token = self
            .bearer
            .lock()
            .expect("bearer token lock poisoned")
            .clone()
            .ok_or(ClientError::NotLoggedIn)?;
        let response = self
            .http
            .get(format!("{}/users/view-image", self.api_base))
            .query(&[("key", key)])
            .bearer_auth(token)
            .send()
            .await?;
        let body: SignedUrlResponse = into_api_result(response).await?.json().await?;
        Ok(body.url)
    }
}

struct CacheEntry {
    url: String,
    /// `None` for keys that were already absolute URLs; those never expire.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Turns opaque storage keys into directly fetchable URLs through a
/// short-lived cache. Concurrent resolutions of one key share a single
/// upstream call; failures are never cached so the next access retries.
pub struct MediaResolver {
    fetcher: Arc<dyn ResourceFetcher>,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
    pending: Mutex<HashMap<String, Vec<oneshot::Sender<Option<String>>>>>,
}

impl MediaResolver {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self::with_ttl(fetcher, SIGNED_URL_TTL)
    }

    pub fn with_ttl(fetcher: Arc<dyn ResourceFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            cache: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Lock-only lookup for the render path; returns only fresh entries.
    pub fn cached(&self, key: &str) -> Option<String> {
        let cache = self.cache.lock().expect("resolver cache lock poisoned");
        cache
            .get(key)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.url.clone())
    }

    /// Resolves a key to a displayable URL, or `None` on failure. Absolute
    /// URLs bypass resolution entirely and are cached verbatim.
    pub async fn resolve(&self, key: &str) -> Option<String> {
        if is_absolute_url(key) {
            self.cache
                .lock()
                .expect("resolver cache lock poisoned")
                .insert(
                    key.to_string(),
                    CacheEntry {
                        url: key.to_string(),
                        expires_at: None,
                    },
                );
            return Some(key.to_string());
        }

        if let Some(hit) = self.cached(key) {
            return Some(hit);
        }

        // Join an in-flight resolution for this key, or become its leader.
        let waiter = {
            let mut pending = self.pending.lock().expect("resolver pending lock poisoned");
            if let Some(waiters) = pending.get_mut(key) {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Some(rx)
            } else {
                pending.insert(key.to_string(), Vec::new());
                None
            }
        };
        if let Some(rx) = waiter {
            return rx.await.ok().flatten();
        }

        let outcome = match self.fetcher.fetch_signed_url(key).await {
            Ok(url) => {
                debug!(key, "resolved media key");
                self.cache
                    .lock()
                    .expect("resolver cache lock poisoned")
                    .insert(
                        key.to_string(),
                        CacheEntry {
                            url: url.clone(),
                            expires_at: Some(Instant::now() + self.ttl),
                        },
                    );
                Some(url)
            }
            Err(err) => {
                warn!(key, %err, "media resolution failed");
                None
            }
        };

        let waiters = self
            .pending
            .lock()
            .expect("resolver pending lock poisoned")
            .remove(key)
            .unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(outcome.clone());
        }
        outcome
    }
}

fn is_absolute_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
