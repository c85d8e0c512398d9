use std::time::Duration;

use url::Url;

use crate::error::ClientError;

/// Connection endpoints and policies for one client instance. Divergent
/// hard-coded base URLs become configuration here; the push endpoint is
/// derived from the API endpoint unless the deployment splits them.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base: String,
    pub push_base: String,
    pub push_retry: PushRetryPolicy,
}

/// Reconnect ladder for the push channel: exponential backoff with a cap,
/// bounded by a maximum number of consecutive failed attempts, after which
/// the adapter parks disconnected and reports instead of retrying silently.
#[derive(Debug, Clone, Copy)]
pub struct PushRetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for PushRetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

impl ClientConfig {
    pub fn new(api_base: &str) -> Result<Self, ClientError> {
        let api_base = normalize_base(api_base, &["http", "https"])?;
        let push_base = if api_base.starts_with("https://") {
            api_base.replacen("https://", "wss://", 1)
        } else {
            api_base.replacen("http://", "ws://", 1)
        };
        Ok(Self {
            api_base,
            push_base,
            push_retry: PushRetryPolicy::default(),
        })
    }

    pub fn with_push_base(api_base: &str, push_base: &str) -> Result<Self, ClientError> {
        let api_base = normalize_base(api_base, &["http", "https"])?;
        let push_base = normalize_base(push_base, &["ws", "wss"])?;
        Ok(Self {
            api_base,
            push_base,
            push_retry: PushRetryPolicy::default(),
        })
    }

    pub fn push_retry(mut self, policy: PushRetryPolicy) -> Self {
        self.push_retry = policy;
        self
    }

    /// Push-channel endpoint with the session token as a handshake query
    /// parameter.
    pub(crate) fn push_url(&self, token: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(&format!("{}/ws", self.push_base))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

fn normalize_base(value: &str, schemes: &[&str]) -> Result<String, ClientError> {
    let url = Url::parse(value)?;
    if !schemes.contains(&url.scheme()) {
        return Err(ClientError::UnsupportedScheme(url.scheme().to_string()));
    }
    Ok(value.trim_end_matches('/').to_string())
}
