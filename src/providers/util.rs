use reqwest::Client;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("equity-aggregator/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client settings for every provider.
pub fn http_client() -> reqwest::Result<Client> {
    Client::builder().user_agent(USER_AGENT).build()
}

/// How often and how patiently a provider retries a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub retries: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Bulk downloads: feeds and rate tables.
    pub const BULK: RetryPolicy = RetryPolicy {
        retries: 3,
        delay: Duration::from_millis(500),
    };

    /// Per-record calls where a slow answer is worth less than none.
    pub const PER_RECORD: RetryPolicy = RetryPolicy {
        retries: 2,
        delay: Duration::from_millis(250),
    };
}

/// Runs `operation` until it succeeds or the policy's retries run out,
/// returning the last error.
///
/// Only errors from `operation` itself are retried; an HTTP error status is
/// a successful response here and is left to the caller.
pub async fn with_retry<F, Fut, T, E>(mut operation: F, policy: RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.retries => {
                attempt += 1;
                debug!(attempt, retries = policy.retries, error = %err, "Request failed, retrying");
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
