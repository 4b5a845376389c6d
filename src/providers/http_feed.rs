use crate::core::equity::RawRecord;
use crate::core::error::{AggregationError, Result};
use crate::core::feed::FeedClient;
use crate::providers::util::{RetryPolicy, http_client, with_retry};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

/// Fetches a whole feed with one GET. The body is either a JSON array of
/// records or an object carrying the array under `data`.
pub struct HttpFeedClient {
    name: String,
    url: String,
}

impl HttpFeedClient {
    pub fn new(name: &str, url: &str) -> Self {
        HttpFeedClient {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> AggregationError {
        AggregationError::feed_unavailable(&self.name, reason)
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "HttpFeedFetch", skip(self), fields(feed = %self.name))]
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        debug!("Requesting feed data from {}", self.url);

        let client = http_client().map_err(|e| self.unavailable(e.to_string()))?;
        let response = with_retry(|| client.get(&self.url).send(), RetryPolicy::BULK)
            .await
            .map_err(|e| self.unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(format!("HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("malformed payload: {e}")))?;

        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut object) => match object.remove("data") {
                Some(Value::Array(items)) => items,
                _ => return Err(self.unavailable("payload has no data array")),
            },
            _ => return Err(self.unavailable("payload is not a list of records")),
        };

        debug!("Received {} records", items.len());
        Ok(items
            .into_iter()
            .map(|item| RawRecord::from_value(&self.name, item))
            .collect())
    }
}
