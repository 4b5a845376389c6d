use crate::core::error::{AggregationError, Result};
use crate::core::feed::IdentifierLookup;
use crate::providers::util::{RetryPolicy, http_client, with_retry};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Looks up ISINs from a reference-data service answering
/// `GET {url}?name=..&exchange=..` with `{"isin": "..."}`.
///
/// A 404 or an empty `isin` is a definite miss (`NotFound`). Transport
/// failures, other error statuses and unreadable bodies leave the answer
/// unknown (`LookupUnavailable`).
pub struct HttpIdentifierLookup {
    url: String,
    client: Client,
}

impl HttpIdentifierLookup {
    pub fn new(url: &str) -> reqwest::Result<Self> {
        Ok(HttpIdentifierLookup {
            url: url.to_string(),
            client: http_client()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    isin: Option<String>,
}

#[async_trait]
impl IdentifierLookup for HttpIdentifierLookup {
    #[instrument(name = "IsinLookup", skip(self))]
    async fn lookup(&self, name: &str, exchange: &str) -> Result<String> {
        let not_found = || AggregationError::NotFound {
            name: name.to_string(),
            exchange: exchange.to_string(),
        };

        let url = Url::parse_with_params(&self.url, &[("name", name), ("exchange", exchange)])
            .map_err(|e| {
                AggregationError::lookup_unavailable(format!("invalid URL {}: {e}", self.url))
            })?;
        let response = with_retry(
            || self.client.get(url.clone()).send(),
            RetryPolicy::PER_RECORD,
        )
        .await
        .map_err(|e| AggregationError::lookup_unavailable(format!("request failed: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(not_found()),
            status if !status.is_success() => {
                return Err(AggregationError::lookup_unavailable(format!("HTTP {status}")));
            }
            _ => {}
        }

        let body: LookupResponse = response.json().await.map_err(|e| {
            AggregationError::lookup_unavailable(format!("malformed response: {e}"))
        })?;
        let isin = body
            .isin
            .map(|isin| isin.trim().to_uppercase())
            .filter(|isin| !isin.is_empty());
        debug!(found = isin.is_some(), "Lookup answered");
        isin.ok_or_else(not_found)
    }
}
