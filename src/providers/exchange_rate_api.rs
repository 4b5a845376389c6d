use crate::core::currency::RateSource;
use crate::providers::util::{RetryPolicy, http_client, with_retry};
use anyhow::{Context, Result, anyhow, ensure};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Rate table from an ExchangeRate-API compatible endpoint
/// (`{base_url}/[{api_key}/]latest/{BASE}`).
pub struct ExchangeRateApiSource {
    base_url: String,
    api_key: Option<String>,
}

impl ExchangeRateApiSource {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        ExchangeRateApiSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
        }
    }

    fn url(&self, base: &str) -> String {
        match &self.api_key {
            Some(key) => format!("{}/{}/latest/{}", self.base_url, key, base),
            None => format!("{}/latest/{}", self.base_url, base),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default, alias = "rates")]
    conversion_rates: HashMap<String, Decimal>,
}

#[async_trait]
impl RateSource for ExchangeRateApiSource {
    #[instrument(name = "ExchangeRateFetch", skip(self), fields(base = %base))]
    async fn fetch_rates(&self, base: &str) -> Result<HashMap<String, Decimal>> {
        let url = self.url(&base.to_uppercase());
        debug!("Requesting exchange rates from {}", self.base_url);

        let client = http_client()?;
        let response = with_retry(|| client.get(&url).send(), RetryPolicy::BULK)
            .await
            .with_context(|| format!("Failed to request exchange rates for {base}"))?;

        let status = response.status();
        ensure!(status.is_success(), "Exchange rate request failed: HTTP {}", status);

        let data: LatestRatesResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse exchange rates for {base}"))?;

        if data.result != "success" {
            return Err(anyhow!(
                "Exchange rate API returned {}: {}",
                data.result,
                data.error_type.unwrap_or_default()
            ));
        }
        ensure!(
            !data.conversion_rates.is_empty(),
            "Exchange rate API returned no rates"
        );

        debug!("Received {} rates", data.conversion_rates.len());
        Ok(data.conversion_rates)
    }
}
