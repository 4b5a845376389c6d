//! Currency conversion to a single base currency.
//!
//! [`CurrencyConverter`] keeps one [`ExchangeRateSnapshot`] per process,
//! populated lazily and refreshed when older than its TTL. Concurrent callers
//! that find the snapshot stale share a single in-flight refresh, and share
//! its outcome when it fails too.

use crate::core::error::{AggregationError, Result};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Supplies the full rate table for a base currency, as units of each
/// currency per one unit of base.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rates(&self, base: &str) -> anyhow::Result<HashMap<String, Decimal>>;
}

/// Rate table shared read-only by every merge in an aggregation run.
#[derive(Debug, Clone)]
pub struct ExchangeRateSnapshot {
    base: String,
    rates: HashMap<String, Decimal>,
    fetched_at: Option<DateTime<Utc>>,
    fetched: Option<Instant>,
}

impl ExchangeRateSnapshot {
    /// A snapshot with no rates; only the base currency converts.
    pub fn empty(base: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            rates: HashMap::new(),
            fetched_at: None,
            fetched: None,
        }
    }

    pub fn with_rates(base: &str, rates: HashMap<String, Decimal>) -> Self {
        Self {
            base: base.to_uppercase(),
            rates: rates
                .into_iter()
                .map(|(code, rate)| (code.to_uppercase(), rate))
                .collect(),
            fetched_at: Some(Utc::now()),
            fetched: Some(Instant::now()),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        match self.fetched {
            None => true,
            Some(_) if ttl.is_zero() => true,
            Some(fetched) => fetched.elapsed() >= ttl,
        }
    }

    pub fn knows(&self, currency: &str) -> bool {
        self.rate(currency).is_ok()
    }

    pub fn rate(&self, currency: &str) -> Result<Decimal> {
        if currency.eq_ignore_ascii_case(&self.base) {
            return Ok(Decimal::ONE);
        }
        self.rates
            .get(&currency.to_uppercase())
            .copied()
            .filter(|rate| !rate.is_zero())
            .ok_or_else(|| AggregationError::rate_unavailable(currency))
    }

    /// Converts `amount` quoted in `currency` into the base currency, rounded
    /// to cents. Amounts already in the base currency are returned unchanged.
    pub fn convert(&self, amount: Decimal, currency: &str) -> Result<Decimal> {
        if currency.eq_ignore_ascii_case(&self.base) {
            return Ok(amount);
        }
        let rate = self.rate(currency)?;
        amount
            .checked_div(rate)
            .map(|v| v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
            .ok_or_else(|| AggregationError::rate_unavailable(currency))
    }
}

pub struct CurrencyConverter {
    base: String,
    ttl: Duration,
    source: Arc<dyn RateSource>,
    snapshot: RwLock<Arc<ExchangeRateSnapshot>>,
    /// Completed fetch attempts, successful or not.
    attempts: AtomicU64,
    /// Held for the duration of a fetch. Guards the error of the latest
    /// attempt when it failed with no snapshot to fall back to.
    refresh_gate: Mutex<Option<String>>,
}

impl CurrencyConverter {
    /// A `ttl` of zero treats the snapshot as always stale.
    pub fn new(base: &str, ttl: Duration, source: Arc<dyn RateSource>) -> Self {
        Self {
            base: base.to_uppercase(),
            ttl,
            source,
            snapshot: RwLock::new(Arc::new(ExchangeRateSnapshot::empty(base))),
            attempts: AtomicU64::new(0),
            refresh_gate: Mutex::new(None),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn rate(&self, currency: &str) -> Result<Decimal> {
        self.snapshot_covering(&[currency])
            .await
            .map_err(|e| {
                debug!("Rate lookup for {} failed: {}", currency, e);
                AggregationError::rate_unavailable(currency)
            })?
            .rate(currency)
    }

    pub async fn convert(&self, amount: Decimal, currency: &str) -> Result<Decimal> {
        if currency.eq_ignore_ascii_case(&self.base) {
            return Ok(amount);
        }
        self.snapshot_covering(&[currency])
            .await
            .map_err(|e| {
                debug!("Conversion from {} failed: {}", currency, e);
                AggregationError::rate_unavailable(currency)
            })?
            .convert(amount, currency)
    }

    /// Returns a snapshot that is fresh and, where the rate source allows,
    /// knows every currency in `currencies`. At most one extra refresh is
    /// attempted for unknown currencies.
    pub async fn snapshot_covering<S: AsRef<str>>(
        &self,
        currencies: &[S],
    ) -> anyhow::Result<Arc<ExchangeRateSnapshot>> {
        // Read before the snapshot so an attempt finishing in between is
        // seen as already made.
        let observed = self.attempts.load(Ordering::SeqCst);
        let snapshot = self.snapshot.read().await.clone();
        let (snapshot, refreshed) = if snapshot.is_expired(self.ttl) {
            (self.refresh(observed).await?, true)
        } else {
            (snapshot, false)
        };

        let unknown: Vec<&str> = currencies
            .iter()
            .map(AsRef::as_ref)
            .filter(|c| !snapshot.knows(c))
            .collect();
        if refreshed || unknown.is_empty() {
            return Ok(snapshot);
        }

        debug!("Refreshing rates for unknown currencies {:?}", unknown);
        self.refresh(observed).await
    }

    /// Fetches a new snapshot unless another attempt completed after
    /// `observed` was read, in which case that attempt's outcome is reused:
    /// its snapshot, the stale snapshot it fell back to, or its error.
    async fn refresh(&self, observed: u64) -> anyhow::Result<Arc<ExchangeRateSnapshot>> {
        let mut last_error = self.refresh_gate.lock().await;

        let current = self.snapshot.read().await.clone();
        let attempts = self.attempts.load(Ordering::SeqCst);
        if attempts != observed {
            debug!("Reusing outcome of rate refresh attempt {}", attempts);
            return match last_error.as_deref() {
                Some(e) if current.fetched.is_none() => {
                    Err(anyhow!("Exchange rate refresh failed: {e}"))
                }
                _ => Ok(current),
            };
        }

        let outcome = match self.source.fetch_rates(&self.base).await {
            Ok(rates) => {
                let next = Arc::new(ExchangeRateSnapshot::with_rates(&self.base, rates));
                info!(
                    "Loaded {} exchange rates against {}",
                    next.rates.len(),
                    self.base
                );
                *self.snapshot.write().await = Arc::clone(&next);
                *last_error = None;
                Ok(next)
            }
            Err(e) if current.fetched.is_some() => {
                warn!("Exchange rate refresh failed, keeping stale rates: {}", e);
                *last_error = Some(e.to_string());
                Ok(current)
            }
            Err(e) => {
                *last_error = Some(e.to_string());
                Err(anyhow!("Exchange rate refresh failed: {e}"))
            }
        };
        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

/// A [`RateSource`] serving a fixed table, for tests and offline runs.
/// Counts how many times it has been asked for rates.
#[derive(Debug, Default)]
pub struct StaticRateSource {
    rates: HashMap<String, Decimal>,
    delay: Option<Duration>,
    calls: std::sync::atomic::AtomicUsize,
}

impl StaticRateSource {
    pub fn new<I, S>(rates: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        Self {
            rates: rates.into_iter().map(|(c, r)| (c.into(), r)).collect(),
            delay: None,
            calls: Default::default(),
        }
    }

    /// Simulates a slow upstream by sleeping before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn fetch_rates(&self, _base: &str) -> anyhow::Result<HashMap<String, Decimal>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.rates.clone())
    }
}
