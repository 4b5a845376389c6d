use crate::core::error::{AggregationError, Result};
use crate::core::feed::IdentifierLookup;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

type LookupKey = (String, String);

/// Memoises identifier lookups by `(name, exchange)` for the life of the
/// process. Definite misses are remembered as well, so a vendor that omits
/// ISINs for the same securities every run costs one lookup per security.
/// Errors other than `NotFound` are passed through and asked again next time.
#[derive(Clone)]
pub struct CachingIdentifierLookup<T: IdentifierLookup> {
    inner: T,
    known: Arc<Mutex<HashMap<LookupKey, Option<String>>>>,
}

impl<T: IdentifierLookup> CachingIdentifierLookup<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            known: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn answer(name: &str, exchange: &str, isin: Option<String>) -> Result<String> {
        isin.ok_or_else(|| AggregationError::NotFound {
            name: name.to_string(),
            exchange: exchange.to_string(),
        })
    }
}

#[async_trait]
impl<T: IdentifierLookup> IdentifierLookup for CachingIdentifierLookup<T> {
    async fn lookup(&self, name: &str, exchange: &str) -> Result<String> {
        let key = (name.to_string(), exchange.to_string());
        if let Some(isin) = self.known.lock().await.get(&key) {
            debug!(name, exchange, hit = isin.is_some(), "Identifier served from cache");
            return Self::answer(name, exchange, isin.clone());
        }

        // Unlocked while the inner lookup runs; concurrent callers for the
        // same key may both reach the service.
        let isin = match self.inner.lookup(name, exchange).await {
            Ok(isin) => Some(isin),
            Err(AggregationError::NotFound { .. }) => None,
            Err(e) => {
                debug!(name, exchange, error = %e, "Lookup failed, not caching");
                return Err(e);
            }
        };
        self.known.lock().await.insert(key, isin.clone());
        Self::answer(name, exchange, isin)
    }
}
