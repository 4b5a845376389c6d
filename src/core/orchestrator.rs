//! Concurrent fan-out over all configured feeds.
//!
//! Every feed runs as its own task with its own timeout. Results are joined
//! in feed declaration order against one shared deadline, so the candidate
//! sequence handed to the matcher is stable across runs with identical data.

use crate::core::equity::{CanonicalCandidate, RawRecord};
use crate::core::error::{AggregationError, Result};
use crate::core::feed::{FeedClient, IdentifierLookup};
use crate::core::isin;
use crate::core::resolver::RecordResolver;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct FeedFailure {
    pub feed: String,
    pub error: AggregationError,
}

/// Everything one collection pass produced, good and bad.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedCollection {
    /// Feed declaration order, then payload order within each feed.
    pub candidates: Vec<CanonicalCandidate>,
    pub feed_failures: Vec<FeedFailure>,
    pub rejected_records: Vec<AggregationError>,
    /// Set when the overall deadline cut the run short.
    pub timed_out: bool,
}

pub struct FeedOrchestrator {
    resolver: RecordResolver,
    lookup: Option<Arc<dyn IdentifierLookup>>,
    feed_timeout: Duration,
    feed_timeouts: HashMap<String, Duration>,
    overall_timeout: Duration,
    max_concurrent: Option<usize>,
    lookup_concurrency: usize,
}

impl FeedOrchestrator {
    pub fn new(resolver: RecordResolver) -> Self {
        Self {
            resolver,
            lookup: None,
            feed_timeout: DEFAULT_FEED_TIMEOUT,
            feed_timeouts: HashMap::new(),
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            max_concurrent: None,
            lookup_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn IdentifierLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_feed_timeout(mut self, timeout: Duration) -> Self {
        self.feed_timeout = timeout;
        self
    }

    /// Overrides the per-feed timeout for one named feed.
    pub fn with_timeout_for(mut self, feed: &str, timeout: Duration) -> Self {
        self.feed_timeouts.insert(feed.to_string(), timeout);
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    /// Caps how many feeds are fetched at once. Unbounded by default.
    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.max_concurrent = Some(limit.max(1));
        self
    }

    /// Caps how many identifier lookups are in flight at once.
    pub fn with_lookup_concurrency(mut self, limit: usize) -> Self {
        self.lookup_concurrency = limit.max(1);
        self
    }

    fn timeout_for(&self, feed: &str) -> Duration {
        self.feed_timeouts
            .get(feed)
            .copied()
            .unwrap_or(self.feed_timeout)
    }

    /// Fetches every feed, resolves every record and returns once each feed
    /// has completed, failed or timed out.
    pub async fn collect(&self, feeds: &[Arc<dyn FeedClient>]) -> FeedCollection {
        let deadline = Instant::now() + self.overall_timeout;
        let permits = self.max_concurrent.map(|n| Arc::new(Semaphore::new(n)));

        let tasks: Vec<_> = feeds
            .iter()
            .map(|feed| {
                let name = feed.name().to_string();
                let feed = Arc::clone(feed);
                let timeout = self.timeout_for(&name);
                let permits = permits.clone();
                let handle = tokio::spawn(async move {
                    let _permit = match permits {
                        Some(permits) => Some(permits.acquire_owned().await.map_err(|e| {
                            AggregationError::feed_unavailable(feed.name(), e.to_string())
                        })?),
                        None => None,
                    };
                    fetch_feed(feed, timeout).await
                });
                (name, handle)
            })
            .collect();

        let mut collection = FeedCollection::default();
        let mut batches: Vec<Vec<RawRecord>> = Vec::with_capacity(tasks.len());

        for (name, mut handle) in tasks {
            let error = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(records))) => {
                    info!("Fetched {} records from {}", records.len(), name);
                    batches.push(records);
                    continue;
                }
                Ok(Ok(Err(e))) => e,
                Ok(Err(e)) => AggregationError::feed_unavailable(&name, e.to_string()),
                Err(_) => {
                    handle.abort();
                    collection.timed_out = true;
                    AggregationError::FeedTimedOut { feed: name.clone() }
                }
            };
            warn!("Feed {} contributed nothing: {}", name, error);
            collection.feed_failures.push(FeedFailure { feed: name, error });
        }

        for batch in batches {
            let enriched: Vec<(RawRecord, bool)> = stream::iter(batch)
                .map(|raw| self.enrich(raw, deadline))
                .buffered(self.lookup_concurrency)
                .collect()
                .await;
            for (raw, cut_short) in enriched {
                collection.timed_out |= cut_short;
                match self.resolver.resolve(&raw) {
                    Ok(candidate) => collection.candidates.push(candidate),
                    Err(e) => {
                        debug!("Rejected record: {}", e);
                        collection.rejected_records.push(e);
                    }
                }
            }
        }

        info!(
            "Collected {} candidates from {} feeds ({} failed, {} records rejected)",
            collection.candidates.len(),
            feeds.len(),
            collection.feed_failures.len(),
            collection.rejected_records.len()
        );
        collection
    }

    /// Fills in a missing ISIN from the identifier lookup. Any miss, error,
    /// slow answer or checksum-invalid result leaves the record untouched.
    ///
    /// Each lookup gets the feed's timeout, clamped to the overall deadline.
    /// The flag is set when the overall deadline cut the lookup short.
    async fn enrich(&self, raw: RawRecord, deadline: Instant) -> (RawRecord, bool) {
        let Some(lookup) = &self.lookup else {
            return (raw, false);
        };
        if self.resolver.has_isin(&raw) {
            return (raw, false);
        }
        let Some((name, exchange)) = self.resolver.lookup_key(&raw) else {
            return (raw, false);
        };

        let now = Instant::now();
        if now >= deadline {
            debug!("Skipping lookup for {}, overall deadline passed", name);
            return (raw, true);
        }
        let feed_limit = now + self.timeout_for(&raw.source);
        let limit = feed_limit.min(deadline);

        match tokio::time::timeout_at(limit, lookup.lookup(&name, &exchange)).await {
            Ok(Ok(found)) if isin::is_valid(&found) => {
                debug!("Looked up {} for {} on {}", found, name, exchange);
                (self.resolver.with_isin(&raw, &found), false)
            }
            Ok(Ok(found)) => {
                debug!("Ignoring invalid looked-up identifier {}", found);
                (raw, false)
            }
            Ok(Err(e)) => {
                debug!("Identifier lookup failed: {}", e);
                (raw, false)
            }
            Err(_) => {
                debug!("Identifier lookup for {} timed out", name);
                (raw, limit == deadline)
            }
        }
    }
}

#[instrument(name = "FeedFetch", skip(feed), fields(feed = %feed.name()))]
async fn fetch_feed(feed: Arc<dyn FeedClient>, timeout: Duration) -> Result<Vec<RawRecord>> {
    match tokio::time::timeout(timeout, feed.fetch()).await {
        Ok(result) => result,
        Err(_) => {
            debug!("Timed out after {:?}", timeout);
            Err(AggregationError::FeedTimedOut {
                feed: feed.name().to_string(),
            })
        }
    }
}
