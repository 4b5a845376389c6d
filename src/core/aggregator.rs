//! End-to-end coordinator: collect, cluster, merge.

use crate::core::currency::{CurrencyConverter, ExchangeRateSnapshot};
use crate::core::equity::EquityProfile;
use crate::core::error::{AggregationError, Result};
use crate::core::feed::FeedClient;
use crate::core::matcher::IdentityMatcher;
use crate::core::merge::MergeEngine;
use crate::core::orchestrator::{FeedFailure, FeedOrchestrator};
use crate::core::store::ProfileStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one aggregation pass, including everything that was dropped
/// along the way.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationRun {
    pub profiles: Vec<EquityProfile>,
    pub feed_failures: Vec<FeedFailure>,
    pub rejected_records: Vec<AggregationError>,
    pub timed_out: bool,
}

impl AggregationRun {
    pub fn failed_feeds(&self) -> Vec<&str> {
        self.feed_failures.iter().map(|f| f.feed.as_str()).collect()
    }
}

pub struct Aggregator {
    feeds: Vec<Arc<dyn FeedClient>>,
    orchestrator: FeedOrchestrator,
    matcher: IdentityMatcher,
    merger: MergeEngine,
    converter: Arc<CurrencyConverter>,
}

impl Aggregator {
    pub fn new(
        feeds: Vec<Arc<dyn FeedClient>>,
        orchestrator: FeedOrchestrator,
        matcher: IdentityMatcher,
        merger: MergeEngine,
        converter: Arc<CurrencyConverter>,
    ) -> Self {
        let merger = merger.with_declared_sources(feeds.iter().map(|f| f.name().to_string()));
        Self {
            feeds,
            orchestrator,
            matcher,
            merger,
            converter,
        }
    }

    /// Runs the whole pipeline from fresh fetches. Never fails: feed, record
    /// and rate problems are recovered and reported on the returned run.
    pub async fn aggregate(&self) -> AggregationRun {
        let collection = self.orchestrator.collect(&self.feeds).await;

        let mut currencies: Vec<&str> = Vec::new();
        for candidate in &collection.candidates {
            let priced = candidate.price.is_some() || candidate.market_cap.is_some();
            if priced && !currencies.contains(&candidate.currency.as_str()) {
                currencies.push(&candidate.currency);
            }
        }
        let rates = if currencies.is_empty() {
            Arc::new(ExchangeRateSnapshot::empty(self.converter.base()))
        } else {
            match self.converter.snapshot_covering(&currencies).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Continuing without exchange rates: {}", e);
                    Arc::new(ExchangeRateSnapshot::empty(self.converter.base()))
                }
            }
        };

        let clusters = self.matcher.cluster(collection.candidates);
        let profiles: Vec<EquityProfile> = clusters
            .iter()
            .map(|cluster| self.merger.merge(cluster, &rates))
            .collect();

        info!(
            "Aggregated {} profiles in {}",
            profiles.len(),
            rates.base()
        );

        AggregationRun {
            profiles,
            feed_failures: collection.feed_failures,
            rejected_records: collection.rejected_records,
            timed_out: collection.timed_out,
        }
    }

    pub async fn aggregate_and_normalise(&self) -> Vec<EquityProfile> {
        self.aggregate().await.profiles
    }

    /// Aggregates and hands the profiles to `store`. Persistence errors are
    /// returned as-is and not retried.
    pub async fn aggregate_and_persist(&self, store: &dyn ProfileStore) -> Result<AggregationRun> {
        let run = self.aggregate().await;
        store.replace_all(&run.profiles).await?;
        info!("Stored {} profiles", run.profiles.len());
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::StaticRateSource;
    use crate::core::equity::{MatchEvidence, RawRecord};
    use crate::core::merge::SourcePriority;
    use crate::core::resolver::{RecordResolver, SchemaKind};
    use crate::store::memory::MemoryProfileStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use std::str::FromStr;
    use std::time::Duration;

    struct StaticFeed {
        name: &'static str,
        records: Vec<Value>,
    }

    #[async_trait]
    impl FeedClient for StaticFeed {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self) -> Result<Vec<RawRecord>> {
            Ok(self
                .records
                .iter()
                .map(|v| RawRecord::from_value(self.name, v.clone()))
                .collect())
        }
    }

    struct DownFeed;

    #[async_trait]
    impl FeedClient for DownFeed {
        fn name(&self) -> &str {
            "xetra"
        }

        async fn fetch(&self) -> Result<Vec<RawRecord>> {
            Err(AggregationError::FeedTimedOut {
                feed: "xetra".to_string(),
            })
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ProfileStore for BrokenStore {
        async fn replace_all(&self, _profiles: &[EquityProfile]) -> Result<()> {
            Err(AggregationError::Persistence("disk full".to_string()))
        }

        async fn load_all(&self) -> Result<Vec<EquityProfile>> {
            Ok(Vec::new())
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn euronext() -> Arc<dyn FeedClient> {
        Arc::new(StaticFeed {
            name: "euronext",
            records: vec![
                json!({"name": "Airbus SE", "symbol": "AIR", "isin": "NL0000235190",
                       "mics": ["XPAR"], "currency": "EUR", "last_price": "100,00"}),
                json!({"name": "LVMH Moet Hennessy", "symbol": "MC", "isin": "FR0000121014",
                       "mics": ["XPAR"], "currency": "EUR", "last_price": "700"}),
            ],
        })
    }

    fn lse() -> Arc<dyn FeedClient> {
        Arc::new(StaticFeed {
            name: "lse",
            records: vec![
                json!({"issuername": "Airbus SE", "tidm": "0KVV", "isin": "NL0000235190",
                       "currency": "GBX", "lastprice": "9000", "marketcapitalization": "8000000"}),
                json!({"issuername": "Vodafone Group", "tidm": "VOD",
                       "currency": "GBP", "lastprice": "0.70"}),
            ],
        })
    }

    fn aggregator(feeds: Vec<Arc<dyn FeedClient>>, source: Arc<StaticRateSource>) -> Aggregator {
        let resolver = RecordResolver::new()
            .with_schema("euronext", SchemaKind::Euronext.schema())
            .with_schema("lse", SchemaKind::Lse.schema())
            .with_schema("xetra", SchemaKind::Xetra.schema());
        Aggregator::new(
            feeds,
            FeedOrchestrator::new(resolver),
            IdentityMatcher::default(),
            MergeEngine::new(SourcePriority::new(["euronext", "lse", "xetra"])),
            Arc::new(CurrencyConverter::new(
                "USD",
                Duration::from_secs(3600),
                source,
            )),
        )
    }

    fn rates() -> Arc<StaticRateSource> {
        Arc::new(StaticRateSource::new([
            ("EUR", dec("0.5")),
            ("GBP", dec("0.8")),
        ]))
    }

    #[tokio::test]
    async fn test_cross_feed_merge() {
        let profiles = aggregator(vec![euronext(), lse()], rates())
            .aggregate_and_normalise()
            .await;

        assert_eq!(profiles.len(), 3);

        let airbus = &profiles[0];
        assert_eq!(airbus.isin.as_deref(), Some("NL0000235190"));
        assert_eq!(airbus.symbol, "AIR");
        assert_eq!(airbus.price, Some(dec("200.00")));
        assert_eq!(airbus.market_cap, Some(dec("100000.00")));
        assert_eq!(airbus.source_names(), vec!["euronext", "lse"]);
        assert_eq!(airbus.mics, vec!["XPAR".to_string(), "XLON".to_string()]);

        let vodafone = profiles.iter().find(|p| p.symbol == "VOD").unwrap();
        assert_eq!(vodafone.price, Some(dec("0.88")));
        assert!(vodafone.is_low_confidence());
        assert_eq!(vodafone.sources[0].evidence, MatchEvidence::Unmatched);
    }

    #[tokio::test]
    async fn test_failed_feed_still_yields_other_profiles() {
        let run = aggregator(vec![euronext(), Arc::new(DownFeed)], rates())
            .aggregate()
            .await;

        assert_eq!(run.profiles.len(), 2);
        assert_eq!(run.failed_feeds(), vec!["xetra"]);
        assert!(run.profiles.iter().all(|p| p.source_names() == vec!["euronext"]));
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let source = rates();
        let aggregator = aggregator(vec![euronext(), lse()], source.clone());

        let first = aggregator.aggregate_and_normalise().await;
        let second = aggregator.aggregate_and_normalise().await;

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_rates_leave_fields_unresolved() {
        let run = aggregator(
            vec![lse()],
            Arc::new(StaticRateSource::new([("EUR", dec("0.5"))])),
        )
        .aggregate()
        .await;

        let vodafone = run.profiles.iter().find(|p| p.symbol == "VOD").unwrap();
        assert_eq!(vodafone.price, None);
        assert_eq!(vodafone.unresolved.len(), 1);
    }

    #[tokio::test]
    async fn test_persist_replaces_store_contents() {
        let store = MemoryProfileStore::new();
        let aggregator = aggregator(vec![euronext()], rates());

        let run = aggregator.aggregate_and_persist(&store).await.unwrap();
        let stored = store.load_all().await.unwrap();
        assert_eq!(stored, run.profiles);
    }

    #[tokio::test]
    async fn test_persistence_error_is_surfaced() {
        let result = aggregator(vec![euronext()], rates())
            .aggregate_and_persist(&BrokenStore)
            .await;
        assert_eq!(
            result.unwrap_err(),
            AggregationError::Persistence("disk full".to_string())
        );
    }

    #[tokio::test]
    async fn test_unlisted_feeds_rank_in_declaration_order() {
        let first = Arc::new(StaticFeed {
            name: "first",
            records: vec![json!({"name": "Acme Corp", "symbol": "ACME", "exchange": "XNAS",
                                 "currency": "USD", "price": "100"})],
        });
        let second = Arc::new(StaticFeed {
            name: "second",
            records: vec![json!({"name": "Acme Corp", "symbol": "ACME", "isin": "US0378331005",
                                 "exchange": "XNAS", "currency": "USD", "price": "50"})],
        });
        let aggregator = Aggregator::new(
            vec![first, second],
            FeedOrchestrator::new(RecordResolver::new()),
            IdentityMatcher::default(),
            MergeEngine::new(SourcePriority::default()),
            Arc::new(CurrencyConverter::new("USD", Duration::from_secs(3600), rates())),
        );

        let profiles = aggregator.aggregate_and_normalise().await;

        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].source_names(), vec!["first", "second"]);
        assert_eq!(profiles[0].price, Some(dec("100.00")));
        assert_eq!(profiles[0].isin.as_deref(), Some("US0378331005"));
    }
}
