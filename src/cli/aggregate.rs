use super::{show, ui};
use crate::core::aggregator::{AggregationRun, Aggregator};
use crate::core::config::AppConfig;
use crate::core::currency::CurrencyConverter;
use crate::core::feed::FeedClient;
use crate::core::matcher::IdentityMatcher;
use crate::core::merge::{MergeEngine, SourcePriority};
use crate::core::orchestrator::FeedOrchestrator;
use crate::core::resolver::RecordResolver;
use crate::core::store::ProfileStore;
use crate::providers::{
    CachingIdentifierLookup, ExchangeRateApiSource, HttpFeedClient, HttpIdentifierLookup,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wires the configured feeds, rate source and lookup into a pipeline.
pub fn build_aggregator(config: &AppConfig) -> Result<Aggregator> {
    let mut resolver = RecordResolver::new();
    let mut feeds: Vec<Arc<dyn FeedClient>> = Vec::with_capacity(config.feeds.len());
    for feed in &config.feeds {
        resolver = resolver.with_schema(&feed.name, feed.schema.schema());
        feeds.push(Arc::new(HttpFeedClient::new(&feed.name, &feed.url)));
    }

    let aggregation = &config.aggregation;
    let mut orchestrator = FeedOrchestrator::new(resolver)
        .with_feed_timeout(Duration::from_secs(aggregation.feed_timeout_secs))
        .with_overall_timeout(Duration::from_secs(aggregation.overall_timeout_secs));
    for feed in &config.feeds {
        if let Some(secs) = feed.timeout_secs {
            orchestrator = orchestrator.with_timeout_for(&feed.name, Duration::from_secs(secs));
        }
    }
    if let Some(limit) = aggregation.max_concurrent_feeds {
        orchestrator = orchestrator.with_max_concurrent(limit);
    }
    if let Some(lookup) = &config.lookup {
        debug!("Using identifier lookup at {}", lookup.url);
        let client = HttpIdentifierLookup::new(&lookup.url)
            .context("Failed to build identifier lookup client")?;
        orchestrator = orchestrator
            .with_lookup(Arc::new(CachingIdentifierLookup::new(client)))
            .with_lookup_concurrency(lookup.max_concurrent);
    }

    let rates = ExchangeRateApiSource::new(&config.rates.base_url, config.rates.api_key.as_deref());
    let converter = CurrencyConverter::new(
        &config.base_currency(),
        config.rates.ttl(),
        Arc::new(rates),
    );

    Ok(Aggregator::new(
        feeds,
        orchestrator,
        IdentityMatcher::new(aggregation.similarity_threshold),
        MergeEngine::new(SourcePriority::new(config.source_priority.clone())),
        Arc::new(converter),
    ))
}

fn display_problems(run: &AggregationRun) -> Option<String> {
    if run.feed_failures.is_empty() && run.rejected_records.is_empty() {
        return None;
    }

    let mut lines = Vec::new();
    for failure in &run.feed_failures {
        lines.push(ui::paint(
            &format!("Feed {} skipped: {}", failure.feed, failure.error),
            ui::Tone::Problem,
        ));
    }
    if !run.rejected_records.is_empty() {
        lines.push(ui::paint(
            &format!(
                "{} records rejected (run with --verbose for details)",
                run.rejected_records.len()
            ),
            ui::Tone::Muted,
        ));
    }
    if run.timed_out {
        lines.push(ui::paint(
            "Overall time budget exceeded, results are partial",
            ui::Tone::Problem,
        ));
    }
    Some(lines.join("\n"))
}

/// Runs one aggregation pass, replaces the stored profile set and prints it.
pub async fn run(config: &AppConfig, store: &dyn ProfileStore, json: bool) -> Result<()> {
    let aggregator = build_aggregator(config)?;

    let pb = ui::new_spinner(&format!("Aggregating {} feeds...", config.feeds.len()));
    let result = aggregator.aggregate_and_persist(store).await;
    pb.finish_and_clear();
    let run = result.context("Failed to store aggregated profiles")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run.profiles)?);
    } else {
        println!("{}", show::display_profiles(&run.profiles));
    }
    if let Some(problems) = display_problems(&run) {
        eprintln!("\n{problems}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AggregationError;
    use crate::core::orchestrator::FeedFailure;

    #[test]
    fn test_display_problems() {
        assert!(display_problems(&AggregationRun::default()).is_none());

        let run = AggregationRun {
            feed_failures: vec![FeedFailure {
                feed: "lse".to_string(),
                error: AggregationError::FeedTimedOut {
                    feed: "lse".to_string(),
                },
            }],
            rejected_records: vec![AggregationError::invalid_record("xetra", "missing wkn")],
            ..Default::default()
        };
        let output = display_problems(&run).unwrap();
        assert!(output.contains("Feed lse skipped: feed lse timed out"));
        assert!(output.contains("1 records rejected"));
    }

    #[test]
    fn test_build_aggregator_from_example_config() {
        let config: AppConfig =
            serde_yaml::from_str(include_str!("../../docs/example_config.yaml")).unwrap();
        // Construction performs no I/O.
        let _aggregator = build_aggregator(&config).unwrap();
    }

    #[test]
    fn test_build_aggregator_with_lookup() {
        let mut config: AppConfig =
            serde_yaml::from_str(include_str!("../../docs/example_config.yaml")).unwrap();
        config.lookup =
            serde_yaml::from_str("url: http://127.0.0.1:9/isin\nmax_concurrent: 2").unwrap();
        assert!(build_aggregator(&config).is_ok());
    }
}
