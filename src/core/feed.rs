//! Contracts for the external collaborators feeding the pipeline.

use crate::core::equity::RawRecord;
use crate::core::error::Result;
use async_trait::async_trait;

/// One exchange or vendor feed.
///
/// Implementations must be safe to run concurrently with other feeds; a
/// single client is never fetched twice at the same time. Failures are
/// reported as [`AggregationError::FeedUnavailable`](crate::core::error::AggregationError::FeedUnavailable).
#[async_trait]
pub trait FeedClient: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<RawRecord>>;
}

/// Best-effort identifier lookup for records whose vendor omitted the ISIN.
/// Misses are reported as [`AggregationError::NotFound`](crate::core::error::AggregationError::NotFound).
#[async_trait]
pub trait IdentifierLookup: Send + Sync {
    async fn lookup(&self, name: &str, exchange: &str) -> Result<String>;
}
