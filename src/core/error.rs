//! Error taxonomy for the resolution-and-aggregation pipeline.
//!
//! Every variant except [`AggregationError::Persistence`] is recovered locally
//! by the stage that produces it; they are still surfaced in the run report
//! so that dropped data remains observable.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    /// One vendor record failed validation. Only that record is dropped.
    #[error("invalid record from {feed}: {reason}")]
    InvalidRecord { feed: String, reason: String },

    /// A feed could not be fetched or decoded.
    #[error("feed {feed} unavailable: {reason}")]
    FeedUnavailable { feed: String, reason: String },

    /// A feed did not answer within its per-feed timeout or the overall budget.
    #[error("feed {feed} timed out")]
    FeedTimedOut { feed: String },

    #[error("no exchange rate available for {currency}")]
    RateUnavailable { currency: String },

    /// The lookup service answered and has no identifier for this pair.
    #[error("no identifier found for {name} on {exchange}")]
    NotFound { name: String, exchange: String },

    /// The lookup service could not be asked; the answer is unknown.
    #[error("identifier lookup unavailable: {reason}")]
    LookupUnavailable { reason: String },

    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl AggregationError {
    pub fn invalid_record(feed: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            feed: feed.to_string(),
            reason: reason.into(),
        }
    }

    pub fn feed_unavailable(feed: &str, reason: impl Into<String>) -> Self {
        Self::FeedUnavailable {
            feed: feed.to_string(),
            reason: reason.into(),
        }
    }

    pub fn rate_unavailable(currency: &str) -> Self {
        Self::RateUnavailable {
            currency: currency.to_string(),
        }
    }

    pub fn lookup_unavailable(reason: impl Into<String>) -> Self {
        Self::LookupUnavailable {
            reason: reason.into(),
        }
    }

    /// Timeouts are reported as a kind of feed unavailability.
    pub fn is_feed_unavailable(&self) -> bool {
        matches!(
            self,
            Self::FeedUnavailable { .. } | Self::FeedTimedOut { .. }
        )
    }
}

pub type Result<T, E = AggregationError> = std::result::Result<T, E>;
