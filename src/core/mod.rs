//! Core business logic and abstractions

pub mod aggregator;
pub mod config;
pub mod currency;
pub mod equity;
pub mod error;
pub mod feed;
pub mod isin;
pub mod log;
pub mod matcher;
pub mod merge;
pub mod orchestrator;
pub mod resolver;
pub mod similarity;
pub mod store;

// Re-export main types for cleaner imports
pub use aggregator::{AggregationRun, Aggregator};
pub use currency::{CurrencyConverter, ExchangeRateSnapshot, RateSource};
pub use equity::{CanonicalCandidate, EquityProfile, RawRecord};
pub use error::AggregationError;
pub use feed::{FeedClient, IdentifierLookup};
pub use store::ProfileStore;
