pub mod caching;
pub mod exchange_rate_api;
pub mod http_feed;
pub mod isin_lookup;
pub mod util;

pub use caching::CachingIdentifierLookup;
pub use exchange_rate_api::ExchangeRateApiSource;
pub use http_feed::HttpFeedClient;
pub use isin_lookup::HttpIdentifierLookup;
