use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

const CRATE_TARGET: &str = "equity_aggregator";

/// Installs the global subscriber on stderr, keeping stdout free for tables
/// and JSON.
///
/// Only events from this crate are emitted. `verbose` enables them at debug
/// level; otherwise `RUST_LOG` decides and the default is silence.
pub fn init_logging(verbose: bool) {
    let targets = Targets::new().with_target(CRATE_TARGET, LevelFilter::TRACE);
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::OFF
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .pretty()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(targets)
        .with(env_filter)
        .init();
}
