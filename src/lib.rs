pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::store::FjallProfileStore;
use anyhow::{Context, Result};
use tracing::{debug, info};

pub enum AppCommand {
    /// Fetch, reconcile and store all configured feeds.
    Aggregate { json: bool },
    /// Print the stored profile set.
    Show,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Equity aggregator starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let data_path = config.default_data_path()?;
    let store = FjallProfileStore::open(&data_path)
        .with_context(|| format!("Failed to open profile store at {}", data_path.display()))?;

    match command {
        AppCommand::Aggregate { json } => cli::aggregate::run(&config, &store, json).await,
        AppCommand::Show => cli::show::run(&store).await,
    }
}
