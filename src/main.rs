use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use equity_aggregator::AppCommand;
use equity_aggregator::cli::setup::setup;
use equity_aggregator::core::log::init_logging;

/// Reconcile equity data from several exchange feeds into one profile per
/// security.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Log pipeline decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file to use instead of the default location
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example configuration file
    Setup {
        /// Replace an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Fetch all feeds, reconcile them and store the profiles
    Aggregate {
        /// Print profiles as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Display the stored profiles
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config_path.as_deref();
    let result = match cli.command {
        Some(Commands::Setup { force }) => setup(force),
        Some(Commands::Aggregate { json }) => {
            equity_aggregator::run_command(AppCommand::Aggregate { json }, config_path).await
        }
        Some(Commands::Show) => equity_aggregator::run_command(AppCommand::Show, config_path).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}
