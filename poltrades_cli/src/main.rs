mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "poltrades")]
#[command(about = "Ingest disclosed politician trades and reconcile ROI against price history")]
struct Cli {
    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect trade listings into the local store (full or incremental)
    Sync(commands::sync::SyncArgs),
    /// Populate price history for every stored ticker
    Prices(commands::prices::PricesArgs),
    /// Reconcile ROI for stored trades
    Roi(commands::roi::RoiArgs),
    /// List stored trades
    Trades(commands::trades::TradesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("poltrades=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    match &cli.command {
        Commands::Sync(args) => commands::sync::run(args).await?,
        Commands::Prices(args) => commands::prices::run(args).await?,
        Commands::Roi(args) => commands::roi::run(args)?,
        Commands::Trades(args) => commands::trades::run(args, &format)?,
    }

    Ok(())
}
