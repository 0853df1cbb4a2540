//! The `trades` subcommand: list stored trades.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use poltrades_lib::db::TradeFilter;
use poltrades_lib::Db;

use crate::output::{print_trades, OutputFormat};

/// Arguments for the `trades` subcommand.
#[derive(Args)]
pub struct TradesArgs {
    /// SQLite database path
    #[arg(long, default_value = "poltrades.db")]
    pub db: PathBuf,

    /// Filter by entity (filer) id
    #[arg(long)]
    pub entity: Option<String>,

    /// Filter by ticker symbol
    #[arg(long)]
    pub ticker: Option<String>,

    /// Maximum rows to show
    #[arg(long, default_value = "50")]
    pub limit: i64,
}

pub fn run(args: &TradesArgs, format: &OutputFormat) -> Result<()> {
    let db = Db::open(&args.db)?;
    db.init()?;

    let rows = db.query_trades(&TradeFilter {
        entity: args.entity.clone(),
        ticker: args.ticker.clone(),
        limit: Some(args.limit),
    })?;

    if rows.is_empty() {
        eprintln!("No stored trades match.");
        return Ok(());
    }
    print_trades(&rows, format)
}
