//! The `roi` subcommand: reconcile ROI for stored trades.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};

use poltrades_lib::{Db, PriceField, Reconciler};

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RoiMode {
    /// Match buy/sell pairs per symbol and write symbol-level aggregates
    Pairs,
    /// Compute a worst/best/average range for every stored row
    PerTrade,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PriceFieldArg {
    Open,
    High,
    Low,
    Close,
}

impl From<PriceFieldArg> for PriceField {
    fn from(arg: PriceFieldArg) -> Self {
        match arg {
            PriceFieldArg::Open => PriceField::Open,
            PriceFieldArg::High => PriceField::High,
            PriceFieldArg::Low => PriceField::Low,
            PriceFieldArg::Close => PriceField::Close,
        }
    }
}

/// Arguments for the `roi` subcommand.
#[derive(Args)]
pub struct RoiArgs {
    /// SQLite database path
    #[arg(long, default_value = "poltrades.db")]
    pub db: PathBuf,

    #[arg(long, value_enum, default_value_t = RoiMode::Pairs)]
    pub mode: RoiMode,

    /// Substitute price when no sample resolves (per-trade mode only).
    /// Without it, missing prices leave the ROI absent.
    #[arg(long)]
    pub fallback_price: Option<f64>,

    /// Which bar field to read prices from
    #[arg(long, value_enum, default_value_t = PriceFieldArg::Close)]
    pub price_field: PriceFieldArg,
}

pub fn run(args: &RoiArgs) -> Result<()> {
    let db = Db::open(&args.db)?;
    db.init()?;

    let reconciler = Reconciler::with_field(&db, args.price_field.into());
    // Symbols are reconciled one at a time; pair-mode writes must not race
    // on the same symbol.
    let summary = match args.mode {
        RoiMode::Pairs => reconciler.reconcile_all_pairs()?,
        RoiMode::PerTrade => reconciler.reconcile_per_trade(args.fallback_price)?,
    };

    match args.mode {
        RoiMode::Pairs => eprintln!(
            "ROI pairs: {} symbols, {} pairs matched, {} aggregates written, {} skipped (nothing resolvable)",
            summary.processed, summary.pairs_matched, summary.computed, summary.skipped
        ),
        RoiMode::PerTrade => eprintln!(
            "ROI per trade: {} rows, {} computed, {} left absent",
            summary.processed, summary.computed, summary.skipped
        ),
    }
    Ok(())
}
