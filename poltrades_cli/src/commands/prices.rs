//! The `prices` subcommand: populate price history for stored tickers.
//!
//! Fetches daily bars per distinct valid ticker with bounded concurrency
//! and jittered delays, funneling results to the single DB writer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;

use poltrades_lib::{Db, HistoryClient, HistoryError, PricePoint};

/// Arguments for the `prices` subcommand.
#[derive(Args)]
pub struct PricesArgs {
    /// SQLite database path
    #[arg(long, default_value = "poltrades.db")]
    pub db: PathBuf,

    /// First day of history to fetch (YYYY-MM-DD)
    #[arg(long, default_value = "2016-01-01")]
    pub start: String,

    /// Last day of history to fetch (defaults to today)
    #[arg(long)]
    pub end: Option<String>,
}

struct BarsResult {
    ticker: String,
    result: Result<Vec<PricePoint>, HistoryError>,
}

const CONCURRENCY: usize = 4;

pub async fn run(args: &PricesArgs) -> Result<()> {
    let start = NaiveDate::parse_from_str(&args.start, "%Y-%m-%d")?;
    let end = match &args.end {
        Some(end) => NaiveDate::parse_from_str(end, "%Y-%m-%d")?,
        None => chrono::Utc::now().date_naive(),
    };

    let db = Db::open(&args.db)?;
    db.init()?;

    let tickers = db.distinct_valid_tickers()?;
    if tickers.is_empty() {
        eprintln!("No tickers in the store; run `poltrades sync` first.");
        return Ok(());
    }
    eprintln!(
        "Fetching daily bars for {} tickers ({} to {})",
        tickers.len(),
        start,
        end
    );

    let client = Arc::new(HistoryClient::new()?);
    let pb = ProgressBar::new(tickers.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("static template"),
    );
    pb.set_message("fetching price history...");

    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let (tx, mut rx) = mpsc::channel::<BarsResult>(CONCURRENCY * 2);
    let mut join_set = JoinSet::new();

    for ticker in tickers {
        let sem = Arc::clone(&semaphore);
        let sender = tx.clone();
        let client = Arc::clone(&client);

        join_set.spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");
            let delay_ms = rand::thread_rng().gen_range(200..500);
            sleep(Duration::from_millis(delay_ms)).await;

            let result = client.daily_bars(&ticker, start, end).await;
            let _ = sender.send(BarsResult { ticker, result }).await;
        });
    }
    drop(tx);

    let mut inserted = 0usize;
    let mut duplicates = 0usize;
    let mut failed = 0usize;

    while let Some(BarsResult { ticker, result }) = rx.recv().await {
        match result {
            Ok(points) => {
                for point in &points {
                    match db.insert_price_point(point) {
                        Ok(true) => inserted += 1,
                        Ok(false) => duplicates += 1,
                        Err(err) => {
                            pb.println(format!("{}: failed to store bar: {}", ticker, err));
                            failed += 1;
                        }
                    }
                }
            }
            Err(err) => {
                pb.println(format!("{}: history fetch failed: {}", ticker, err));
                failed += 1;
            }
        }
        pb.inc(1);
    }
    while join_set.join_next().await.is_some() {}
    pb.finish_and_clear();

    eprintln!(
        "Price history complete: {} bars inserted, {} already present, {} failures",
        inserted, duplicates, failed
    );
    Ok(())
}
