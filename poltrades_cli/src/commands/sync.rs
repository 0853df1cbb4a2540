//! The `sync` subcommand: collect trade listings into SQLite.
//!
//! Entities fan out across bounded tokio tasks, each with its own fetcher
//! session; one receiver loop owns the DB connection and commits records
//! one at a time. A single entity's failure never aborts the run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;

use poltrades_lib::{CollectedBatch, Collector, Config, Db, FetchError, HttpFetcher, Mode};

/// Arguments for the `sync` subcommand.
#[derive(Args)]
pub struct SyncArgs {
    /// TOML config file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Force a full run (re-walk every page)
    #[arg(long)]
    pub full: bool,

    /// Force an incremental run (stop at the cutoff date)
    #[arg(long, conflicts_with = "full")]
    pub incremental: bool,

    /// Override the incremental cutoff date (YYYY-MM-DD, trade date)
    #[arg(long)]
    pub since: Option<String>,

    /// Page ceiling per entity
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Listing site base URL (defaults to the live site)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Listing IDs or URLs; overrides the config's entity list
    pub entities: Vec<String>,
}

struct EntityResult {
    entity: String,
    result: Result<CollectedBatch, FetchError>,
}

const CONCURRENCY: usize = 3;

pub async fn run(args: &SyncArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => Some(Config::load(path)?),
        None => None,
    };

    let entities: Vec<String> = if !args.entities.is_empty() {
        args.entities.clone()
    } else {
        config.as_ref().map(|c| c.entities.clone()).unwrap_or_default()
    };
    if entities.is_empty() {
        bail!("no entities given: pass listing IDs or a --config with an entity list");
    }

    let db_path = args
        .db
        .clone()
        .or_else(|| config.as_ref().map(|c| PathBuf::from(&c.db_path)))
        .unwrap_or_else(|| PathBuf::from("poltrades.db"));
    let max_pages = args
        .max_pages
        .or_else(|| config.as_ref().map(|c| c.max_pages))
        .unwrap_or(10);
    let base_url = args
        .base_url
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.base_url.clone()))
        .or_else(|| std::env::var("POLTRADES_BASE_URL").ok());

    let mut mode = if args.full {
        Mode::Full
    } else if args.incremental {
        Mode::Incremental
    } else {
        config.as_ref().map(|c| c.mode).unwrap_or_default()
    };

    let db = Db::open(&db_path)?;
    db.init()?;

    let mut cutoff: Option<NaiveDate> = None;
    if mode == Mode::Incremental {
        cutoff = match &args.since {
            Some(since) => Some(NaiveDate::parse_from_str(since, "%Y-%m-%d")?),
            None => config.as_ref().and_then(|c| c.cutoff_date),
        };
        if cutoff.is_none() {
            cutoff = db.max_trade_date(None)?;
        }
        if cutoff.is_none() {
            eprintln!("No cutoff date resolvable from flags, config, or store; running full.");
            mode = Mode::Full;
        }
    }

    match (mode, cutoff) {
        (Mode::Incremental, Some(date)) => eprintln!(
            "Incremental sync into {} (skipping trades on or before {})",
            db_path.display(),
            date
        ),
        _ => eprintln!("Full sync into {}", db_path.display()),
    }

    let pb = ProgressBar::new(entities.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("static template"),
    );
    pb.set_message("collecting entities...");

    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let (tx, mut rx) = mpsc::channel::<EntityResult>(CONCURRENCY * 2);
    let mut join_set = JoinSet::new();

    for entity in entities {
        let sem = Arc::clone(&semaphore);
        let sender = tx.clone();
        let base_url = base_url.clone();

        join_set.spawn(async move {
            let _permit = sem.acquire().await.expect("semaphore closed");
            // Jittered start so workers do not hammer the site in lockstep.
            let delay_ms = rand::thread_rng().gen_range(100..400);
            sleep(Duration::from_millis(delay_ms)).await;

            let result = collect_one(&entity, base_url.as_deref(), max_pages, cutoff).await;
            let _ = sender.send(EntityResult { entity, result }).await;
        });
    }
    drop(tx);

    let mut ingested = 0usize;
    let mut rejected = 0usize;
    let mut write_failures = 0usize;
    let mut halted = 0usize;

    while let Some(EntityResult { entity, result }) = rx.recv().await {
        match result {
            Ok(batch) => {
                let (stored, failed) = db.store_batch(&batch.records);
                ingested += stored;
                write_failures += failed;
                rejected += batch.rejected;
                pb.println(format!(
                    "{}: {} rows over {} pages ({} rejected)",
                    entity,
                    batch.records.len(),
                    batch.pages_fetched,
                    batch.rejected
                ));
            }
            Err(err) => {
                halted += 1;
                pb.println(format!("{}: collection halted: {}", entity, err));
            }
        }
        pb.inc(1);
    }
    while join_set.join_next().await.is_some() {}
    pb.finish_and_clear();

    db.set_meta(
        "last_sync_completed_at",
        &chrono::Utc::now().to_rfc3339(),
    )?;

    eprintln!(
        "Sync complete: {} ingested, {} rejected, {} write failures, {} entities halted",
        ingested, rejected, write_failures, halted
    );
    Ok(())
}

async fn collect_one(
    entity: &str,
    base_url: Option<&str>,
    max_pages: u32,
    cutoff: Option<NaiveDate>,
) -> Result<CollectedBatch, FetchError> {
    let fetcher = match base_url {
        Some(url) => HttpFetcher::with_base_url(url)?,
        None => HttpFetcher::new()?,
    };
    Collector::new(fetcher, max_pages)
        .collect_entity(entity, cutoff)
        .await
}
