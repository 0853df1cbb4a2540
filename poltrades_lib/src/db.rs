//! SQLite storage for disclosed trades and price history.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::normalize::is_valid_ticker;
use crate::pricing::{PriceField, PricePoint};
use crate::record::{TradeRecord, TradeType};

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("date parse error: {0}")]
    Date(#[from] chrono::ParseError),
}

const PRICE_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id TEXT NOT NULL,
    issuer_name TEXT NOT NULL DEFAULT '',
    ticker TEXT NOT NULL,
    published_date TEXT,
    trade_date TEXT,
    trade_type TEXT NOT NULL,
    amount_min REAL,
    amount_max REAL,
    min_roi REAL,
    avg_roi REAL,
    max_roi REAL,
    page INTEGER NOT NULL DEFAULT 1,
    UNIQUE(entity_id, ticker, trade_date, published_date)
);
CREATE INDEX IF NOT EXISTS idx_trades_ticker ON trades(ticker);
CREATE INDEX IF NOT EXISTS idx_trades_entity ON trades(entity_id);
CREATE INDEX IF NOT EXISTS idx_trades_trade_date ON trades(trade_date);

CREATE TABLE IF NOT EXISTS price_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    ts TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL DEFAULT 0,
    UNIQUE(symbol, ts)
);
CREATE INDEX IF NOT EXISTS idx_price_history_symbol ON price_history(symbol);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// A stored trade row with its persistence id.
#[derive(Debug, Clone)]
pub struct StoredTrade {
    pub id: i64,
    pub trade: TradeRecord,
}

/// Filter for listing stored trades.
#[derive(Debug, Default, Clone)]
pub struct TradeFilter {
    pub entity: Option<String>,
    pub ticker: Option<String>,
    pub limit: Option<i64>,
}

/// Per-symbol row used by the pair matcher.
#[derive(Debug, Clone)]
pub struct SymbolTradeRow {
    pub id: i64,
    pub trade_type: TradeType,
    pub trade_date: Option<NaiveDate>,
    pub published_date: Option<NaiveDate>,
}

/// Row used by the per-trade ROI pass.
#[derive(Debug, Clone)]
pub struct RoiTradeRow {
    pub id: i64,
    pub ticker: String,
    pub trade_date: Option<NaiveDate>,
    pub published_date: Option<NaiveDate>,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<(), DbError> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(SCHEMA)?;
            self.conn.pragma_update(None, "user_version", 1)?;
        }

        Ok(())
    }

    /// Idempotent single-record upsert.
    ///
    /// Identity is `(entity_id, ticker, trade_date, published_date)`. On
    /// conflict the disclosed fields are refreshed and the ROI columns are
    /// left alone; those belong to the reconciliation pass. SQLite treats
    /// NULL as distinct in UNIQUE constraints, so rows whose dates failed
    /// to parse are not deduplicated.
    pub fn upsert_trade(&self, record: &TradeRecord) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO trades (
                entity_id, issuer_name, ticker, published_date, trade_date,
                trade_type, amount_min, amount_max, page
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(entity_id, ticker, trade_date, published_date) DO UPDATE SET
               issuer_name = excluded.issuer_name,
               trade_type = excluded.trade_type,
               amount_min = excluded.amount_min,
               amount_max = excluded.amount_max,
               page = excluded.page",
            params![
                record.entity_id,
                record.issuer_name,
                record.issuer_ticker,
                record.published_date.map(|d| d.to_string()),
                record.trade_date.map(|d| d.to_string()),
                record.trade_type.as_str(),
                record.amount_min,
                record.amount_max,
                record.page_index,
            ],
        )?;
        Ok(())
    }

    /// Upsert a batch one record at a time. Each write commits on its own;
    /// a failed write is logged and skipped, the rest of the batch goes
    /// through. Returns `(stored, failed)`.
    pub fn store_batch(&self, records: &[TradeRecord]) -> (usize, usize) {
        let mut stored = 0;
        let mut failed = 0;
        for record in records {
            match self.upsert_trade(record) {
                Ok(()) => stored += 1,
                Err(err) => {
                    tracing::warn!(
                        "failed to store trade for {} / {}: {}",
                        record.entity_id,
                        record.issuer_ticker,
                        err
                    );
                    failed += 1;
                }
            }
        }
        (stored, failed)
    }

    pub fn trade_count(&self) -> Result<i64, DbError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Latest known trade date, optionally restricted to one entity. Dates
    /// are stored ISO so MAX sorts correctly as text.
    pub fn max_trade_date(&self, entity: Option<&str>) -> Result<Option<NaiveDate>, DbError> {
        let raw: Option<String> = match entity {
            Some(entity) => self.conn.query_row(
                "SELECT MAX(trade_date) FROM trades WHERE entity_id = ?1",
                params![entity],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT MAX(trade_date) FROM trades", [], |row| row.get(0))?,
        };
        Ok(match raw {
            Some(s) => Some(NaiveDate::parse_from_str(&s, "%Y-%m-%d")?),
            None => None,
        })
    }

    /// Distinct tickers that pass the validity filter. Stored rows should
    /// already be filtered, but the heuristic may tighten between runs.
    pub fn distinct_valid_tickers(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT ticker FROM trades
             WHERE ticker IS NOT NULL AND ticker != ''
             ORDER BY ticker",
        )?;
        let tickers = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tickers
            .into_iter()
            .filter(|t| is_valid_ticker(t))
            .collect())
    }

    /// All trades for one symbol, ordered by trade date ascending with the
    /// row id as the stable tie-break. Rows without a parsed trade date
    /// sort first; the pair matcher discards them at price resolution.
    pub fn trades_for_symbol(&self, symbol: &str) -> Result<Vec<SymbolTradeRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trade_type, trade_date, published_date FROM trades
             WHERE ticker = ?1
             ORDER BY trade_date ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![symbol], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, trade_type, trade_date, published_date) in rows {
            out.push(SymbolTradeRow {
                id,
                trade_type: TradeType::from_cell(&trade_type),
                trade_date: parse_stored_date(trade_date)?,
                published_date: parse_stored_date(published_date)?,
            });
        }
        Ok(out)
    }

    /// Every stored trade with the fields the per-trade ROI pass needs.
    pub fn all_trades_for_roi(&self) -> Result<Vec<RoiTradeRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticker, trade_date, published_date, amount_min, amount_max
             FROM trades ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, ticker, trade_date, published_date, amount_min, amount_max) in rows {
            out.push(RoiTradeRow {
                id,
                ticker,
                trade_date: parse_stored_date(trade_date)?,
                published_date: parse_stored_date(published_date)?,
                amount_min,
                amount_max,
            });
        }
        Ok(out)
    }

    /// Write the symbol-level ROI aggregate onto every row of that ticker.
    pub fn update_symbol_roi(
        &self,
        symbol: &str,
        min: f64,
        avg: f64,
        max: f64,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE trades SET min_roi = ?1, avg_roi = ?2, max_roi = ?3 WHERE ticker = ?4",
            params![min, avg, max, symbol],
        )?;
        Ok(())
    }

    /// Write a per-trade ROI range by row id. `None` values are stored as
    /// NULL, never as zero.
    pub fn update_trade_roi(
        &self,
        id: i64,
        min_roi: Option<f64>,
        avg_roi: Option<f64>,
        max_roi: Option<f64>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE trades SET min_roi = ?1, avg_roi = ?2, max_roi = ?3 WHERE id = ?4",
            params![min_roi, avg_roi, max_roi, id],
        )?;
        Ok(())
    }

    /// Insert-or-ignore one price sample. Samples are immutable once
    /// written. Returns whether a new row was inserted.
    pub fn insert_price_point(&self, point: &PricePoint) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT INTO price_history (symbol, ts, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(symbol, ts) DO NOTHING",
            params![
                point.symbol,
                point.ts.format(PRICE_TS_FORMAT).to_string(),
                point.open,
                point.high,
                point.low,
                point.close,
                point.volume,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn price_count(&self, symbol: &str) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM price_history WHERE symbol = ?1",
            params![symbol],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// The stored sample with minimum absolute time distance to the target
    /// date. Ties break on the earlier timestamp, then the lower row id, so
    /// a given store always resolves the same sample.
    pub fn nearest_price(
        &self,
        symbol: &str,
        target: NaiveDate,
        field: PriceField,
    ) -> Result<Option<(f64, NaiveDateTime)>, DbError> {
        let row: Option<(String, f64, f64, f64, f64)> = self
            .conn
            .query_row(
                "SELECT ts, open, high, low, close FROM price_history
                 WHERE symbol = ?1
                 ORDER BY ABS(julianday(ts) - julianday(?2)) ASC, ts ASC, id ASC
                 LIMIT 1",
                params![symbol, target.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((ts, open, high, low, close)) = row else {
            return Ok(None);
        };
        let ts = NaiveDateTime::parse_from_str(&ts, PRICE_TS_FORMAT)?;
        let price = match field {
            PriceField::Open => open,
            PriceField::High => high,
            PriceField::Low => low,
            PriceField::Close => close,
        };
        Ok(Some((price, ts)))
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>, DbError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Stored trades for CLI listing, newest trade date first.
    pub fn query_trades(&self, filter: &TradeFilter) -> Result<Vec<StoredTrade>, DbError> {
        let mut sql = String::from(
            "SELECT id, entity_id, issuer_name, ticker, published_date, trade_date,
                    trade_type, amount_min, amount_max, min_roi, avg_roi, max_roi, page
             FROM trades WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(ref entity) = filter.entity {
            sql.push_str(" AND entity_id = ?");
            args.push(Box::new(entity.clone()));
        }
        if let Some(ref ticker) = filter.ticker {
            sql.push_str(" AND ticker = ?");
            args.push(Box::new(ticker.clone()));
        }
        sql.push_str(" ORDER BY trade_date DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit));
        }

        let arg_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(arg_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<f64>>(7)?,
                    row.get::<_, Option<f64>>(8)?,
                    row.get::<_, Option<f64>>(9)?,
                    row.get::<_, Option<f64>>(10)?,
                    row.get::<_, Option<f64>>(11)?,
                    row.get::<_, u32>(12)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (
            id,
            entity_id,
            issuer_name,
            ticker,
            published_date,
            trade_date,
            trade_type,
            amount_min,
            amount_max,
            min_roi,
            avg_roi,
            max_roi,
            page,
        ) in rows
        {
            out.push(StoredTrade {
                id,
                trade: TradeRecord {
                    entity_id,
                    issuer_name,
                    issuer_ticker: ticker,
                    published_date: parse_stored_date(published_date)?,
                    trade_date: parse_stored_date(trade_date)?,
                    trade_type: TradeType::from_cell(&trade_type),
                    amount_min,
                    amount_max,
                    min_roi,
                    avg_roi,
                    max_roi,
                    page_index: page,
                },
            });
        }
        Ok(out)
    }
}

fn parse_stored_date(raw: Option<String>) -> Result<Option<NaiveDate>, DbError> {
    Ok(match raw {
        Some(s) => Some(NaiveDate::parse_from_str(&s, "%Y-%m-%d")?),
        None => None,
    })
}
