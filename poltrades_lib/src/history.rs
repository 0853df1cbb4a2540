//! Price-history population from Yahoo Finance daily bars.
//!
//! Feeds the `price_history` table that the price resolver reads. Fetching
//! is per symbol; results are memoized for the run so repeated requests
//! (aliases, retries) do not hit the API twice.

use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

use crate::pricing::PricePoint;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error(transparent)]
    Upstream(#[from] yahoo_finance_api::YahooError),
}

/// Convert chrono::NaiveDate to time::OffsetDateTime at UTC midnight.
fn date_to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime, HistoryError> {
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| HistoryError::InvalidDate(date.to_string()))?;
    OffsetDateTime::from_unix_timestamp(datetime.and_utc().timestamp())
        .map_err(|_| HistoryError::InvalidDate(date.to_string()))
}

fn timestamp_to_datetime(ts: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp(ts, 0).map(|dt| dt.naive_utc())
}

/// Map a disclosed ticker onto the quote API's symbol alphabet: share
/// classes use a dash there, e.g. `BRK/B` -> `BRK-B`.
pub fn normalize_symbol(ticker: &str) -> String {
    ticker.trim().replace('/', "-")
}

/// Yahoo Finance client with per-run memoization of fetched bars.
pub struct HistoryClient {
    connector: yahoo_finance_api::YahooConnector,
    cache: Arc<DashMap<String, Vec<PricePoint>>>,
}

impl HistoryClient {
    pub fn new() -> Result<Self, HistoryError> {
        Ok(Self {
            connector: yahoo_finance_api::YahooConnector::new()?,
            cache: Arc::new(DashMap::new()),
        })
    }

    /// Daily bars for one symbol over `[start, end]`, keyed back to the
    /// ticker as stored (the quote symbol normalization stays internal).
    pub async fn daily_bars(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, HistoryError> {
        if let Some(cached) = self.cache.get(ticker) {
            return Ok(cached.clone());
        }

        let symbol = normalize_symbol(ticker);
        let response = self
            .connector
            .get_quote_history(
                &symbol,
                date_to_offset_datetime(start)?,
                date_to_offset_datetime(end)?,
            )
            .await?;

        let mut points = Vec::new();
        for quote in response.quotes()? {
            let Some(ts) = timestamp_to_datetime(quote.timestamp as i64) else {
                tracing::warn!("{}: skipping bar with bad timestamp", ticker);
                continue;
            };
            points.push(PricePoint {
                symbol: ticker.to_string(),
                ts,
                open: quote.open,
                high: quote.high,
                low: quote.low,
                close: quote.close,
                volume: quote.volume as i64,
            });
        }

        self.cache.insert(ticker.to_string(), points.clone());
        Ok(points)
    }

    /// Number of memoized symbols (for testing).
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}
