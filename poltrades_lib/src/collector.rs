//! Incremental, cursor-based collection of paginated trade listings.

use chrono::NaiveDate;

use poltrades_fetch::{FetchError, PageFetcher, MIN_ROW_CELLS};

use crate::normalize::{is_valid_ticker, parse_amount_range, parse_trade_date};
use crate::record::{TradeRecord, TradeType};

// Cell indices of the listing row contract (see poltrades_fetch).
const CELL_ISSUER: usize = 0;
const CELL_TICKER: usize = 1;
const CELL_PUBLISHED: usize = 2;
const CELL_TRADED: usize = 3;
const CELL_TYPE: usize = 5;
const CELL_SIZE: usize = 6;

/// Result of collecting one entity's listing.
#[derive(Debug, Default)]
pub struct CollectedBatch {
    pub records: Vec<TradeRecord>,
    /// Rows dropped by the ticker validity filter.
    pub rejected: usize,
    pub pages_fetched: u32,
}

/// Walks an entity's listing pages, normalizes rows, and applies the
/// stopping rules.
///
/// Page fetches are sequential and awaited in order; the cutoff rule
/// depends on pages arriving in descending trade-date order, which is a
/// precondition of the upstream listing and is not re-verified here. If
/// the upstream ordering is violated the cutoff silently truncates valid
/// rows.
pub struct Collector<F> {
    fetcher: F,
    max_pages: u32,
}

impl<F: PageFetcher> Collector<F> {
    pub fn new(fetcher: F, max_pages: u32) -> Self {
        Self { fetcher, max_pages }
    }

    /// Collect one entity's trades.
    ///
    /// Stops on the first of: the fetcher signaling end of pages, a page
    /// with zero structurally-valid rows, the `max_pages` ceiling, or — in
    /// incremental runs — a row whose trade date is at or before `cutoff`.
    /// On cutoff the triggering row and everything after it is discarded;
    /// rows collected from earlier pages are kept. Full runs pass
    /// `cutoff = None`.
    pub async fn collect_entity(
        &self,
        entity_id: &str,
        cutoff: Option<NaiveDate>,
    ) -> Result<CollectedBatch, FetchError> {
        let mut batch = CollectedBatch::default();

        for page in 1..=self.max_pages {
            let Some(rows) = self.fetcher.fetch_page(entity_id, page).await? else {
                break;
            };
            batch.pages_fetched = page;

            let mut structurally_valid = 0usize;
            for row in &rows {
                if row.len() < MIN_ROW_CELLS {
                    continue;
                }
                structurally_valid += 1;

                let ticker = row[CELL_TICKER].trim();
                if !is_valid_ticker(ticker) {
                    batch.rejected += 1;
                    continue;
                }

                let trade_date = parse_date_cell(entity_id, &row[CELL_TRADED]);
                if let (Some(cutoff), Some(traded)) = (cutoff, trade_date) {
                    if traded <= cutoff {
                        tracing::info!(
                            "{}: reached cutoff {} on page {}, stopping",
                            entity_id,
                            cutoff,
                            page
                        );
                        return Ok(batch);
                    }
                }

                let (amount_min, amount_max) = parse_amount_range(&row[CELL_SIZE]);
                batch.records.push(TradeRecord {
                    entity_id: entity_id.to_string(),
                    issuer_name: row[CELL_ISSUER].trim().to_string(),
                    issuer_ticker: ticker.to_string(),
                    published_date: parse_date_cell(entity_id, &row[CELL_PUBLISHED]),
                    trade_date,
                    trade_type: TradeType::from_cell(&row[CELL_TYPE]),
                    amount_min,
                    amount_max,
                    min_roi: None,
                    avg_roi: None,
                    max_roi: None,
                    page_index: page,
                });
            }

            if structurally_valid == 0 {
                break;
            }
        }

        Ok(batch)
    }
}

/// Parse a date cell, logging and degrading to `None` on failure. A bad
/// date never drops the record or fails the batch.
fn parse_date_cell(entity_id: &str, cell: &str) -> Option<NaiveDate> {
    match parse_trade_date(cell) {
        Ok(date) => Some(date),
        Err(err) => {
            tracing::warn!("{}: {}", entity_id, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poltrades_fetch::RawRow;

    /// Canned page sequences standing in for the rendering layer.
    struct CannedFetcher {
        pages: Vec<Vec<RawRow>>,
    }

    #[async_trait::async_trait]
    impl PageFetcher for CannedFetcher {
        async fn fetch_page(
            &self,
            _entity: &str,
            page: u32,
        ) -> Result<Option<Vec<RawRow>>, FetchError> {
            Ok(self.pages.get(page as usize - 1).cloned())
        }
    }

    fn row(ticker: &str, published: &str, traded: &str, tx_type: &str, size: &str) -> RawRow {
        vec![
            format!("{} Inc", ticker),
            ticker.to_string(),
            published.to_string(),
            traded.to_string(),
            "7".to_string(),
            tx_type.to_string(),
            size.to_string(),
        ]
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn cutoff_stops_mid_page_and_keeps_earlier_rows() {
        let fetcher = CannedFetcher {
            pages: vec![vec![
                row("AAPL", "5 Feb 2024", "1 Feb 2024", "buy", "1K-15K"),
                row("MSFT", "20 Jan 2024", "15 Jan 2024", "sell", "< 1K"),
                row("NVDA", "9 Jan 2024", "5 Jan 2024", "buy", "N/A"),
            ]],
        };
        let collector = Collector::new(fetcher, 10);
        let batch = collector
            .collect_entity("P000197", Some(date(2024, 1, 10)))
            .await
            .unwrap();

        let tickers: Vec<_> = batch
            .records
            .iter()
            .map(|r| r.issuer_ticker.as_str())
            .collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn full_mode_ignores_cutoff_and_walks_pages() {
        let fetcher = CannedFetcher {
            pages: vec![
                vec![row("AAPL", "5 Feb 2024", "1 Feb 2024", "buy", "1K-15K")],
                vec![row("MSFT", "20 Jan 2024", "15 Jan 2024", "sell", "< 1K")],
            ],
        };
        let collector = Collector::new(fetcher, 10);
        let batch = collector.collect_entity("P000197", None).await.unwrap();

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.pages_fetched, 2);
        assert_eq!(batch.records[0].page_index, 1);
        assert_eq!(batch.records[1].page_index, 2);
    }

    #[tokio::test]
    async fn invalid_tickers_are_rejected_and_tallied() {
        let fetcher = CannedFetcher {
            pages: vec![vec![
                row("AAPL", "5 Feb 2024", "1 Feb 2024", "buy", "1K-15K"),
                row("BOND2025", "4 Feb 2024", "31 Jan 2024", "buy", "1K-15K"),
                row("N/A", "3 Feb 2024", "30 Jan 2024", "sell", "N/A"),
            ]],
        };
        let collector = Collector::new(fetcher, 10);
        let batch = collector.collect_entity("P000197", None).await.unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.rejected, 2);
    }

    #[tokio::test]
    async fn page_without_structural_rows_halts() {
        let short_row: RawRow = vec!["header".to_string(), "cells".to_string()];
        let fetcher = CannedFetcher {
            pages: vec![
                vec![row("AAPL", "5 Feb 2024", "1 Feb 2024", "buy", "1K-15K")],
                vec![short_row],
                vec![row("MSFT", "20 Jan 2024", "15 Jan 2024", "sell", "< 1K")],
            ],
        };
        let collector = Collector::new(fetcher, 10);
        let batch = collector.collect_entity("P000197", None).await.unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.pages_fetched, 2);
    }

    #[tokio::test]
    async fn a_page_of_rejected_tickers_does_not_halt() {
        let fetcher = CannedFetcher {
            pages: vec![
                vec![row("US Treasury Bond", "5 Feb 2024", "1 Feb 2024", "buy", "N/A")],
                vec![row("MSFT", "20 Jan 2024", "15 Jan 2024", "sell", "< 1K")],
            ],
        };
        let collector = Collector::new(fetcher, 10);
        let batch = collector.collect_entity("P000197", None).await.unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].issuer_ticker, "MSFT");
        assert_eq!(batch.rejected, 1);
    }

    #[tokio::test]
    async fn max_pages_ceiling_is_honored() {
        let page = vec![row("AAPL", "5 Feb 2024", "1 Feb 2024", "buy", "1K-15K")];
        let fetcher = CannedFetcher {
            pages: vec![page.clone(), page.clone(), page.clone(), page],
        };
        let collector = Collector::new(fetcher, 2);
        let batch = collector.collect_entity("P000197", None).await.unwrap();

        assert_eq!(batch.pages_fetched, 2);
        assert_eq!(batch.records.len(), 2);
    }

    #[tokio::test]
    async fn malformed_date_keeps_record_with_absent_field() {
        let fetcher = CannedFetcher {
            pages: vec![vec![row("AAPL", "soon", "1 Feb 2024", "buy", "1K-15K")]],
        };
        let collector = Collector::new(fetcher, 10);
        let batch = collector.collect_entity("P000197", None).await.unwrap();

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].published_date, None);
        assert_eq!(batch.records[0].trade_date, Some(date(2024, 2, 1)));
        assert_eq!(batch.records[0].amount_min, Some(1_000.0));
        assert_eq!(batch.records[0].amount_max, Some(15_000.0));
    }
}
