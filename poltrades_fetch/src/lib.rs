//! Page-fetch layer for politician trade listings.
//!
//! The core pipeline never talks to the web directly; it consumes ordered
//! rows of raw cell strings through the [`PageFetcher`] trait. This crate
//! defines that contract and ships [`HttpFetcher`], an implementation that
//! scrapes the public listing pages.

mod client;
mod error;
mod user_agent;

pub use client::HttpFetcher;
pub use error::FetchError;

/// One listing row: the cell texts of a trade table row, in column order.
///
/// Layout (indices are part of the contract):
/// 0 issuer name, 1 ticker, 2 published date, 3 trade date,
/// 4 reporting gap, 5 trade type, 6 size range.
pub type RawRow = Vec<String>;

/// Minimum cell count for a row to be structurally valid. Rows with fewer
/// cells are rendering artifacts (headers, spacers) and carry no trade.
pub const MIN_ROW_CELLS: usize = 7;

/// Supplies one page of an entity's trade listing at a time.
///
/// `Ok(None)` signals end of pages: the trade table is absent from the
/// rendered page. Rows must be returned in the order the page renders them
/// (descending trade date on the live site); the collector's cutoff rule
/// depends on that ordering.
#[async_trait::async_trait]
pub trait PageFetcher {
    async fn fetch_page(&self, entity: &str, page: u32)
        -> Result<Option<Vec<RawRow>>, FetchError>;
}
