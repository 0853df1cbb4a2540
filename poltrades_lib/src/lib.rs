//! Library layer for PolTrades: trade ingestion and ROI reconciliation.
//!
//! Wraps the `poltrades_fetch` page contract with field normalization, an
//! incremental page collector, a SQLite persistence adapter, nearest-date
//! price resolution, and buy/sell pair matching with ROI aggregation.

pub mod collector;
pub mod config;
pub mod db;
pub mod history;
pub mod normalize;
pub mod pricing;
pub mod record;
pub mod roi;

pub use poltrades_fetch;
pub use poltrades_fetch::{FetchError, HttpFetcher, PageFetcher, RawRow, MIN_ROW_CELLS};

pub use collector::{CollectedBatch, Collector};
pub use config::{Config, ConfigError, Mode};
pub use db::{Db, DbError, StoredTrade};
pub use history::{HistoryClient, HistoryError};
pub use normalize::{is_valid_ticker, parse_amount_range, parse_trade_date, ParseError};
pub use pricing::{PriceField, PricePoint, PriceResolver};
pub use record::{TradeRecord, TradeType};
pub use roi::{match_pairs, Reconciler, ReconcileSummary, RoiRange, SymbolRoi};
