//! Nearest-in-time price lookup against the price history store.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::{Db, DbError};

/// One observed price sample. Owned by the price-history store; the core
/// only reads these back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    pub ts: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Which sample field a lookup returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceField {
    Open,
    High,
    Low,
    #[default]
    Close,
}

/// Resolves a symbol's price at a target date from stored samples.
///
/// The store holds daily bars, so the result is inherently an
/// approximation: the sample with minimum absolute time distance to the
/// target, ties broken by the earlier timestamp (then row id). Callers must
/// treat the returned price as best available, not exact. When a caller
/// wants a substitute for missing samples it supplies its own fallback;
/// nothing is hard-coded here.
pub struct PriceResolver<'a> {
    db: &'a Db,
    field: PriceField,
}

impl<'a> PriceResolver<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self {
            db,
            field: PriceField::default(),
        }
    }

    pub fn with_field(db: &'a Db, field: PriceField) -> Self {
        Self { db, field }
    }

    /// Price and sample timestamp nearest to `target`, or `None` when the
    /// symbol has no samples.
    pub fn resolve(
        &self,
        symbol: &str,
        target: NaiveDate,
    ) -> Result<Option<(f64, NaiveDateTime)>, DbError> {
        self.db.nearest_price(symbol, target, self.field)
    }

    /// Like [`resolve`](Self::resolve) but for records whose date may be
    /// absent; a missing date resolves to `None` rather than failing.
    pub fn resolve_opt(
        &self,
        symbol: &str,
        target: Option<NaiveDate>,
    ) -> Result<Option<f64>, DbError> {
        match target {
            Some(date) => Ok(self.resolve(symbol, date)?.map(|(price, _)| price)),
            None => Ok(None),
        }
    }
}
