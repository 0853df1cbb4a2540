//! Buy/sell pair matching and ROI aggregation.
//!
//! Two reconciliation modes, both run after collection and independent of
//! it. Pair mode matches a symbol's buys to subsequent sells and writes a
//! symbol-level aggregate. Per-trade mode computes a worst/best/average
//! range for every row from its disclosed dollar range.

use crate::db::{Db, DbError};
use crate::pricing::{PriceField, PriceResolver};
use crate::record::TradeType;

/// Worst/best/average ROI for a single trade. `None` means a required
/// input was missing; a missing input never becomes a fabricated number.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoiRange {
    pub worst: Option<f64>,
    pub best: Option<f64>,
    pub avg: Option<f64>,
}

/// Symbol-level aggregate over resolved pair ROIs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolRoi {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

/// Counters reported back to the user after a reconciliation pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileSummary {
    pub processed: usize,
    pub computed: usize,
    pub skipped: usize,
    pub pairs_matched: usize,
}

/// Greedy, non-backtracking buy/sell pair matcher.
///
/// Single left-to-right cursor: a `Buy` immediately followed by a `Sell`
/// emits a pair and skips both; anything else advances by one. Unmatched
/// records are skipped, not buffered, so `Buy, Buy, Sell` matches only the
/// second pair. Interleaved sequences such as `Buy, Buy, Sell, Sell` have
/// ambiguous intent in the source data; the greedy behavior is deliberate
/// and must not be replaced by a smarter matching strategy.
pub fn match_pairs(types: &[TradeType]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i + 1 < types.len() {
        if types[i] == TradeType::Buy && types[i + 1] == TradeType::Sell {
            pairs.push((i, i + 1));
            i += 2;
        } else {
            i += 1;
        }
    }
    pairs
}

/// Realized ROI of one matched pair, in percent.
pub fn pair_roi(buy_price: f64, sell_price: f64) -> f64 {
    (sell_price - buy_price) / buy_price * 100.0
}

/// Min/avg/max over resolved pair ROIs; `None` when nothing resolved, so a
/// symbol with no usable pairs is never written as zero.
pub fn aggregate(rois: &[f64]) -> Option<SymbolRoi> {
    if rois.is_empty() {
        return None;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &roi in rois {
        min = min.min(roi);
        max = max.max(roi);
        sum += roi;
    }
    Some(SymbolRoi {
        min: round2(min),
        avg: round2(sum / rois.len() as f64),
        max: round2(max),
    })
}

/// Per-trade ROI range from a disclosed dollar range and resolved prices.
///
/// With both amounts present, worst case takes `amount_max` as the cost
/// basis and best case takes `amount_min`; a zero basis yields `None`
/// rather than dividing by it. Without a range, worst = best = avg =
/// single-price ROI from the buy/sell prices. Outputs are rounded to two
/// decimals after the average is taken.
pub fn roi_from_amounts(
    amount_min: Option<f64>,
    amount_max: Option<f64>,
    buy_price: Option<f64>,
    sell_price: Option<f64>,
) -> RoiRange {
    let range = match (amount_min, amount_max) {
        (Some(min), Some(max)) => {
            let worst = sell_price.and_then(|sp| basis_roi(sp, max));
            let best = sell_price.and_then(|sp| basis_roi(sp, min));
            let avg = match (worst, best) {
                (Some(w), Some(b)) => Some((w + b) / 2.0),
                _ => None,
            };
            RoiRange { worst, best, avg }
        }
        _ => {
            let single = match (buy_price, sell_price) {
                (Some(bp), Some(sp)) if bp != 0.0 => Some(pair_roi(bp, sp)),
                _ => None,
            };
            RoiRange {
                worst: single,
                best: single,
                avg: single,
            }
        }
    };
    RoiRange {
        worst: range.worst.map(round2),
        best: range.best.map(round2),
        avg: range.avg.map(round2),
    }
}

fn basis_roi(sell_price: f64, basis: f64) -> Option<f64> {
    if basis == 0.0 {
        None
    } else {
        Some((sell_price - basis) / basis * 100.0)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Runs the reconciliation passes against the store.
pub struct Reconciler<'a> {
    db: &'a Db,
    resolver: PriceResolver<'a>,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self {
            db,
            resolver: PriceResolver::new(db),
        }
    }

    pub fn with_field(db: &'a Db, field: PriceField) -> Self {
        Self {
            db,
            resolver: PriceResolver::with_field(db, field),
        }
    }

    /// Pair-mode reconciliation for one symbol.
    ///
    /// Buy price anchors on the buy's trade date; sell price anchors on the
    /// sell's published date. That asymmetry matches the source policy and
    /// is preserved, not corrected. Pairs with an unresolved price are
    /// discarded; if nothing resolves, stored ROI values are left
    /// untouched and `Ok(None)` is returned.
    pub fn reconcile_symbol(&self, symbol: &str) -> Result<Option<SymbolRoi>, DbError> {
        let rows = self.db.trades_for_symbol(symbol)?;
        let types: Vec<TradeType> = rows.iter().map(|r| r.trade_type).collect();

        let mut rois = Vec::new();
        for (buy_idx, sell_idx) in match_pairs(&types) {
            let buy = self
                .resolver
                .resolve_opt(symbol, rows[buy_idx].trade_date)?;
            let sell = self
                .resolver
                .resolve_opt(symbol, rows[sell_idx].published_date)?;
            if let (Some(bp), Some(sp)) = (buy, sell) {
                if bp != 0.0 {
                    rois.push(pair_roi(bp, sp));
                }
            }
        }

        match aggregate(&rois) {
            Some(agg) => {
                self.db.update_symbol_roi(symbol, agg.min, agg.avg, agg.max)?;
                Ok(Some(agg))
            }
            None => Ok(None),
        }
    }

    /// Pair-mode reconciliation over every distinct valid ticker. Symbols
    /// are processed one at a time; two workers must never reconcile the
    /// same symbol concurrently.
    pub fn reconcile_all_pairs(&self) -> Result<ReconcileSummary, DbError> {
        let mut summary = ReconcileSummary::default();
        for symbol in self.db.distinct_valid_tickers()? {
            summary.processed += 1;
            let rows = self.db.trades_for_symbol(&symbol)?;
            let types: Vec<TradeType> = rows.iter().map(|r| r.trade_type).collect();
            summary.pairs_matched += match_pairs(&types).len();
            match self.reconcile_symbol(&symbol)? {
                Some(_) => summary.computed += 1,
                None => summary.skipped += 1,
            }
        }
        Ok(summary)
    }

    /// Per-trade reconciliation over every stored row.
    ///
    /// `fallback_price` substitutes for either price when no sample
    /// resolves; it is a caller decision and defaults to nothing, in which
    /// case missing prices propagate to `None` ROI.
    pub fn reconcile_per_trade(
        &self,
        fallback_price: Option<f64>,
    ) -> Result<ReconcileSummary, DbError> {
        let mut summary = ReconcileSummary::default();
        for row in self.db.all_trades_for_roi()? {
            summary.processed += 1;
            let buy = self
                .resolver
                .resolve_opt(&row.ticker, row.trade_date)?
                .or(fallback_price);
            let sell = self
                .resolver
                .resolve_opt(&row.ticker, row.published_date)?
                .or(fallback_price);

            let roi = roi_from_amounts(row.amount_min, row.amount_max, buy, sell);
            self.db
                .update_trade_roi(row.id, roi.worst, roi.avg, roi.best)?;
            if roi.avg.is_some() || roi.worst.is_some() || roi.best.is_some() {
                summary.computed += 1;
            } else {
                summary.skipped += 1;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TradeFilter;
    use crate::pricing::PricePoint;
    use crate::record::TradeRecord;
    use chrono::NaiveDate;
    use TradeType::{Buy, Sell, Unknown};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn matcher_pairs_adjacent_buy_sell() {
        assert_eq!(
            match_pairs(&[Buy, Sell, Buy, Buy, Sell]),
            vec![(0, 1), (3, 4)]
        );
    }

    #[test]
    fn matcher_skips_leading_buy() {
        // Buy, Buy, Sell: only the second pair matches.
        assert_eq!(match_pairs(&[Buy, Buy, Sell]), vec![(1, 2)]);
    }

    #[test]
    fn matcher_is_greedy_not_backtracking() {
        assert_eq!(match_pairs(&[Buy, Buy, Sell, Sell]), vec![(1, 2)]);
        assert_eq!(match_pairs(&[Sell, Buy]), Vec::<(usize, usize)>::new());
        assert_eq!(match_pairs(&[Buy]), Vec::<(usize, usize)>::new());
    }

    #[test]
    fn matcher_ignores_unknown_types() {
        assert_eq!(match_pairs(&[Buy, Unknown, Sell]), Vec::<(usize, usize)>::new());
        assert_eq!(match_pairs(&[Unknown, Buy, Sell]), vec![(1, 2)]);
    }

    #[test]
    fn aggregate_empty_is_none_not_zero() {
        assert_eq!(aggregate(&[]), None);
    }

    #[test]
    fn aggregate_rounds_to_two_decimals() {
        let agg = aggregate(&[10.0, 20.0, 11.111]).unwrap();
        assert_eq!(agg.min, 10.0);
        assert_eq!(agg.max, 20.0);
        assert_eq!(agg.avg, 13.7);
    }

    #[test]
    fn roi_range_uses_amounts_as_cost_basis() {
        let roi = roi_from_amounts(Some(1_000.0), Some(15_000.0), None, Some(110.0));
        assert_eq!(roi.worst, Some(-99.27));
        assert_eq!(roi.best, Some(-89.0));
        assert_eq!(roi.avg, Some(-94.13));
    }

    #[test]
    fn roi_range_zero_basis_is_none() {
        // "< 1K" ranges carry a zero minimum; no best-case ROI exists.
        let roi = roi_from_amounts(Some(0.0), Some(1_000.0), None, Some(110.0));
        assert_eq!(roi.best, None);
        assert_eq!(roi.avg, None);
        assert!(roi.worst.is_some());
    }

    #[test]
    fn roi_range_without_amounts_is_single_price() {
        let roi = roi_from_amounts(None, None, Some(100.0), Some(110.0));
        assert_eq!(roi, RoiRange {
            worst: Some(10.0),
            best: Some(10.0),
            avg: Some(10.0),
        });
    }

    #[test]
    fn roi_range_missing_price_propagates_none() {
        let roi = roi_from_amounts(None, None, Some(100.0), None);
        assert_eq!(roi, RoiRange::default());
        let roi = roi_from_amounts(Some(1_000.0), Some(15_000.0), Some(100.0), None);
        assert_eq!(roi, RoiRange::default());
    }

    fn trade(
        ticker: &str,
        trade_type: TradeType,
        traded: NaiveDate,
        published: NaiveDate,
    ) -> TradeRecord {
        TradeRecord {
            entity_id: "P000197".to_string(),
            issuer_name: format!("{} Inc", ticker),
            issuer_ticker: ticker.to_string(),
            published_date: Some(published),
            trade_date: Some(traded),
            trade_type,
            amount_min: None,
            amount_max: None,
            min_roi: None,
            avg_roi: None,
            max_roi: None,
            page_index: 1,
        }
    }

    fn close_at(db: &Db, symbol: &str, on: NaiveDate, close: f64) {
        db.insert_price_point(&PricePoint {
            symbol: symbol.to_string(),
            ts: on.and_hms_opt(0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
        })
        .unwrap();
    }

    #[test]
    fn reconcile_symbol_writes_aggregate() {
        let db = Db::open_in_memory().unwrap();
        db.init().unwrap();
        db.upsert_trade(&trade("AAPL", Buy, date(2024, 1, 10), date(2024, 1, 12)))
            .unwrap();
        db.upsert_trade(&trade("AAPL", Sell, date(2024, 1, 20), date(2024, 1, 25)))
            .unwrap();
        // Buy resolves at the trade date, sell at the published date.
        close_at(&db, "AAPL", date(2024, 1, 10), 100.0);
        close_at(&db, "AAPL", date(2024, 1, 25), 110.0);

        let agg = Reconciler::new(&db).reconcile_symbol("AAPL").unwrap().unwrap();
        assert_eq!(agg, SymbolRoi { min: 10.0, avg: 10.0, max: 10.0 });

        let rows = db.query_trades(&TradeFilter::default()).unwrap();
        assert!(rows.iter().all(|r| r.trade.avg_roi == Some(10.0)));
    }

    #[test]
    fn reconcile_symbol_without_prices_leaves_roi_untouched() {
        let db = Db::open_in_memory().unwrap();
        db.init().unwrap();
        db.upsert_trade(&trade("MSFT", Buy, date(2024, 1, 10), date(2024, 1, 12)))
            .unwrap();
        db.upsert_trade(&trade("MSFT", Sell, date(2024, 1, 20), date(2024, 1, 25)))
            .unwrap();
        db.update_symbol_roi("MSFT", 1.0, 2.0, 3.0).unwrap();

        let agg = Reconciler::new(&db).reconcile_symbol("MSFT").unwrap();
        assert!(agg.is_none());

        let rows = db.query_trades(&TradeFilter::default()).unwrap();
        assert!(rows.iter().all(|r| r.trade.avg_roi == Some(2.0)));
    }

    #[test]
    fn reconcile_per_trade_with_fallback_price() {
        let db = Db::open_in_memory().unwrap();
        db.init().unwrap();
        let mut record = trade("AAPL", Buy, date(2024, 1, 10), date(2024, 1, 12));
        record.amount_min = Some(1_000.0);
        record.amount_max = Some(15_000.0);
        db.upsert_trade(&record).unwrap();

        // No samples stored: without a fallback everything stays None.
        let summary = Reconciler::new(&db).reconcile_per_trade(None).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.computed, 0);
        assert_eq!(summary.skipped, 1);

        let summary = Reconciler::new(&db)
            .reconcile_per_trade(Some(110.0))
            .unwrap();
        assert_eq!(summary.computed, 1);

        let rows = db.query_trades(&TradeFilter::default()).unwrap();
        assert_eq!(rows[0].trade.min_roi, Some(-99.27));
        assert_eq!(rows[0].trade.max_roi, Some(-89.0));
        assert_eq!(rows[0].trade.avg_roi, Some(-94.13));
    }
}
