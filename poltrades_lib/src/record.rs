//! Typed trade record produced by the collector.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Disclosed transaction direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Buy,
    Sell,
    Unknown,
}

impl TradeType {
    /// Case-insensitive read of the listing's type cell. Anything that is
    /// not a buy or sell (exchanges, receipts) maps to `Unknown`.
    pub fn from_cell(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "buy" => Self::Buy,
            "sell" => Self::Sell,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Unknown => "unknown",
        }
    }
}

/// One disclosed trade, normalized from a raw listing row.
///
/// ROI fields are `None` at creation and populated only by the
/// reconciliation pass. Upsert identity is
/// `(entity_id, issuer_ticker, trade_date, published_date)`.
/// `published_date >= trade_date` is expected of the source but not
/// enforced here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entity_id: String,
    pub issuer_name: String,
    pub issuer_ticker: String,
    pub published_date: Option<NaiveDate>,
    pub trade_date: Option<NaiveDate>,
    pub trade_type: TradeType,
    pub amount_min: Option<f64>,
    pub amount_max: Option<f64>,
    pub min_roi: Option<f64>,
    pub avg_roi: Option<f64>,
    pub max_roi: Option<f64>,
    pub page_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_type_from_cell() {
        assert_eq!(TradeType::from_cell("buy"), TradeType::Buy);
        assert_eq!(TradeType::from_cell(" SELL "), TradeType::Sell);
        assert_eq!(TradeType::from_cell("exchange"), TradeType::Unknown);
        assert_eq!(TradeType::from_cell(""), TradeType::Unknown);
    }
}
