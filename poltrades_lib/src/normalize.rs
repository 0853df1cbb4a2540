//! Field normalization for raw listing cells: dates, tickers, and disclosed
//! dollar ranges.

use chrono::NaiveDate;
use regex::Regex;

/// Listing date format, e.g. `13 Sep 2023`.
pub const DATE_FORMAT: &str = "%d %b %Y";

/// A date cell that could not be parsed. Callers log it and treat the
/// record's date as absent; a bad date never fails the batch.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unparseable date: {text:?}")]
pub struct ParseError {
    pub text: String,
}

/// Parse a listing date cell. The site sometimes renders the non-standard
/// month abbreviation `Sept`; we retry with `Sep` before giving up.
pub fn parse_trade_date(text: &str) -> Result<NaiveDate, ParseError> {
    let trimmed = text.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(&trimmed.replace("Sept", "Sep"), DATE_FORMAT))
        .map_err(|_| ParseError {
            text: text.to_string(),
        })
}

/// Heuristic allow/deny filter for ticker cells, not a full symbol check.
///
/// Rejects blanks and `n/a`/`none`/`null` placeholders, anything mentioning
/// `state` or `bond` (municipal instruments misfiled as tickers), and
/// strings longer than 12 characters.
pub fn is_valid_ticker(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    !t.is_empty()
        && !matches!(t.as_str(), "n/a" | "none" | "null")
        && !t.contains("state")
        && !t.contains("bond")
        && t.len() <= 12
}

/// Convert a disclosed size cell into a numeric `(min, max)` dollar range.
///
/// Accepts the open-ended form `< 1K` (min is zero), and closed ranges like
/// `500K–1M` with a hyphen, en dash, or em dash separator. `K` multiplies
/// by 1,000 and `M` by 1,000,000. Empty cells, `N/A`, and any other shape
/// soft-fail to `(None, None)`; this function never errors.
pub fn parse_amount_range(text: &str) -> (Option<f64>, Option<f64>) {
    let s = text.trim().to_uppercase();
    if s.is_empty() || s == "N/A" {
        return (None, None);
    }

    if let Some(rest) = s.strip_prefix('<') {
        let open = Regex::new(r"^\s*([\d.]+)([KM])").expect("static regex");
        if let Some(cap) = open.captures(rest) {
            if let Ok(num) = cap[1].parse::<f64>() {
                return (Some(0.0), Some(num * multiplier(&cap[2])));
            }
        }
        return (None, None);
    }

    let closed =
        Regex::new(r"^([\d.]+)([KM])\s*[\u{2013}\u{2014}-]\s*([\d.]+)([KM])").expect("static regex");
    if let Some(cap) = closed.captures(&s) {
        if let (Ok(lo), Ok(hi)) = (cap[1].parse::<f64>(), cap[3].parse::<f64>()) {
            return (
                Some(lo * multiplier(&cap[2])),
                Some(hi * multiplier(&cap[4])),
            );
        }
    }

    (None, None)
}

fn multiplier(unit: &str) -> f64 {
    if unit == "K" {
        1_000.0
    } else {
        1_000_000.0
    }
}
