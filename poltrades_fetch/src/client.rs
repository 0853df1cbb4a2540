//! HTTP implementation of the page-fetcher contract.
//!
//! The listing site is a Next.js app; trade data is embedded in the HTML as
//! React Server Component payload chunks. We decode those chunks, locate the
//! trades array for the requested page, and render each trade back into the
//! raw cell layout the normalizer consumes.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::user_agent::get_user_agent;
use crate::{FetchError, PageFetcher, RawRow};

pub struct HttpFetcher {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingTrade {
    #[serde(rename = "_txId")]
    #[allow(dead_code)]
    tx_id: i64,
    issuer: ListingIssuer,
    pub_date: String,
    tx_date: String,
    reporting_gap: i64,
    tx_type: String,
    #[serde(default)]
    size_range_low: Option<i64>,
    #[serde(default)]
    size_range_high: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingIssuer {
    issuer_name: String,
    issuer_ticker: Option<String>,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url("https://www.capitoltrades.com")
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Build the listing URL for one entity page. Entities may be listing
    /// IDs (joined onto the base URL) or full URLs (used as-is).
    fn listing_url(&self, entity: &str, page: u32) -> String {
        let root = if entity.starts_with("http") {
            entity.trim_end_matches('/').to_string()
        } else {
            format!("{}/politicians/{}", self.base_url, entity)
        };
        if page <= 1 {
            root
        } else {
            format!("{}?page={}", root, page)
        }
    }

    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .http
            .get(url)
            .header("accept", "text/html,application/xhtml+xml")
            .header("accept-language", "en-US,en;q=0.9")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(FetchError::HttpStatus {
                status: resp.status(),
            });
        }

        Ok(resp.text().await?)
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(
        &self,
        entity: &str,
        page: u32,
    ) -> Result<Option<Vec<RawRow>>, FetchError> {
        let url = self.listing_url(entity, page);
        let html = self.fetch_html(&url).await?;

        let Some(payload) = decode_next_payload(&html)? else {
            tracing::debug!("no payload chunks on {}", url);
            return Ok(None);
        };
        let Some(trades) = trades_in_payload(&payload)? else {
            // Page rendered but carries no trade table.
            return Ok(None);
        };

        Ok(Some(trades.iter().map(trade_to_row).collect()))
    }
}

/// Concatenate and unescape all `self.__next_f.push([1,"..."])` chunks.
fn decode_next_payload(html: &str) -> Result<Option<String>, FetchError> {
    let needle = "self.__next_f.push([1,\"";
    let mut out = String::new();
    let mut rest = html;

    while let Some(at) = rest.find(needle) {
        let chunk = &rest[at + needle.len()..];
        let Some(end) = unescaped_quote(chunk) else {
            break;
        };
        let decoded: String = serde_json::from_str(&format!("\"{}\"", &chunk[..end]))?;
        out.push_str(&decoded);
        rest = &chunk[end + 1..];
    }

    if out.is_empty() {
        Ok(None)
    } else {
        Ok(Some(out))
    }
}

/// Index of the first `"` not preceded by a backslash escape.
fn unescaped_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, ch) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            return Some(i);
        }
    }
    None
}

/// Locate the `"data": [...]` array whose elements are trades (keyed by
/// `_txId`) and deserialize it. `Ok(None)` when the payload has no such
/// array, i.e. the page has no trade table.
fn trades_in_payload(payload: &str) -> Result<Option<Vec<ListingTrade>>, FetchError> {
    let mut cursor = 0;
    while let Some(pos) = payload[cursor..].find("\"data\"") {
        let key_at = cursor + pos;
        cursor = key_at + "\"data\"".len();
        let Some(array_at) = payload[key_at..].find('[').map(|i| key_at + i) else {
            continue;
        };
        let Some(raw) = balanced_array(payload, array_at) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            continue;
        };
        let is_trades = value
            .as_array()
            .and_then(|items| items.first())
            .map(|first| first.get("_txId").is_some())
            .unwrap_or(false);
        if is_trades {
            let trades: Vec<ListingTrade> = serde_json::from_value(value)?;
            return Ok(Some(trades));
        }
    }
    Ok(None)
}

/// Slice from `start` (which must sit on `[`) through the matching `]`,
/// skipping brackets inside string literals.
fn balanced_array(payload: &str, start: usize) -> Option<&str> {
    let mut depth = 0i32;
    let mut in_str = false;
    let mut escape = false;
    for (offset, ch) in payload[start..].char_indices() {
        if in_str {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&payload[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn trade_to_row(trade: &ListingTrade) -> RawRow {
    vec![
        trade.issuer.issuer_name.clone(),
        ticker_cell(trade.issuer.issuer_ticker.as_deref()),
        date_cell(&trade.pub_date),
        date_cell(&trade.tx_date),
        trade.reporting_gap.to_string(),
        trade.tx_type.clone(),
        size_cell(trade.size_range_low, trade.size_range_high),
    ]
}

/// Tickers come through as `AAPL:US`; the cell carries the bare symbol.
fn ticker_cell(ticker: Option<&str>) -> String {
    ticker
        .and_then(|t| t.split(':').next())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Render an ISO date (optionally with a time suffix) as the listing's
/// human format, e.g. `2024-01-15` -> `15 Jan 2024`. Unparseable input is
/// passed through so the normalizer can report it.
fn date_cell(iso: &str) -> String {
    let date_part = iso.split('T').next().unwrap_or(iso);
    match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        Ok(date) => date.format("%-d %b %Y").to_string(),
        Err(_) => iso.to_string(),
    }
}

/// Render a size range the way the listing prints it: `1K–15K`,
/// `< 1K` for open-ended lows, `N/A` when absent. Bounds are rounded to
/// the nearest thousand; the range is disclosed, not exact.
fn size_cell(low: Option<i64>, high: Option<i64>) -> String {
    match (low, high) {
        (Some(low), Some(high)) if low > 0 => {
            format!("{}\u{2013}{}", compact_amount(low), compact_amount(high))
        }
        (_, Some(high)) => format!("< {}", compact_amount(high)),
        _ => "N/A".to_string(),
    }
}

fn compact_amount(n: i64) -> String {
    if n >= 1_000_000 {
        let millions = n as f64 / 1_000_000.0;
        let rounded = (millions * 10.0).round() / 10.0;
        if rounded.fract() == 0.0 {
            format!("{}M", rounded as i64)
        } else {
            format!("{}M", rounded)
        }
    } else {
        let thousands = (n as f64 / 1_000.0).round().max(1.0) as i64;
        format!("{}K", thousands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_url_for_id_and_full_url() {
        let fetcher = HttpFetcher::with_base_url("https://example.com").unwrap();
        assert_eq!(
            fetcher.listing_url("P000197", 1),
            "https://example.com/politicians/P000197"
        );
        assert_eq!(
            fetcher.listing_url("P000197", 3),
            "https://example.com/politicians/P000197?page=3"
        );
        assert_eq!(
            fetcher.listing_url("https://other.example/politicians/D000617/", 2),
            "https://other.example/politicians/D000617?page=2"
        );
    }

    #[test]
    fn date_cell_formats_listing_dates() {
        assert_eq!(date_cell("2024-01-15"), "15 Jan 2024");
        assert_eq!(date_cell("2023-09-03T05:00:00Z"), "3 Sep 2023");
        assert_eq!(date_cell("not-a-date"), "not-a-date");
    }

    #[test]
    fn size_cell_shapes() {
        assert_eq!(size_cell(Some(500_000), Some(1_000_000)), "500K\u{2013}1M");
        assert_eq!(size_cell(Some(1_001), Some(15_000)), "1K\u{2013}15K");
        assert_eq!(size_cell(None, Some(1_000)), "< 1K");
        assert_eq!(size_cell(Some(0), Some(1_000)), "< 1K");
        assert_eq!(size_cell(None, None), "N/A");
    }

    #[test]
    fn compact_amount_suffixes() {
        assert_eq!(compact_amount(1_000), "1K");
        assert_eq!(compact_amount(15_001), "15K");
        assert_eq!(compact_amount(250_000), "250K");
        assert_eq!(compact_amount(1_000_000), "1M");
        assert_eq!(compact_amount(1_500_000), "1.5M");
    }

    #[test]
    fn ticker_cell_strips_exchange_suffix() {
        assert_eq!(ticker_cell(Some("AAPL:US")), "AAPL");
        assert_eq!(ticker_cell(Some("BRK/B:US")), "BRK/B");
        assert_eq!(ticker_cell(None), "");
    }

    #[test]
    fn decode_next_payload_joins_chunks() {
        let html = concat!(
            "<script>self.__next_f.push([1,\"hello \\\"world\\\"\"])</script>",
            "<script>self.__next_f.push([1,\" and more\"])</script>",
        );
        let payload = decode_next_payload(html).unwrap().unwrap();
        assert_eq!(payload, "hello \"world\" and more");
    }

    #[test]
    fn decode_next_payload_empty_html() {
        assert!(decode_next_payload("<html></html>").unwrap().is_none());
    }

    #[test]
    fn trades_in_payload_finds_keyed_array() {
        let payload = r#"{"meta":{"data":[{"x":1}]},"trades":{"data":[
            {"_txId":7,"pubDate":"2024-01-20","txDate":"2024-01-15",
             "reportingGap":5,"txType":"buy","sizeRangeLow":1001,
             "sizeRangeHigh":15000,
             "issuer":{"issuerName":"Apple Inc","issuerTicker":"AAPL:US"}}
        ]}}"#;
        let trades = trades_in_payload(payload).unwrap().unwrap();
        assert_eq!(trades.len(), 1);
        let row = trade_to_row(&trades[0]);
        assert_eq!(
            row,
            vec![
                "Apple Inc",
                "AAPL",
                "20 Jan 2024",
                "15 Jan 2024",
                "5",
                "buy",
                "1K\u{2013}15K",
            ]
        );
    }

    #[test]
    fn trades_in_payload_absent_table() {
        let payload = r#"{"data":[{"notATrade":true}]}"#;
        assert!(trades_in_payload(payload).unwrap().is_none());
    }
}
