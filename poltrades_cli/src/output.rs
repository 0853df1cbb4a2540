use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use poltrades_lib::StoredTrade;

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled, Serialize)]
struct TradeRow {
    #[tabled(rename = "Traded")]
    #[serde(rename = "Traded")]
    trade_date: String,
    #[tabled(rename = "Published")]
    #[serde(rename = "Published")]
    published_date: String,
    #[tabled(rename = "Entity")]
    #[serde(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Issuer")]
    #[serde(rename = "Issuer")]
    issuer: String,
    #[tabled(rename = "Ticker")]
    #[serde(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Type")]
    #[serde(rename = "Type")]
    trade_type: String,
    #[tabled(rename = "Size")]
    #[serde(rename = "Size")]
    size: String,
    #[tabled(rename = "ROI min/avg/max")]
    #[serde(rename = "ROI min/avg/max")]
    roi: String,
}

impl From<&StoredTrade> for TradeRow {
    fn from(row: &StoredTrade) -> Self {
        let t = &row.trade;
        Self {
            trade_date: fmt_date(t.trade_date),
            published_date: fmt_date(t.published_date),
            entity: t.entity_id.clone(),
            issuer: t.issuer_name.clone(),
            ticker: t.issuer_ticker.clone(),
            trade_type: t.trade_type.as_str().to_string(),
            size: fmt_size(t.amount_min, t.amount_max),
            roi: format!(
                "{} / {} / {}",
                fmt_roi(t.min_roi),
                fmt_roi(t.avg_roi),
                fmt_roi(t.max_roi)
            ),
        }
    }
}

pub fn print_trades(rows: &[StoredTrade], format: &OutputFormat) -> Result<()> {
    let rows: Vec<TradeRow> = rows.iter().map(TradeRow::from).collect();
    match format {
        OutputFormat::Table => {
            let mut table = Table::new(&rows);
            table.with(Style::sharp());
            println!("{}", table);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }
    Ok(())
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

fn fmt_roi(roi: Option<f64>) -> String {
    match roi {
        Some(v) => format!("{:.2}%", v),
        None => "-".to_string(),
    }
}

fn fmt_size(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("${:.0}\u{2013}${:.0}", min, max),
        (None, Some(max)) => format!("< ${:.0}", max),
        _ => "-".to_string(),
    }
}
