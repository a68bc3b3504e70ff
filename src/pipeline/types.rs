//! Core data structures for the RSI pipeline
//!
//! Everything here is created fresh each polling cycle and handed to the
//! presentation layer as an immutable snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identity of one tradable asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: String,
    pub display_name: String,
    /// Upper-cased ticker
    pub symbol: String,
}

/// One row of the ranked-asset list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAsset {
    pub asset: AssetRef,
    pub current_price: Option<f64>,
    pub market_cap_rank: Option<u32>,
}

/// One OHLC bar (open_time in unix milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// One RSI value for an asset; `value` is None when undefined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorReading {
    pub asset_id: String,
    pub value: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

impl OscillatorReading {
    pub fn defined(asset_id: &str, value: f64, computed_at: DateTime<Utc>) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            value: Some(value),
            computed_at,
        }
    }

    pub fn undefined(asset_id: &str, computed_at: DateTime<Utc>) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            value: None,
            computed_at,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertDirection {
    Oversold,
    Overbought,
}

impl AlertDirection {
    /// Comparison operator shown in notification text
    pub fn operator(&self) -> &'static str {
        match self {
            AlertDirection::Oversold => "<=",
            AlertDirection::Overbought => ">=",
        }
    }
}

impl fmt::Display for AlertDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertDirection::Oversold => write!(f, "OVERSOLD"),
            AlertDirection::Overbought => write!(f, "OVERBOUGHT"),
        }
    }
}

/// Threshold crossing for one asset in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub asset: AssetRef,
    pub reading: OscillatorReading,
    pub direction: AlertDirection,
    pub price: Option<f64>,
}

impl Alert {
    /// RSI value that triggered the alert
    pub fn rsi(&self) -> f64 {
        self.reading.value.unwrap_or(f64::NAN)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - RSI: {:.2} | Price: {} USD",
            self.asset.display_name,
            self.asset.symbol,
            self.rsi(),
            format_price(self.price)
        )
    }
}

/// Price rendering shared by alerts and notifications
pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) => p.to_string(),
        None => "—".to_string(),
    }
}

/// Report row ready for tabular display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub name: String,
    pub symbol: String,
    pub price_usd: Option<f64>,
    /// RSI rounded to 2 decimals
    pub rsi: Option<f64>,
}

/// Per-cycle RSI table, ascending by reading with undefined rows last
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    entries: Vec<(RankedAsset, OscillatorReading)>,
}

impl Report {
    /// Build a report; sorting is stable so undefined rows keep rank order
    pub fn new(mut entries: Vec<(RankedAsset, OscillatorReading)>) -> Self {
        entries.sort_by(|(_, a), (_, b)| compare_readings(a.value, b.value));
        Self { entries }
    }

    pub fn entries(&self) -> &[(RankedAsset, OscillatorReading)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn defined_count(&self) -> usize {
        self.entries.iter().filter(|(_, r)| r.is_defined()).count()
    }

    pub fn rows(&self) -> Vec<ReportRow> {
        self.entries
            .iter()
            .map(|(ranked, reading)| ReportRow {
                name: ranked.asset.display_name.clone(),
                symbol: ranked.asset.symbol.clone(),
                price_usd: ranked.current_price,
                rsi: reading.value.map(|v| (v * 100.0).round() / 100.0),
            })
            .collect()
    }
}

fn compare_readings(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(id: &str) -> RankedAsset {
        RankedAsset {
            asset: AssetRef {
                id: id.to_string(),
                display_name: id.to_string(),
                symbol: id.to_uppercase(),
            },
            current_price: Some(1.5),
            market_cap_rank: None,
        }
    }

    #[test]
    fn test_report_sorts_ascending_with_undefined_last() {
        let now = Utc::now();
        let report = Report::new(vec![
            (ranked("a"), OscillatorReading::undefined("a", now)),
            (ranked("b"), OscillatorReading::defined("b", 70.0, now)),
            (ranked("c"), OscillatorReading::undefined("c", now)),
            (ranked("d"), OscillatorReading::defined("d", 12.5, now)),
        ]);

        let ids: Vec<&str> = report
            .entries()
            .iter()
            .map(|(r, _)| r.asset.id.as_str())
            .collect();
        assert_eq!(ids, vec!["d", "b", "a", "c"]);
        assert_eq!(report.defined_count(), 2);
    }

    #[test]
    fn test_rows_round_to_two_decimals() {
        let now = Utc::now();
        let report = Report::new(vec![(ranked("a"), OscillatorReading::defined("a", 33.3367, now))]);
        let rows = report.rows();
        assert_eq!(rows[0].rsi, Some(33.34));
        assert_eq!(rows[0].symbol, "A");
    }

    #[test]
    fn test_alert_display_without_price() {
        let alert = Alert {
            asset: ranked("btc").asset,
            reading: OscillatorReading::defined("btc", 80.0, Utc::now()),
            direction: AlertDirection::Overbought,
            price: None,
        };
        assert_eq!(alert.to_string(), "btc (BTC) - RSI: 80.00 | Price: — USD");
    }
}
