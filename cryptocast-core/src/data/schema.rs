//! Explicit schemas for every input table.
//!
//! Upstream producers name some fields differently (e.g. `n-transactions`
//! for `tx_count`). Aliases are resolved once, at ingestion, so every
//! consumer sees canonical names only. Columns outside a schema are ignored.

use crate::domain::FeatureRow;
use serde::{Deserialize, Serialize};

/// One field: canonical name plus accepted upstream aliases.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
    /// Every field must be present (market) versus all-optional (exogenous tables).
    pub all_required: bool,
}

impl TableSchema {
    /// Canonical name for a CSV header, if the schema knows it.
    pub fn canonical(&self, header: &str) -> Option<&'static str> {
        let header = header.trim();
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(header) || f.aliases.contains(&header))
            .map(|f| f.name)
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }
}

const fn field(name: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec { name, aliases }
}

pub const MARKET: TableSchema = TableSchema {
    table: "market",
    fields: &[
        field("open", &[]),
        field("high", &[]),
        field("low", &[]),
        field("close", &[]),
        field("volume", &[]),
    ],
    all_required: true,
};

pub const ONCHAIN: TableSchema = TableSchema {
    table: "onchain",
    fields: &[
        field("tx_count", &["n-transactions"]),
        field("active_addresses", &["n-unique-addresses"]),
        field("hash_rate", &["hash-rate"]),
        field("avg_block_size", &["avg-block-size"]),
        field("miners_revenue", &["miners-revenue"]),
    ],
    all_required: false,
};

pub const MACRO: TableSchema = TableSchema {
    table: "macro",
    fields: &[
        field("sp500_close", &["^GSPC"]),
        field("dxy_close", &["DX-Y.NYB"]),
    ],
    all_required: false,
};

pub const SENTIMENT: TableSchema = TableSchema {
    table: "sentiment",
    fields: &[
        field("news_sentiment", &["sentiment_mean"]),
        field("fear_greed", &["fear_greed_index"]),
        field("news_sentiment_std", &["sentiment_std"]),
        field("bullish_ratio", &[]),
        field("bearish_ratio", &[]),
    ],
    all_required: false,
};

/// On-chain fields of one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnchainRecord {
    pub tx_count: Option<f64>,
    pub active_addresses: Option<f64>,
    pub hash_rate: Option<f64>,
    pub avg_block_size: Option<f64>,
    pub miners_revenue: Option<f64>,
}

impl OnchainRecord {
    pub fn from_row(row: &FeatureRow) -> Self {
        Self {
            tx_count: row.get("tx_count"),
            active_addresses: row.get("active_addresses"),
            hash_rate: row.get("hash_rate"),
            avg_block_size: row.get("avg_block_size"),
            miners_revenue: row.get("miners_revenue"),
        }
    }
}

/// Macro fields of one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroRecord {
    pub sp500_close: Option<f64>,
    pub dxy_close: Option<f64>,
}

impl MacroRecord {
    pub fn from_row(row: &FeatureRow) -> Self {
        Self {
            sp500_close: row.get("sp500_close"),
            dxy_close: row.get("dxy_close"),
        }
    }
}

/// Sentiment fields of one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub news_sentiment: Option<f64>,
    pub fear_greed: Option<f64>,
    pub news_sentiment_std: Option<f64>,
    pub bullish_ratio: Option<f64>,
    pub bearish_ratio: Option<f64>,
}

impl SentimentRecord {
    pub fn from_row(row: &FeatureRow) -> Self {
        Self {
            news_sentiment: row.get("news_sentiment"),
            fear_greed: row.get("fear_greed"),
            news_sentiment_std: row.get("news_sentiment_std"),
            bullish_ratio: row.get("bullish_ratio"),
            bearish_ratio: row.get("bearish_ratio"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    #[test]
    fn aliases_resolve_to_canonical_names() {
        assert_eq!(ONCHAIN.canonical("n-transactions"), Some("tx_count"));
        assert_eq!(ONCHAIN.canonical("tx_count"), Some("tx_count"));
        assert_eq!(MACRO.canonical("^GSPC"), Some("sp500_close"));
        assert_eq!(MARKET.canonical(" Close "), Some("close"));
        assert_eq!(SENTIMENT.canonical("unrelated"), None);
    }

    #[test]
    fn records_read_only_defined_values() {
        let mut values = BTreeMap::new();
        values.insert("tx_count".to_string(), 250_000.0);
        values.insert("hash_rate".to_string(), f64::NAN);
        let row = FeatureRow {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            values,
        };
        let rec = OnchainRecord::from_row(&row);
        assert_eq!(rec.tx_count, Some(250_000.0));
        assert_eq!(rec.hash_rate, None);
        assert_eq!(MacroRecord::from_row(&row), MacroRecord::default());
    }
}
