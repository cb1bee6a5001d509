//! Input table loading for the runner.
//!
//! The market table is required: a missing file or an empty table fails the
//! run. On-chain, macro and sentiment tables are optional and degrade to empty
//! tables with a warning, so downstream stages drop their columns.

use anyhow::{Context, Result};
use cryptocast_core::data::schema::{MACRO, MARKET, ONCHAIN, SENTIMENT};
use cryptocast_core::data::store::content_hash;
use cryptocast_core::data::{load_optional, load_required};
use cryptocast_core::domain::{DatasetHash, TimeSeriesTable};
use cryptocast_core::features::SourceTables;

use crate::config::PathsConfig;

/// All raw inputs of one run.
#[derive(Debug, Clone)]
pub struct InputTables {
    pub market: TimeSeriesTable,
    pub onchain: TimeSeriesTable,
    pub macro_data: TimeSeriesTable,
    pub sentiment: TimeSeriesTable,
    /// BLAKE3 hash of the market table.
    pub dataset_hash: DatasetHash,
}

impl InputTables {
    pub fn sources(&self) -> SourceTables<'_> {
        SourceTables {
            market: &self.market,
            onchain: &self.onchain,
            macro_data: &self.macro_data,
            sentiment: &self.sentiment,
        }
    }

    /// Names of the optional tables that came back empty.
    pub fn missing_optional(&self) -> Vec<&'static str> {
        [
            ("onchain", &self.onchain),
            ("macro", &self.macro_data),
            ("sentiment", &self.sentiment),
        ]
        .into_iter()
        .filter(|(_, t)| t.is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Load the market table only.
pub fn load_market(paths: &PathsConfig) -> Result<TimeSeriesTable> {
    let path = paths.market();
    load_required(&path, &MARKET)
        .with_context(|| format!("failed to load market table from {}", path.display()))
}

/// Load every input table.
pub fn load_inputs(paths: &PathsConfig) -> Result<InputTables> {
    let market = load_market(paths)?;
    let dataset_hash = content_hash(&market).context("failed to hash market table")?;
    let inputs = InputTables {
        onchain: load_optional(&paths.onchain(), &ONCHAIN),
        macro_data: load_optional(&paths.macro_data(), &MACRO),
        sentiment: load_optional(&paths.sentiment(), &SENTIMENT),
        market,
        dataset_hash,
    };
    tracing::info!(
        market_rows = inputs.market.len(),
        onchain_rows = inputs.onchain.len(),
        macro_rows = inputs.macro_data.len(),
        sentiment_rows = inputs.sentiment.len(),
        dataset = %inputs.dataset_hash.short(),
        "inputs loaded"
    );
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn paths(dir: &std::path::Path) -> PathsConfig {
        PathsConfig::default().rooted_at(dir)
    }

    #[test]
    fn missing_market_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_inputs(&paths(dir.path())).unwrap_err();
        assert!(format!("{err:#}").contains("market"));
    }

    #[test]
    fn optional_tables_degrade_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let p = paths(dir.path());
        fs::create_dir_all(&p.data_dir).unwrap();
        fs::write(
            p.market(),
            "timestamp,open,high,low,close,volume\n\
             2024-01-01 00:00:00,1,2,0.5,1.5,10\n\
             2024-01-01 01:00:00,1.5,2,1,1.8,12\n",
        )
        .unwrap();
        fs::write(
            p.sentiment(),
            "date,sentiment_mean,fear_greed_index,unrelated\n2024-01-01,0.2,55,x\n",
        )
        .unwrap();

        let inputs = load_inputs(&p).unwrap();
        assert_eq!(inputs.market.len(), 2);
        assert_eq!(inputs.missing_optional(), vec!["onchain", "macro"]);
        assert_eq!(inputs.sentiment.column("fear_greed").unwrap(), &[55.0]);
        assert!(!inputs.sentiment.has_column("unrelated"));
    }
}
