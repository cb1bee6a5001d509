//! Pipeline configuration loaded from TOML.
//!
//! One [`PipelineConfig`] carries every tunable of every stage. Sections
//! that are absent from the file take their defaults, so an empty file is a
//! valid configuration.

use std::path::{Path, PathBuf};

use cryptocast_core::advisor::AdvisorConfig;
use cryptocast_core::curves::{EnsembleConfig, LogCurveConfig};
use cryptocast_core::features::{ImputationPolicy, LongHorizonConfig};
use cryptocast_core::forecast::ForecasterConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content-addressable identifier of a configuration.
pub type ConfigHash = String;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the input CSV files.
    pub data_dir: PathBuf,
    pub market_csv: String,
    pub onchain_csv: String,
    pub macro_csv: String,
    pub sentiment_csv: String,
    /// Parquet table store for the feature and long-horizon tables.
    pub store_dir: PathBuf,
    pub features_csv: PathBuf,
    pub long_horizon_csv: PathBuf,
    pub model_dir: PathBuf,
    pub predictions_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            market_csv: "market.csv".into(),
            onchain_csv: "onchain.csv".into(),
            macro_csv: "macro.csv".into(),
            sentiment_csv: "sentiment.csv".into(),
            store_dir: PathBuf::from("data/processed"),
            features_csv: PathBuf::from("data/processed/training_features.csv"),
            long_horizon_csv: PathBuf::from("data/processed/longterm_features_15d.csv"),
            model_dir: PathBuf::from("models"),
            predictions_dir: PathBuf::from("data/predictions"),
        }
    }
}

impl PathsConfig {
    pub fn market(&self) -> PathBuf {
        self.data_dir.join(&self.market_csv)
    }

    pub fn onchain(&self) -> PathBuf {
        self.data_dir.join(&self.onchain_csv)
    }

    pub fn macro_data(&self) -> PathBuf {
        self.data_dir.join(&self.macro_csv)
    }

    pub fn sentiment(&self) -> PathBuf {
        self.data_dir.join(&self.sentiment_csv)
    }

    pub fn log_curve_csv(&self) -> PathBuf {
        self.predictions_dir.join("log_regression_curve.csv")
    }

    pub fn long_curve_csv(&self) -> PathBuf {
        self.predictions_dir.join("longterm_5y_curve.csv")
    }

    pub fn advice_json(&self) -> PathBuf {
        self.predictions_dir.join("advice.json")
    }

    /// Rebase every relative path onto `root`.
    pub fn rooted_at(&self, root: &Path) -> Self {
        let r = |p: &PathBuf| if p.is_absolute() { p.clone() } else { root.join(p) };
        Self {
            data_dir: r(&self.data_dir),
            store_dir: r(&self.store_dir),
            features_csv: r(&self.features_csv),
            long_horizon_csv: r(&self.long_horizon_csv),
            model_dir: r(&self.model_dir),
            predictions_dir: r(&self.predictions_dir),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    pub imputation: ImputationPolicy,
}

/// The whole pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub assembler: AssemblerConfig,
    pub forecaster: ForecasterConfig,
    pub long_horizon: LongHorizonConfig,
    pub log_curve: LogCurveConfig,
    pub ensemble: EnsembleConfig,
    pub advisor: AdvisorConfig,
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values no stage can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let f = &self.forecaster;
        if f.lookback == 0 {
            return Err(invalid("forecaster.lookback", "must be at least 1"));
        }
        if !(0.0..1.0).contains(&f.dropout) {
            return Err(invalid("forecaster.dropout", format!("{} not in [0, 1)", f.dropout)));
        }
        if !(f.train_fraction > 0.0 && f.train_fraction < 1.0) {
            return Err(invalid(
                "forecaster.train_fraction",
                format!("{} not in (0, 1)", f.train_fraction),
            ));
        }
        if f.hidden.contains(&0) {
            return Err(invalid("forecaster.hidden", "layer sizes must be positive"));
        }
        if !(f.learning_rate > 0.0) {
            return Err(invalid("forecaster.learning_rate", "must be positive"));
        }

        let e = &self.ensemble;
        if !(e.test_fraction > 0.0 && e.test_fraction < 1.0) {
            return Err(invalid(
                "ensemble.test_fraction",
                format!("{} not in (0, 1)", e.test_fraction),
            ));
        }
        if e.n_trees == 0 {
            return Err(invalid("ensemble.n_trees", "must be at least 1"));
        }
        if e.start_year > e.end_year {
            return Err(invalid(
                "ensemble.start_year",
                format!("{} is after end_year {}", e.start_year, e.end_year),
            ));
        }

        if self.long_horizon.bin_days == 0 {
            return Err(invalid("long_horizon.bin_days", "must be at least 1"));
        }
        if self.log_curve.weight_start <= 0.0 || self.log_curve.weight_end <= 0.0 {
            return Err(invalid("log_curve.weight_start", "weights must be positive"));
        }

        let a = &self.advisor;
        if a.sell_threshold_pct >= a.buy_threshold_pct {
            return Err(invalid(
                "advisor.sell_threshold_pct",
                format!(
                    "{} must be below buy_threshold_pct {}",
                    a.sell_threshold_pct, a.buy_threshold_pct
                ),
            ));
        }
        Ok(())
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    pub fn config_hash(&self) -> Result<ConfigHash, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
