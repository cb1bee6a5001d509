//! Stage orchestration.
//!
//! Each stage reads its inputs, runs one core component and persists its
//! output before the next stage starts:
//! - `build_features`: indicators, exogenous context and events → feature table
//! - `build_long_horizon`: daily features and targets → 15-day grid
//! - `train`: sequence forecaster → artifact bundle
//! - `log_curve` / `long_curve`: long-horizon curves → CSV
//! - `advise`: trained forecaster + advisor → [`AdviceOutcome`]
//!
//! `run_all` chains them in that order.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use cryptocast_core::advisor::{AdviceRecord, Advisor, AdvisorInputs};
use cryptocast_core::curves::{
    build_ensemble_curve, build_log_curve, EnsembleCurveRow, EnsembleReport, LogCurveRow,
};
use cryptocast_core::data::{write_csv_file, TableStore};
use cryptocast_core::domain::TimeSeriesTable;
use cryptocast_core::error::PipelineError;
use cryptocast_core::features::{AssemblyOutput, FeatureAssembler, LongHorizonBuilder};
use cryptocast_core::forecast::{
    load_bundle, save_bundle, CancellationToken, Forecaster, SequenceForecaster, TrainingReport,
};

use crate::config::PipelineConfig;
use crate::data_loader::{load_inputs, InputTables};
use crate::export;

/// Store name of the hourly feature table.
pub const FEATURES_TABLE: &str = "training_features";
/// Store name of the 15-day long-horizon grid.
pub const LONG_HORIZON_TABLE: &str = "longterm_features_15d";

/// Either a fresh advice record or the reason none could be produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdviceOutcome {
    Available(AdviceRecord),
    Unavailable { reason: String },
}

impl AdviceOutcome {
    pub fn record(&self) -> Option<&AdviceRecord> {
        match self {
            AdviceOutcome::Available(r) => Some(r),
            AdviceOutcome::Unavailable { .. } => None,
        }
    }
}

/// What a full run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub config_hash: String,
    pub dataset_hash: String,
    pub feature_rows: usize,
    pub feature_columns: usize,
    pub dropped_columns: Vec<String>,
    pub long_horizon_rows: usize,
    /// `None` when the forecaster could not be trained.
    pub training: Option<TrainingReport>,
    pub log_curve_years: usize,
    /// `None` when the ensemble curve could not be built.
    pub ensemble: Option<EnsembleReport>,
    pub skipped: Vec<String>,
    pub advice: AdviceOutcome,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: TableStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let store = TableStore::new(config.paths.store_dir.clone());
        Self { config, store }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    pub fn load_inputs(&self) -> Result<InputTables> {
        load_inputs(&self.config.paths)
    }

    // ── Features ─────────────────────────────────────────────────────

    /// Assemble the hourly feature table and persist it (parquet + CSV).
    pub fn build_features(&self, inputs: &InputTables) -> Result<AssemblyOutput> {
        let assembler = FeatureAssembler::with_policy(self.config.assembler.imputation);
        let out = assembler
            .assemble(&inputs.sources())
            .context("feature assembly failed")?;
        self.store
            .write(FEATURES_TABLE, &out.table)
            .context("failed to persist feature table")?;
        write_csv_file(&self.config.paths.features_csv, &out.table)
            .context("failed to export feature CSV")?;
        tracing::info!(
            rows = out.table.len(),
            columns = out.table.width(),
            dropped = out.dropped_columns.len(),
            "feature table built"
        );
        Ok(out)
    }

    pub fn load_features(&self) -> Result<TimeSeriesTable> {
        self.store
            .read(FEATURES_TABLE)
            .context("feature table unavailable; run build-features first")
    }

    /// Build the 15-day long-horizon grid and persist it (parquet + CSV).
    pub fn build_long_horizon(&self, inputs: &InputTables) -> Result<TimeSeriesTable> {
        let grid = LongHorizonBuilder::new(self.config.long_horizon.clone())
            .build(&inputs.sources())
            .context("long-horizon grid failed")?;
        self.store
            .write(LONG_HORIZON_TABLE, &grid)
            .context("failed to persist long-horizon grid")?;
        write_csv_file(&self.config.paths.long_horizon_csv, &grid)
            .context("failed to export long-horizon CSV")?;
        Ok(grid)
    }

    pub fn load_long_horizon(&self) -> Result<TimeSeriesTable> {
        self.store
            .read(LONG_HORIZON_TABLE)
            .context("long-horizon grid unavailable; run build-long-horizon first")
    }

    // ── Forecaster ───────────────────────────────────────────────────

    /// Train on the feature table and save the artifact bundle. A cancelled
    /// run saves nothing.
    pub fn train(
        &self,
        features: &TimeSeriesTable,
        cancel: &CancellationToken,
    ) -> Result<TrainingReport> {
        let (model, report) = SequenceForecaster::train(features, &self.config.forecaster, cancel)
            .context("forecaster training failed")?;
        save_bundle(&self.config.paths.model_dir, &model)
            .context("failed to save artifact bundle")?;
        Ok(report)
    }

    // ── Curves ───────────────────────────────────────────────────────

    pub fn log_curve(&self, market: &TimeSeriesTable) -> Result<Vec<LogCurveRow>> {
        let (_, rows) =
            build_log_curve(market, &self.config.log_curve).context("log curve failed")?;
        let path = self.config.paths.log_curve_csv();
        export::write_file(&path, &export::log_curve_csv(&rows)?)?;
        tracing::info!(path = %path.display(), years = rows.len(), "log curve exported");
        Ok(rows)
    }

    pub fn long_curve(
        &self,
        grid: &TimeSeriesTable,
    ) -> Result<(Vec<EnsembleCurveRow>, EnsembleReport)> {
        let (rows, report) =
            build_ensemble_curve(grid, &self.config.ensemble).context("ensemble curve failed")?;
        let path = self.config.paths.long_curve_csv();
        export::write_file(&path, &export::ensemble_curve_csv(&rows)?)?;
        tracing::info!(path = %path.display(), years = rows.len(), "ensemble curve exported");
        Ok((rows, report))
    }

    // ── Advice ───────────────────────────────────────────────────────

    fn try_advise(
        &self,
        features: &TimeSeriesTable,
        sentiment: Option<&TimeSeriesTable>,
        as_of: DateTime<Utc>,
    ) -> Result<AdviceRecord> {
        let model = load_bundle(&self.config.paths.model_dir)?;
        let forecast = model.forecast(features)?;
        let advice = Advisor::new(self.config.advisor.clone()).advise(&AdvisorInputs {
            forecast: &forecast,
            features,
            sentiment,
            as_of,
        })?;
        Ok(advice.record)
    }

    /// Produce advice, or the reason it is unavailable. Never fails.
    pub fn advise(
        &self,
        features: &TimeSeriesTable,
        sentiment: Option<&TimeSeriesTable>,
        as_of: DateTime<Utc>,
    ) -> AdviceOutcome {
        match self.try_advise(features, sentiment, as_of) {
            Ok(record) => AdviceOutcome::Available(record),
            Err(e) => {
                let reason = format!("{e:#}");
                tracing::warn!(%reason, "signal unavailable");
                AdviceOutcome::Unavailable { reason }
            }
        }
    }

    /// Write the outcome to the predictions directory.
    pub fn write_advice(&self, outcome: &AdviceOutcome, as_of: DateTime<Utc>) -> Result<()> {
        let hash = self
            .config
            .config_hash()
            .context("failed to hash config")?;
        let json = export::advice_json(outcome, &hash, as_of)?;
        export::write_file(&self.config.paths.advice_json(), &json)
    }

    // ── Full run ─────────────────────────────────────────────────────

    /// Every stage in order. Training and curve failures are recorded and
    /// skipped; the other stages still run. Cancellation aborts the run.
    pub fn run_all(&self, cancel: &CancellationToken, as_of: DateTime<Utc>) -> Result<RunSummary> {
        let config_hash = self.config.config_hash().context("failed to hash config")?;
        let inputs = self.load_inputs()?;
        tracing::info!(config = %&config_hash[..12], "pipeline run started");

        let features = self.build_features(&inputs)?;
        let grid = self.build_long_horizon(&inputs)?;

        let mut skipped = Vec::new();
        let training = match self.train(&features.table, cancel) {
            Ok(report) => Some(report),
            Err(e) if is_cancelled(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "training skipped");
                skipped.push(format!("train: {e:#}"));
                None
            }
        };

        let log_curve_years = match self.log_curve(&inputs.market) {
            Ok(rows) => rows.len(),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "log curve skipped");
                skipped.push(format!("log-curve: {e:#}"));
                0
            }
        };
        let ensemble = match self.long_curve(&grid) {
            Ok((_, report)) => Some(report),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "ensemble curve skipped");
                skipped.push(format!("long-curve: {e:#}"));
                None
            }
        };

        let sentiment = (!inputs.sentiment.is_empty()).then_some(&inputs.sentiment);
        let advice = self.advise(&features.table, sentiment, as_of);
        self.write_advice(&advice, as_of)?;

        Ok(RunSummary {
            config_hash,
            dataset_hash: inputs.dataset_hash.to_string(),
            feature_rows: features.table.len(),
            feature_columns: features.table.width(),
            dropped_columns: features.dropped_columns,
            long_horizon_rows: grid.len(),
            training,
            log_curve_years,
            ensemble,
            skipped,
            advice,
        })
    }
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Cancelled)
    )
}
