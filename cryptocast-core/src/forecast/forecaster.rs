//! Next-bar forecasting: the [`Forecaster`] seam, the trained LSTM
//! implementation and its training loop.

use crate::domain::{FeatureRow, TimeSeriesTable};
use crate::error::{PipelineError, Result};
use crate::forecast::artifact::{bundle_id, ArtifactHeader};
use crate::forecast::lstm::{Adam, LstmNetwork};
use crate::forecast::scaler::MinMaxScaler;
use crate::forecast::window::{build_windows, Dataset};
use crate::rng::RngHierarchy;
use chrono::Utc;
use ndarray::{s, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecasterConfig {
    pub lookback: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub patience: usize,
    pub hidden: [usize; 2],
    pub dropout: f64,
    pub learning_rate: f64,
    pub train_fraction: f64,
    pub min_windows: usize,
    pub seed: u64,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            lookback: 60,
            epochs: 50,
            batch_size: 32,
            patience: 5,
            hidden: [128, 64],
            dropout: 0.2,
            learning_rate: 0.001,
            train_fraction: 0.9,
            min_windows: 10,
            seed: 42,
        }
    }
}

/// Result of one forecast.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastOutput {
    pub next_close: f64,
    pub last_close: f64,
    pub pred_log_return: f64,
    pub last_row: FeatureRow,
}

impl ForecastOutput {
    /// `next_close = last_close · e^r`.
    pub fn from_log_return(last_close: f64, pred_log_return: f64, last_row: FeatureRow) -> Self {
        Self {
            next_close: last_close * pred_log_return.exp(),
            last_close,
            pred_log_return,
            last_row,
        }
    }
}

/// Produces a next-bar log-return from a feature table.
pub trait Forecaster: Send + Sync {
    fn predict_log_return(&self, features: &TimeSeriesTable) -> Result<f64>;

    fn forecast(&self, features: &TimeSeriesTable) -> Result<ForecastOutput> {
        let last_row = features
            .last_row()
            .ok_or_else(|| PipelineError::missing_input("features", "table is empty"))?;
        let last_close = last_row
            .get("close")
            .ok_or_else(|| PipelineError::missing_input("features", "last row has no close"))?;
        let r = self.predict_log_return(features)?;
        Ok(ForecastOutput::from_log_return(last_close, r, last_row))
    }
}

/// Always predicts the same log-return.
#[derive(Debug, Clone, Copy)]
pub struct FixedReturnForecaster {
    pub log_return: f64,
}

impl Forecaster for FixedReturnForecaster {
    fn predict_log_return(&self, _features: &TimeSeriesTable) -> Result<f64> {
        Ok(self.log_return)
    }
}

/// Shared flag checked between training epochs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub windows: usize,
    pub train_windows: usize,
    pub val_windows: usize,
    pub epochs_run: usize,
    /// Zero-based epoch whose weights were kept.
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
}

/// Trained LSTM forecaster: network, both fitted scalers and the header
/// that ties them together.
#[derive(Debug, Clone)]
pub struct SequenceForecaster {
    pub(crate) header: ArtifactHeader,
    pub(crate) network: LstmNetwork,
    pub(crate) feature_scaler: MinMaxScaler,
    pub(crate) target_scaler: MinMaxScaler,
}

impl SequenceForecaster {
    pub fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    pub fn network(&self) -> &LstmNetwork {
        &self.network
    }

    pub fn feature_scaler(&self) -> &MinMaxScaler {
        &self.feature_scaler
    }

    pub fn target_scaler(&self) -> &MinMaxScaler {
        &self.target_scaler
    }

    /// Fit scalers over the full history, window, split in time order and
    /// train with early stopping. The best validation epoch is kept.
    pub fn train(
        features: &TimeSeriesTable,
        config: &ForecasterConfig,
        cancel: &CancellationToken,
    ) -> Result<(Self, TrainingReport)> {
        let ds = Dataset::from_table(features)?;
        let feature_scaler = MinMaxScaler::fit(&ds.features)?;
        let target_scaler = MinMaxScaler::fit_vector(&ds.target)?;
        let x_scaled = feature_scaler.transform(&ds.features)?;
        let y_scaled = ds.target.mapv(|v| target_scaler.transform_value(0, v));

        let (x, y) = build_windows(&x_scaled, &y_scaled, config.lookback)?;
        let windows = y.len();
        if windows < config.min_windows {
            return Err(PipelineError::insufficient(
                "forecaster training windows",
                config.min_windows,
                windows,
            ));
        }
        let split = (windows as f64 * config.train_fraction) as usize;
        if split == 0 {
            return Err(PipelineError::insufficient("forecaster training split", 1, 0));
        }
        let x_train = x.slice(s![..split, .., ..]).to_owned();
        let y_train = y.slice(s![..split]).to_owned();
        let x_val = x.slice(s![split.., .., ..]).to_owned();
        let y_val = y.slice(s![split..]).to_owned();

        tracing::info!(
            rows = ds.len(),
            features = ds.columns.len(),
            windows,
            train = split,
            val = windows - split,
            "training sequence forecaster"
        );

        let rngs = RngHierarchy::new(config.seed);
        let mut init_rng = rngs.rng_for("lstm-init", 0);
        let mut network =
            LstmNetwork::new(ds.columns.len(), config.hidden, config.dropout, &mut init_rng);
        let mut adam = Adam::new(&network, config.learning_rate);
        let batch_size = config.batch_size.max(1);

        let mut best = network.clone();
        let mut best_epoch = 0;
        let mut best_loss = f64::INFINITY;
        let mut since_best = 0;
        let mut train_hist = Vec::new();
        let mut val_hist = Vec::new();

        for epoch in 0..config.epochs {
            if cancel.is_cancelled() {
                tracing::warn!(epoch, "training cancelled");
                return Err(PipelineError::Cancelled);
            }
            let mut dropout_rng = rngs.rng_for("dropout", epoch as u64);
            let mut total = 0.0;
            let mut batches = 0usize;
            let mut start = 0;
            while start < split {
                let end = (start + batch_size).min(split);
                let xb = x_train.slice(s![start..end, .., ..]).to_owned();
                let yb = y_train.slice(s![start..end]).to_owned();
                let (loss, grads) = network.gradients(&xb, &yb, &mut dropout_rng);
                adam.apply(&mut network, &grads);
                total += loss;
                batches += 1;
                start = end;
            }
            let train_loss = total / batches.max(1) as f64;
            let val_loss = if y_val.is_empty() {
                train_loss
            } else {
                network.mse(&x_val, &y_val)
            };
            tracing::debug!(epoch, train_loss, val_loss, "epoch finished");
            train_hist.push(train_loss);
            val_hist.push(val_loss);

            if val_loss < best_loss {
                best_loss = val_loss;
                best_epoch = epoch;
                best = network.clone();
                since_best = 0;
            } else {
                since_best += 1;
                if since_best >= config.patience {
                    tracing::info!(epoch, best_epoch, "early stopping");
                    break;
                }
            }
        }

        let header = ArtifactHeader::new(
            bundle_id(&ds.columns, config.lookback, &feature_scaler, &target_scaler)?,
            ds.columns.clone(),
            config.lookback,
            Utc::now(),
        );
        let report = TrainingReport {
            windows,
            train_windows: split,
            val_windows: windows - split,
            epochs_run: train_hist.len(),
            best_epoch,
            best_val_loss: best_loss,
            train_loss: train_hist,
            val_loss: val_hist,
        };
        tracing::info!(
            epochs = report.epochs_run,
            best_epoch,
            best_val_loss = best_loss,
            bundle = %header.bundle_id.short(),
            "forecaster trained"
        );
        Ok((
            Self {
                header,
                network: best,
                feature_scaler,
                target_scaler,
            },
            report,
        ))
    }

    fn check_columns(&self, columns: &[String]) -> Result<()> {
        if columns != self.header.feature_columns.as_slice() {
            return Err(PipelineError::ArtifactMismatch {
                expected: self.header.feature_columns.join(","),
                found: columns.join(","),
            });
        }
        Ok(())
    }
}

impl Forecaster for SequenceForecaster {
    /// Scale the last `lookback` feature rows, run one forward pass and
    /// invert the target scaling.
    fn predict_log_return(&self, features: &TimeSeriesTable) -> Result<f64> {
        let ds = Dataset::from_table(features)?;
        self.check_columns(&ds.columns)?;
        let lookback = self.header.lookback;
        if ds.len() <= lookback {
            return Err(PipelineError::insufficient("forecast", lookback + 1, ds.len()));
        }
        let window = ds.features.slice(s![ds.len() - lookback.., ..]).to_owned();
        let scaled = self.feature_scaler.transform(&window)?;
        let x: Array3<f64> = scaled.insert_axis(Axis(0));
        let pred_scaled = self.network.predict(&x)[0];
        Ok(self.target_scaler.inverse_value(0, pred_scaled))
    }
}
