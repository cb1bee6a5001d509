//! Short-horizon sequence forecaster.
//!
//! - `window`: target construction and sliding windows
//! - `scaler`: per-column min-max scaling
//! - `lstm`: the two-layer LSTM network and its optimiser
//! - `forecaster`: training loop, inference and the [`Forecaster`] seam
//! - `artifact`: versioned persistence of a trained model

pub mod artifact;
pub mod forecaster;
pub mod lstm;
pub mod scaler;
pub mod window;

pub use artifact::{load_bundle, save_bundle, ArtifactHeader, ARTIFACT_SCHEMA_VERSION};
pub use forecaster::{
    CancellationToken, FixedReturnForecaster, ForecastOutput, Forecaster, ForecasterConfig,
    SequenceForecaster, TrainingReport,
};
pub use lstm::LstmNetwork;
pub use scaler::MinMaxScaler;
pub use window::{build_windows, Dataset};
