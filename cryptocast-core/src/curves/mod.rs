//! Long-horizon price curves.
//!
//! - `log_regression`: recency-weighted log-price trend with residual bands
//! - `ensemble`: random-forest five-year return and volatility projection
//! - `forest`: the regression trees behind `ensemble`

pub mod ensemble;
pub mod forest;
pub mod log_regression;

pub use ensemble::{
    annual_grid, build_ensemble_curve, EnsembleConfig, EnsembleCurveRow, EnsembleReport,
    TargetReport,
};
pub use forest::{r2_score, ForestConfig, RandomForest};
pub use log_regression::{build_log_curve, LogCurveConfig, LogCurveModel, LogCurveRow};
