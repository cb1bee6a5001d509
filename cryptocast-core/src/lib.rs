//! CryptoCast Core: feature construction, forecasting, long-horizon curves and advice.
//!
//! This crate contains every algorithm of the pipeline and no process-level
//! concerns:
//! - Column-major time-series tables and OHLCV domain types
//! - CSV/parquet ingestion, explicit exogenous schemas and resampling
//! - Technical indicators and calendar event features
//! - The hourly feature assembler and the 15-day long-horizon grid
//! - The LSTM sequence forecaster with versioned artifact bundles
//! - Log-regression and random-forest long-horizon curves
//! - The rule-based advisor with guardrails

pub mod advisor;
pub mod curves;
pub mod data;
pub mod domain;
pub mod error;
pub mod events;
pub mod features;
pub mod forecast;
pub mod indicators;
pub mod rng;
pub mod series;

pub use error::{PipelineError, Result};
