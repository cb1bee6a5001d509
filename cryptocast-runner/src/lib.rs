//! Cryptocast Runner — stage orchestration on top of `cryptocast-core`.
//!
//! This crate provides:
//! - TOML pipeline configuration with validation and content hashing
//! - Input loading (required market table, optional context tables)
//! - Stage runs: features, long-horizon grid, training, curves, advice
//! - CSV export of curves and a versioned JSON envelope for advice

pub mod config;
pub mod data_loader;
pub mod export;
pub mod pipeline;

pub use config::{AssemblerConfig, ConfigError, ConfigHash, PathsConfig, PipelineConfig};
pub use data_loader::{load_inputs, load_market, InputTables};
pub use export::{advice_json, import_advice, AdviceEnvelope, SCHEMA_VERSION};
pub use pipeline::{AdviceOutcome, Pipeline, RunSummary, FEATURES_TABLE, LONG_HORIZON_TABLE};
