//! Export of curve tables and advice records.
//!
//! - **CSV**: the log-regression and five-year ensemble curves, one row per
//!   year, with RFC 3339 timestamps
//! - **JSON**: the advice outcome wrapped in a versioned envelope
//!
//! Persisted advice carries a `schema_version` field. Newer versions are
//! rejected on load.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use cryptocast_core::data::ingest::format_timestamp;
use cryptocast_core::curves::{EnsembleCurveRow, LogCurveRow};
use serde::{Deserialize, Serialize};

use crate::pipeline::AdviceOutcome;

/// Current schema version for the advice envelope.
pub const SCHEMA_VERSION: u32 = 1;

// ─── CSV export ─────────────────────────────────────────────────────

fn num(v: f64) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        String::new()
    }
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Columns: timestamp, pred_log_price, pred_price, pred_price_low, pred_price_high
pub fn log_curve_csv(rows: &[LogCurveRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "timestamp",
        "pred_log_price",
        "pred_price",
        "pred_price_low",
        "pred_price_high",
    ])?;
    for r in rows {
        wtr.write_record([
            format_timestamp(&r.timestamp),
            num(r.pred_log_price),
            num(r.pred_price),
            num(r.pred_price_low),
            num(r.pred_price_high),
        ])?;
    }
    finish(wtr)
}

/// Columns: current_timestamp, horizon_timestamp, current_price,
/// pred_log_return_5y, pred_vol_5y, pred_price_5y, pred_price_5y_low_1sigma,
/// pred_price_5y_high_1sigma
pub fn ensemble_curve_csv(rows: &[EnsembleCurveRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "current_timestamp",
        "horizon_timestamp",
        "current_price",
        "pred_log_return_5y",
        "pred_vol_5y",
        "pred_price_5y",
        "pred_price_5y_low_1sigma",
        "pred_price_5y_high_1sigma",
    ])?;
    for r in rows {
        wtr.write_record([
            format_timestamp(&r.current_timestamp),
            format_timestamp(&r.horizon_timestamp),
            num(r.current_price),
            num(r.pred_log_return_5y),
            num(r.pred_vol_5y),
            num(r.pred_price_5y),
            num(r.pred_price_5y_low_1sigma),
            num(r.pred_price_5y_high_1sigma),
        ])?;
    }
    finish(wtr)
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

// ─── JSON export ────────────────────────────────────────────────────

/// Persisted advice: the outcome plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdviceEnvelope {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub config_hash: String,
    pub outcome: serde_json::Value,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Serialize an advice outcome to pretty JSON inside the envelope.
pub fn advice_json(
    outcome: &AdviceOutcome,
    config_hash: &str,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    let envelope = AdviceEnvelope {
        schema_version: SCHEMA_VERSION,
        generated_at,
        config_hash: config_hash.to_string(),
        outcome: serde_json::to_value(outcome).context("failed to serialize advice outcome")?,
    };
    serde_json::to_string_pretty(&envelope).context("failed to serialize advice envelope")
}

/// Parse a persisted envelope, rejecting unknown schema versions.
pub fn import_advice(json: &str) -> Result<AdviceEnvelope> {
    let envelope: AdviceEnvelope =
        serde_json::from_str(json).context("failed to deserialize advice envelope")?;
    if envelope.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            envelope.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(envelope)
}
