//! Integration tests for the stage pipeline on synthetic input files.
//!
//! Tests:
//! 1. Advice before any training is UNAVAILABLE, not an error
//! 2. Features → train → advise produces an AVAILABLE record and advice.json
//! 3. The feature table survives the parquet store round trip
//! 4. Too little history for the ensemble curve is InsufficientHistory
//! 5. run_all skips the ensemble curve and still advises
//! 6. run_all skips training on short history and writes UNAVAILABLE advice

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use cryptocast_core::error::PipelineError;
use cryptocast_core::forecast::CancellationToken;
use cryptocast_runner::{
    import_advice, AdviceOutcome, PathsConfig, Pipeline, PipelineConfig, LONG_HORIZON_TABLE,
};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

const DAYS: usize = 20;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn write_inputs(paths: &PathsConfig) {
    fs::create_dir_all(&paths.data_dir).unwrap();

    let mut market = String::from("timestamp,open,high,low,close,volume\n");
    let mut prev = 30_000.0_f64;
    for i in 0..DAYS * 24 {
        let t = i as f64;
        let close = 30_000.0 * (0.0004 * t + 0.02 * (t / 9.0).sin()).exp();
        let ts = start() + Duration::hours(i as i64);
        market.push_str(&format!(
            "{},{prev},{},{},{close},{}\n",
            ts.format("%Y-%m-%d %H:%M:%S"),
            prev.max(close) * 1.001,
            prev.min(close) * 0.999,
            100.0 + (i % 13) as f64,
        ));
        prev = close;
    }
    fs::write(paths.market(), market).unwrap();

    let mut sentiment = String::from("date,sentiment_mean,fear_greed_index\n");
    for d in 0..DAYS {
        let day = start() + Duration::days(d as i64);
        sentiment.push_str(&format!(
            "{},{},{}\n",
            day.format("%Y-%m-%d"),
            0.05 * ((d % 5) as f64 - 2.0),
            40 + d % 20,
        ));
    }
    fs::write(paths.sentiment(), sentiment).unwrap();
}

fn small_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths = PathsConfig::default().rooted_at(root);
    config.forecaster.lookback = 4;
    config.forecaster.epochs = 2;
    config.forecaster.hidden = [3, 2];
    config.forecaster.batch_size = 16;
    config.ensemble.n_trees = 4;
    config.ensemble.max_depth = 4;
    config
}

fn setup() -> (tempfile::TempDir, Pipeline) {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path());
    write_inputs(&config.paths);
    let pipeline = Pipeline::new(config);
    (dir, pipeline)
}

fn as_of() -> DateTime<Utc> {
    start() + Duration::days(DAYS as i64) + Duration::minutes(5)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn advice_without_model_is_unavailable() {
    let (_dir, pipeline) = setup();
    let inputs = pipeline.load_inputs().unwrap();
    let features = pipeline.build_features(&inputs).unwrap();

    let outcome = pipeline.advise(&features.table, Some(&inputs.sentiment), as_of());
    match &outcome {
        AdviceOutcome::Unavailable { reason } => assert!(!reason.is_empty()),
        other => panic!("expected UNAVAILABLE, got {other:?}"),
    }
    assert!(outcome.record().is_none());
}

#[test]
fn trained_pipeline_produces_advice() {
    let (_dir, pipeline) = setup();
    let inputs = pipeline.load_inputs().unwrap();
    let features = pipeline.build_features(&inputs).unwrap();
    let report = pipeline
        .train(&features.table, &CancellationToken::new())
        .unwrap();
    assert!(report.epochs_run >= 1 && report.epochs_run <= 2);
    assert!(report.best_val_loss.is_finite());

    let outcome = pipeline.advise(&features.table, Some(&inputs.sentiment), as_of());
    let record = outcome.record().expect("advice should be available");
    let last_close = *inputs.market.column("close").unwrap().last().unwrap();
    assert!((record.last_close - last_close).abs() < 1e-6);
    assert!(record.next_price_pred > 0.0);
    assert!(record.rationale.iter().any(|r| r.starts_with("Fear&Greed=")));

    pipeline.write_advice(&outcome, as_of()).unwrap();
    let json = fs::read_to_string(pipeline.config().paths.advice_json()).unwrap();
    let envelope = import_advice(&json).unwrap();
    assert_eq!(envelope.outcome["status"], "AVAILABLE");
    assert_eq!(envelope.config_hash, pipeline.config().config_hash().unwrap());
}

#[test]
fn feature_table_round_trips_through_store() {
    let (_dir, pipeline) = setup();
    let inputs = pipeline.load_inputs().unwrap();
    let built = pipeline.build_features(&inputs).unwrap();
    let loaded = pipeline.load_features().unwrap();

    assert_eq!(loaded.len(), built.table.len());
    assert_eq!(loaded.index(), built.table.index());
    assert_eq!(loaded.column_names(), built.table.column_names());
    assert!(pipeline.config().paths.features_csv.exists());
}

#[test]
fn short_history_cannot_build_ensemble_curve() {
    let (_dir, pipeline) = setup();
    let inputs = pipeline.load_inputs().unwrap();
    let grid = pipeline.build_long_horizon(&inputs).unwrap();
    assert!(pipeline.store().exists(LONG_HORIZON_TABLE));
    assert!(!grid.has_column("target_log_return_5y"));

    let err = pipeline.long_curve(&grid).unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InsufficientHistory { .. })
        ),
        "{err:#}"
    );
    assert!(!pipeline.config().paths.long_curve_csv().exists());
}

#[test]
fn run_all_skips_failed_curves_and_still_advises() {
    let (_dir, pipeline) = setup();
    let summary = pipeline
        .run_all(&CancellationToken::new(), as_of())
        .unwrap();

    assert!(summary.feature_rows > 0);
    assert!(summary.ensemble.is_none());
    assert_eq!(summary.skipped.len(), 1);
    assert!(summary.skipped[0].starts_with("long-curve"));
    assert_eq!(summary.log_curve_years, (2030 - 2024 + 1) as usize);
    assert!(summary.advice.record().is_some());

    let paths = &pipeline.config().paths;
    assert!(paths.log_curve_csv().exists());
    assert!(paths.advice_json().exists());
    let curve = fs::read_to_string(paths.log_curve_csv()).unwrap();
    assert_eq!(curve.lines().count(), 1 + summary.log_curve_years);
}

#[test]
fn run_all_skips_training_when_history_is_short() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = small_config(dir.path());
    config.forecaster.lookback = DAYS * 24;
    write_inputs(&config.paths);
    let pipeline = Pipeline::new(config);

    let summary = pipeline
        .run_all(&CancellationToken::new(), as_of())
        .unwrap();

    assert!(summary.feature_rows > 0);
    assert!(summary.training.is_none());
    assert!(summary.skipped.iter().any(|s| s.starts_with("train:")));
    assert!(summary.skipped.iter().any(|s| s.starts_with("long-curve")));
    assert!(summary.advice.record().is_none());
    let paths = &pipeline.config().paths;
    assert!(!paths.model_dir.exists());
    assert!(paths.log_curve_csv().exists());
    let json = fs::read_to_string(paths.advice_json()).unwrap();
    let envelope = import_advice(&json).unwrap();
    assert_eq!(envelope.outcome["status"], "UNAVAILABLE");
}
