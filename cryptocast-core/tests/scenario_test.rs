//! End-to-end scenarios across assembler, forecaster seam, curves and advisor.
//!
//! Tests:
//! 1. 200-bar series ending at 100 with +3% forecast and calm context → BUY
//! 2. Same series with -3% forecast and a greedy market → HOLD
//! 3. An empty on-chain table contributes no columns
//! 4. The log curve passes through the last close
//! 5. Long-horizon targets appear only with enough history

mod common;

use chrono::Duration;
use cryptocast_core::advisor::{Advisor, AdvisorInputs, Signal};
use cryptocast_core::curves::{build_log_curve, LogCurveConfig};
use cryptocast_core::domain::TimeSeriesTable;
use cryptocast_core::features::{
    FeatureAssembler, ImputationPolicy, LongHorizonBuilder, LongHorizonConfig, SourceTables,
};
use cryptocast_core::forecast::{FixedReturnForecaster, Forecaster};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn sentiment(fear_greed: f64, news: f64) -> TimeSeriesTable {
    let mut t = common::daily_column("fear_greed", &[fear_greed; 9]);
    t.set_column("news_sentiment", vec![news; 9]).unwrap();
    t
}

fn assemble(market: &TimeSeriesTable, sentiment: &TimeSeriesTable) -> TimeSeriesTable {
    let empty = TimeSeriesTable::default();
    FeatureAssembler::default()
        .assemble(&SourceTables {
            market,
            onchain: &empty,
            macro_data: &empty,
            sentiment,
        })
        .unwrap()
        .table
}

fn signal_for(log_return: f64, fear_greed: f64, news: f64) -> (Signal, f64) {
    let market = common::hourly(&common::wandering_closes(200, 100.0));
    let features = assemble(&market, &sentiment(fear_greed, news));
    let forecast = FixedReturnForecaster { log_return }
        .forecast(&features)
        .unwrap();
    assert!((forecast.last_close - 100.0).abs() < 1e-9);
    let as_of = *features.index().last().unwrap() + Duration::minutes(10);
    let advice = Advisor::default()
        .advise(&AdvisorInputs {
            forecast: &forecast,
            features: &features,
            sentiment: None,
            as_of,
        })
        .unwrap();
    (advice.record.signal, advice.record.pred_change_pct)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn bullish_forecast_with_calm_context_is_buy() {
    let (signal, pct) = signal_for(0.03, 50.0, 0.1);
    assert_eq!(signal, Signal::Buy);
    assert!((3.0..=3.1).contains(&pct), "pred_change_pct = {pct}");
}

#[test]
fn greedy_market_blocks_sell() {
    let (signal, pct) = signal_for(-0.03, 80.0, -0.1);
    assert!(pct < -2.0);
    assert_eq!(signal, Signal::Hold);
}

#[test]
fn empty_onchain_table_is_dropped() {
    let market = common::hourly(&common::wandering_closes(120, 90.0));
    let empty = TimeSeriesTable::default();
    let out = FeatureAssembler::with_policy(ImputationPolicy::HistoricalMean)
        .assemble(&SourceTables {
            market: &market,
            onchain: &empty,
            macro_data: &empty,
            sentiment: &empty,
        })
        .unwrap();
    for name in ["tx_count", "active_addresses", "hash_rate", "avg_block_size", "miners_revenue"] {
        assert!(!out.table.has_column(name), "{name} should be absent");
    }
    assert!(out.table.has_column("rsi_14"));
    assert!(out.table.has_column("event_impact_sum"));
    for col in out.table.columns() {
        assert!(col.values.iter().all(|v| v.is_finite()), "{} has gaps", col.name);
    }
}

#[test]
fn log_curve_passes_through_last_close() {
    let closes: Vec<f64> = (0..24 * 400)
        .map(|i| {
            let d = i as f64 / 24.0;
            1_000.0 * (0.002 * d + 0.1 * (d / 11.0).sin()).exp()
        })
        .collect();
    let market = common::hourly(&closes);
    let (model, rows) = build_log_curve(&market, &LogCurveConfig::default()).unwrap();
    let last_day = *market.index().last().unwrap() - Duration::hours(23);
    let fitted = model.predict_price(last_day);
    let last_close = *closes.last().unwrap();
    assert!((fitted / last_close - 1.0).abs() < 1e-9, "{fitted} vs {last_close}");
    assert_eq!(rows.len(), (2030 - 2024 + 1) as usize);
}

#[test]
fn long_horizon_targets_need_history() {
    let daily: Vec<f64> = (0..800).map(|i| 50.0 * 1.001_f64.powi(i)).collect();
    let market = common::bars(&daily, Duration::days(1));
    let builder = LongHorizonBuilder::new(LongHorizonConfig::default());
    let features = builder.daily_features(&market).unwrap();

    let ret_1y = features.column("target_log_return_1y").unwrap();
    assert!((ret_1y[0] - 365.0 * 1.001_f64.ln()).abs() < 1e-9);
    assert!(ret_1y[799 - 365 + 1].is_nan());
    let vol_1y = features.column("target_vol_1y").unwrap();
    assert!(vol_1y[10].abs() < 1e-9);
    assert!(!features.has_column("target_log_return_5y"));
}
