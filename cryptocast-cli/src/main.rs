//! Cryptocast CLI — feature building, training, curves and advice.
//!
//! Commands:
//! - `build-features`: indicators, context and events → feature table
//! - `build-long-horizon`: 15-day long-horizon grid
//! - `train`: fit the sequence forecaster and save the artifact bundle
//! - `advise`: BUY/HOLD/SELL from the trained forecaster and guardrails
//! - `log-curve`: log-regression price curve CSV
//! - `long-curve`: five-year ensemble curve CSV
//! - `run-all`: every stage in order
//! - `init-config`: write a default TOML config

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use cryptocast_core::advisor::AdviceRecord;
use cryptocast_core::data::load_optional;
use cryptocast_core::data::schema::SENTIMENT;
use cryptocast_core::forecast::CancellationToken;
use cryptocast_runner::{AdviceOutcome, Pipeline, PipelineConfig, RunSummary};

#[derive(Parser)]
#[command(
    name = "cryptocast",
    about = "Cryptocast CLI — BTC forecasting, long-horizon curves and trading advice"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "cryptocast.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and persist the hourly feature table.
    BuildFeatures,
    /// Build and persist the 15-day long-horizon grid.
    BuildLongHorizon,
    /// Train the forecaster on the persisted feature table.
    Train {
        /// Override the configured epoch count.
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Produce a trading signal from the trained forecaster.
    Advise {
        /// Print the advice record as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Write the log-regression curve CSV.
    LogCurve {
        /// Last year of the curve.
        #[arg(long)]
        end_year: Option<i32>,
    },
    /// Write the five-year ensemble curve CSV.
    LongCurve {
        #[arg(long)]
        start_year: Option<i32>,
        #[arg(long)]
        end_year: Option<i32>,
    },
    /// Run every stage in order.
    RunAll,
    /// Write a default config file.
    InitConfig {
        /// Output path. Defaults to the --config path.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::InitConfig { output, force } = &cli.command {
        let path = output.as_deref().unwrap_or(cli.config.as_path());
        return run_init_config(path, *force);
    }

    let mut config = load_config(&cli.config)?;
    match cli.command {
        Commands::BuildFeatures => run_build_features(&Pipeline::new(config)),
        Commands::BuildLongHorizon => run_build_long_horizon(&Pipeline::new(config)),
        Commands::Train { epochs } => {
            if let Some(epochs) = epochs {
                config.forecaster.epochs = epochs;
            }
            run_train(&Pipeline::new(config))
        }
        Commands::Advise { json } => run_advise(&Pipeline::new(config), json),
        Commands::LogCurve { end_year } => {
            if let Some(year) = end_year {
                config.log_curve.end_year = year;
            }
            config.validate()?;
            run_log_curve(&Pipeline::new(config))
        }
        Commands::LongCurve {
            start_year,
            end_year,
        } => {
            if let Some(year) = start_year {
                config.ensemble.start_year = year;
            }
            if let Some(year) = end_year {
                config.ensemble.end_year = year;
            }
            config.validate()?;
            run_long_curve(&Pipeline::new(config))
        }
        Commands::RunAll => run_all(&Pipeline::new(config)),
        Commands::InitConfig { .. } => Ok(()),
    }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    if path.exists() {
        let config = PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    } else {
        tracing::info!(path = %path.display(), "config not found; using defaults");
        Ok(PipelineConfig::default())
    }
}

fn run_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let text = PipelineConfig::default().to_toml_string()?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Default config written to: {}", path.display());
    Ok(())
}

fn run_build_features(pipeline: &Pipeline) -> Result<()> {
    let inputs = pipeline.load_inputs()?;
    let missing = inputs.missing_optional();
    if !missing.is_empty() {
        println!("Optional inputs unavailable: {}", missing.join(", "));
    }
    let out = pipeline.build_features(&inputs)?;
    println!(
        "Feature table: {} rows x {} columns",
        out.table.len(),
        out.table.width()
    );
    if !out.dropped_columns.is_empty() {
        println!("Dropped (never populated): {}", out.dropped_columns.join(", "));
    }
    println!("Saved to: {}", pipeline.config().paths.features_csv.display());
    Ok(())
}

fn run_build_long_horizon(pipeline: &Pipeline) -> Result<()> {
    let inputs = pipeline.load_inputs()?;
    let grid = pipeline.build_long_horizon(&inputs)?;
    println!("Long-horizon grid: {} rows x {} columns", grid.len(), grid.width());
    println!("Saved to: {}", pipeline.config().paths.long_horizon_csv.display());
    Ok(())
}

fn run_train(pipeline: &Pipeline) -> Result<()> {
    let features = pipeline.load_features()?;
    let report = pipeline.train(&features, &CancellationToken::new())?;
    println!(
        "Trained on {} windows ({} train / {} validation)",
        report.windows, report.train_windows, report.val_windows
    );
    println!(
        "Epochs run: {}  best epoch: {}  best val loss: {:.6}",
        report.epochs_run,
        report.best_epoch + 1,
        report.best_val_loss
    );
    println!("Model saved to: {}", pipeline.config().paths.model_dir.display());
    Ok(())
}

fn run_advise(pipeline: &Pipeline, json: bool) -> Result<()> {
    let as_of = Utc::now();
    let outcome = match pipeline.load_features() {
        Ok(features) => {
            let sentiment = load_optional(&pipeline.config().paths.sentiment(), &SENTIMENT);
            let sentiment = (!sentiment.is_empty()).then_some(&sentiment);
            pipeline.advise(&features, sentiment, as_of)
        }
        Err(e) => AdviceOutcome::Unavailable {
            reason: format!("{e:#}"),
        },
    };
    pipeline.write_advice(&outcome, as_of)?;

    if json {
        let text = match &outcome {
            AdviceOutcome::Available(record) => serde_json::to_string_pretty(record)?,
            AdviceOutcome::Unavailable { .. } => serde_json::to_string_pretty(&outcome)?,
        };
        println!("{text}");
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn run_log_curve(pipeline: &Pipeline) -> Result<()> {
    let market = cryptocast_runner::load_market(&pipeline.config().paths)?;
    let rows = pipeline.log_curve(&market)?;
    println!("{:<6} {:>14} {:>14} {:>14}", "Year", "Low", "Price", "High");
    for r in &rows {
        println!(
            "{:<6} {:>14.2} {:>14.2} {:>14.2}",
            r.timestamp.format("%Y"),
            r.pred_price_low,
            r.pred_price,
            r.pred_price_high
        );
    }
    println!("Saved to: {}", pipeline.config().paths.log_curve_csv().display());
    Ok(())
}

fn run_long_curve(pipeline: &Pipeline) -> Result<()> {
    let grid = pipeline.load_long_horizon()?;
    let (rows, report) = pipeline.long_curve(&grid)?;
    for target in [&report.log_return, &report.volatility] {
        println!(
            "{}: {} train / {} test rows, R² = {:.3}",
            target.target, target.train_rows, target.test_rows, target.r2
        );
    }
    println!("{:<6} {:>14} {:>14} {:>14}", "Year", "Price", "5y price", "5y vol");
    for r in &rows {
        println!(
            "{:<6} {:>14.2} {:>14.2} {:>14.3}",
            r.current_timestamp.format("%Y"),
            r.current_price,
            r.pred_price_5y,
            r.pred_vol_5y
        );
    }
    println!("Saved to: {}", pipeline.config().paths.long_curve_csv().display());
    Ok(())
}

fn run_all(pipeline: &Pipeline) -> Result<()> {
    let summary = pipeline.run_all(&CancellationToken::new(), Utc::now())?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("=== Run Summary ===");
    println!("Config:        {}", &summary.config_hash[..12]);
    println!("Dataset:       {}", &summary.dataset_hash[..12]);
    println!(
        "Features:      {} rows x {} columns",
        summary.feature_rows, summary.feature_columns
    );
    println!("Long horizon:  {} rows", summary.long_horizon_rows);
    match &summary.training {
        Some(report) => println!(
            "Training:      {} epochs, best val loss {:.6}",
            report.epochs_run, report.best_val_loss
        ),
        None => println!("Training:      skipped"),
    }
    println!("Log curve:     {} years", summary.log_curve_years);
    match &summary.ensemble {
        Some(report) => println!(
            "5y curve:      R² {:.3} (return) / {:.3} (vol)",
            report.log_return.r2, report.volatility.r2
        ),
        None => println!("5y curve:      skipped"),
    }
    for skipped in &summary.skipped {
        println!("Skipped:       {skipped}");
    }
    println!();
    print_outcome(&summary.advice);
}

fn print_outcome(outcome: &AdviceOutcome) {
    match outcome {
        AdviceOutcome::Available(record) => print_record(record),
        AdviceOutcome::Unavailable { reason } => {
            println!("Signal unavailable: {reason}");
        }
    }
}

fn print_record(r: &AdviceRecord) {
    println!("Signal:        {}", r.signal);
    println!("As of:         {} ({:.1}h old)", r.timestamp, r.data_age_hours);
    println!("Last close:    {:.2}", r.last_close);
    println!(
        "Next ({}):     {:.2} ({:+.2}%)",
        r.horizon, r.next_price_pred, r.pred_change_pct
    );
    if !r.rationale.is_empty() {
        println!("Rationale:     {}", r.rationale.join(" | "));
    }
    for note in &r.notes {
        println!("Note:          {note}");
    }
}
