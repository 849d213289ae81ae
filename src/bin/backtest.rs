//! Backtest command: load a dataset, build features, run rolling-origin
//! backtests for the requested models and write reports.
//!
//! ```text
//! backtest --config configs/energy.yaml --models naive,ets,lgbm
//! ```

use clap::Parser;
use forecast_lab::anomaly::detect_anomalies;
use forecast_lab::config::Config;
use forecast_lab::cv::{backtest, BacktestConfig, BacktestResult, RollingOriginSplitter};
use forecast_lab::data::{align_calendars, load_dataset};
use forecast_lab::eval::{
    compare_models, leaderboard_from_backtests, markdown_table, write_anomaly_report,
    write_comparison_report, DEFAULT_TOP_K,
};
use forecast_lab::features::FeaturePipeline;
use forecast_lab::tracking::{FileTracker, RunHandle, RunStatus, Tracker};
use forecast_lab::{ForecastError, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "backtest")]
#[command(about = "Rolling-origin backtests of forecasting models", long_about = None)]
struct Args {
    /// Experiment configuration (YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Comma-separated model tags (naive, seasonal_naive, ets, lgbm)
    #[arg(short, long, value_delimiter = ',', required = true)]
    models: Vec<String>,

    /// Directory for Markdown reports
    #[arg(short, long, default_value = "reports")]
    output_dir: PathBuf,

    /// Root directory of tracked runs
    #[arg(short, long, default_value = "artifacts/runs")]
    tracking_dir: PathBuf,
}

fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.to_lowercase().into()),
        )
        .init();
}

/// Log one backtest into an open run.
fn track_result(
    tracker: &mut FileTracker,
    run: &RunHandle,
    config: &Config,
    result: &BacktestResult,
) -> Result<()> {
    for fold in &result.folds {
        tracker.log_metrics(run, &fold.metrics.to_map(), Some(fold.index as u64))?;
    }
    if let Some(overall) = &result.metrics {
        let mut summary = overall.to_map();
        summary.insert("n_folds".to_string(), result.n_folds() as f64);
        tracker.log_metrics(run, &summary, None)?;
    }
    if let Some(predictions) = &result.predictions {
        if config.logging.save_predictions {
            tracker.log_frame(run, "predictions.csv", predictions)?;
        }
    }
    Ok(())
}

fn anomaly_report_for(
    tracker: &mut FileTracker,
    run: &RunHandle,
    config: &Config,
    result: &BacktestResult,
    output_dir: &Path,
) -> Result<()> {
    let (Some(anomaly), Some(predictions)) = (&config.anomaly, &result.predictions) else {
        return Ok(());
    };
    let records = detect_anomalies(predictions, anomaly)?;
    let flagged = records.iter().filter(|r| r.is_anomaly).count();
    let path = output_dir.join(format!("anomalies_{}.md", result.model));
    write_anomaly_report(&records, &path, DEFAULT_TOP_K)?;
    tracker.log_artifact(run, "anomalies.json", serde_json::to_string_pretty(&records)?.as_bytes())?;
    info!(model = %result.model, flagged, report = %path.display(), "anomaly report written");
    Ok(())
}

fn run(args: &Args, config: &Config) -> Result<()> {
    let raw = load_dataset(&args.config, &config.dataset)?;
    let frame = match config.dataset.freq {
        Some(freq) => align_calendars(&raw, freq)?.dedup_last(),
        None => raw,
    };

    let pipeline = FeaturePipeline::from_config(&config.features).with_target(&config.dataset.target);
    let featured = pipeline.transform(&frame)?;
    let history = pipeline.history_columns();
    let history: Vec<&str> = history.iter().map(String::as_str).collect();
    let featured = featured.drop_incomplete(Some(history.as_slice()))?;
    info!(
        rows = featured.len(),
        dropped = frame.len() - featured.len(),
        features = featured.feature_names().len(),
        "features built"
    );

    let splitter = RollingOriginSplitter::from_config(&config.cv)?;
    let level = config.anomaly.as_ref().map_or(0.9, |a| a.pi_alpha);
    let mut tracker = FileTracker::new(&args.tracking_dir);
    let params = config.to_params()?;

    let mut results: Vec<BacktestResult> = Vec::new();
    for tag in args.models.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
        let model = config.model(tag)?;
        let backtest_config = BacktestConfig {
            level,
            ..BacktestConfig::default()
        };

        let run = tracker.start_run(&config.logging.experiment, tag)?;
        let mut run_params = params.clone();
        run_params.insert("model".to_string(), tag.to_string());
        tracker.log_params(&run, &run_params)?;

        let outcome = backtest(&featured, &splitter, &model.spec(tag), &backtest_config)
            .and_then(|result| {
                track_result(&mut tracker, &run, config, &result)?;
                anomaly_report_for(&mut tracker, &run, config, &result, &args.output_dir)?;
                Ok(result)
            });
        match outcome {
            Ok(result) => {
                tracker.end_run(run, RunStatus::Finished)?;
                match &result.metrics {
                    Some(m) => info!(
                        model = tag,
                        folds = result.n_folds(),
                        mape = m.mape,
                        rmse = m.rmse,
                        "backtest finished"
                    ),
                    None => warn!(model = tag, "backtest produced no scored folds"),
                }
                results.push(result);
            }
            Err(err) => {
                error!(model = tag, %err, "backtest failed");
                tracker.end_run(run, RunStatus::Failed)?;
            }
        }
    }

    if results.is_empty() {
        return Err(ForecastError::ComputationError(
            "no model completed its backtest".to_string(),
        ));
    }

    let board = leaderboard_from_backtests(&results, None);
    let report = args.output_dir.join("comparison.md");
    write_comparison_report(&board, &report, "Model Comparison Report")?;
    println!("{}", markdown_table(&board.headers(), &board.rows()));

    let per_fold: Vec<(&str, Vec<f64>)> = results
        .iter()
        .map(|r| (r.model.as_str(), r.fold_values("mape")))
        .collect();
    let table = compare_models(per_fold.iter().map(|(m, v)| (*m, v.as_slice())), "mape");
    println!("{}", markdown_table(&table.headers(), &table.rows()));

    if let Some(best) = board.best() {
        info!(model = %best.model, report = %report.display(), "best model");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = Config::from_yaml(&args.config);
    let level = config
        .as_ref()
        .map(|c| c.logging.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_logging(&level);

    let outcome = config.and_then(|config| {
        info!(
            config = %args.config.display(),
            dataset = %config.dataset.name,
            models = ?args.models,
            "running backtest"
        );
        run(&args, &config)
    });
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "backtest aborted");
            ExitCode::FAILURE
        }
    }
}
