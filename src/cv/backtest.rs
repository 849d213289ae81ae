//! Backtest runner: fit a fresh model per fold and series, forecast the
//! test window, score it.
//!
//! Per-series metrics use MASE scaled on that series' training slice.
//! Fold metrics are the mean over series; overall metrics the mean over
//! folds.

use super::splits::{Fold, RollingOriginSplitter};
use crate::core::{Forecast, Frame};
use crate::error::{ForecastError, Result};
use crate::eval::metrics::{calculate_metrics, AccuracyMetrics};
use crate::features::is_history_column;
use crate::models::{FutureRegressors, ModelSpec};
use chrono::{DateTime, Utc};
use std::ops::Range;
use tracing::{debug, info, warn};

/// Backtest settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    /// Interval coverage requested from the model.
    pub level: f64,
    /// Naive period for MASE.
    pub seasonal_period: usize,
    /// Regressor columns for models that need them. Empty means every
    /// covariate of the frame except the lag and rolling columns, which
    /// read test-window actuals.
    pub regressors: Vec<String>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            level: 0.9,
            seasonal_period: 1,
            regressors: Vec::new(),
        }
    }
}

/// Metrics of one series in one fold.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesScore {
    pub series_id: Option<String>,
    pub metrics: AccuracyMetrics,
}

/// Scores of one fold.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldScore {
    pub index: usize,
    pub series: Vec<SeriesScore>,
    /// Mean over `series`.
    pub metrics: AccuracyMetrics,
    /// Series whose model could not be fitted or scored.
    pub failed: Vec<Option<String>>,
}

/// Outcome of backtesting one model.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub model: String,
    pub folds: Vec<FoldScore>,
    /// Mean over folds; `None` when no fold was scored.
    pub metrics: Option<AccuracyMetrics>,
    /// Test rows with `y`, `yhat`, `yhat_lower`, `yhat_upper` and `fold`.
    pub predictions: Option<Frame>,
}

impl BacktestResult {
    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// One metric per scored fold, in fold order.
    pub fn fold_values(&self, metric: &str) -> Vec<f64> {
        self.folds.iter().filter_map(|f| f.metrics.get(metric)).collect()
    }
}

#[derive(Default)]
struct PredictionRows {
    ids: Vec<String>,
    timestamps: Vec<DateTime<Utc>>,
    actual: Vec<f64>,
    point: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    fold: Vec<f64>,
}

impl PredictionRows {
    fn push(&mut self, fold: usize, id: Option<&str>, test: &Frame, rows: Range<usize>, fc: &Forecast) {
        let n = rows.len();
        self.ids
            .extend(std::iter::repeat(id.unwrap_or_default().to_string()).take(n));
        self.timestamps.extend_from_slice(&test.timestamps()[rows.clone()]);
        self.actual.extend_from_slice(&test.target()[rows]);
        self.point.extend_from_slice(fc.point());
        let missing = vec![f64::NAN; n];
        self.lower.extend_from_slice(fc.lower().unwrap_or(&missing));
        self.upper.extend_from_slice(fc.upper().unwrap_or(&missing));
        self.fold.extend(std::iter::repeat(fold as f64).take(n));
    }

    fn into_frame(self, panel: bool) -> Result<Option<Frame>> {
        if self.timestamps.is_empty() {
            return Ok(None);
        }
        let ids = panel.then_some(self.ids);
        let frame = Frame::new(ids, self.timestamps, "y", self.actual)?
            .with_column("yhat", self.point)?
            .with_column("yhat_lower", self.lower)?
            .with_column("yhat_upper", self.upper)?
            .with_column("fold", self.fold)?;
        Ok(Some(frame))
    }
}

/// Fit a fresh model on one series' training rows and forecast its test rows.
fn forecast_series(
    spec: &ModelSpec,
    fold: &Fold,
    train_rows: Range<usize>,
    test_rows: Range<usize>,
    regressors: &[&str],
    level: f64,
) -> Result<Forecast> {
    let train = fold.train.to_time_series(train_rows, regressors)?;
    let mut model = spec.create();
    model.fit(&train)?;

    let horizon = test_rows.len();
    let fc = if regressors.is_empty() {
        model.predict_with_intervals(horizon, level)?
    } else {
        let mut future = FutureRegressors::new();
        for name in regressors {
            let values = fold.test.require_column(name)?[test_rows.clone()].to_vec();
            future.insert((*name).to_string(), values);
        }
        model.predict_with_exog_intervals(horizon, &future, level)?
    };
    if fc.horizon() != horizon {
        return Err(ForecastError::DimensionMismatch {
            expected: horizon,
            got: fc.horizon(),
        });
    }
    Ok(fc)
}

fn score_series(
    train: &[f64],
    actual: &[f64],
    fc: &Forecast,
    seasonal_period: usize,
) -> Result<AccuracyMetrics> {
    let keep: Vec<usize> = (0..actual.len()).filter(|&i| actual[i].is_finite()).collect();
    let pick = |v: &[f64]| keep.iter().map(|&i| v[i]).collect::<Vec<f64>>();
    let observed = pick(actual);
    let point = pick(fc.point());
    let bounds = match (fc.lower(), fc.upper()) {
        (Some(lo), Some(hi)) => Some((pick(lo), pick(hi))),
        _ => None,
    };
    let history: Vec<f64> = train.iter().copied().filter(|v| v.is_finite()).collect();
    calculate_metrics(
        &observed,
        &point,
        Some(history.as_slice()),
        bounds.as_ref().map(|(lo, hi)| (lo.as_slice(), hi.as_slice())),
        seasonal_period,
    )
}

/// Run `spec` through every fold of `frame`.
///
/// A series whose fit or forecast fails is skipped in that fold with a
/// warning and listed in [`FoldScore::failed`]; configuration errors abort
/// the run.
pub fn backtest(
    frame: &Frame,
    splitter: &RollingOriginSplitter,
    spec: &ModelSpec,
    config: &BacktestConfig,
) -> Result<BacktestResult> {
    let needs_regressors = spec.create().requires_regressors();
    let regressors: Vec<&str> = if !needs_regressors {
        Vec::new()
    } else if config.regressors.is_empty() {
        let (history, regressors): (Vec<&str>, Vec<&str>) = frame
            .feature_names()
            .into_iter()
            .partition(|name| is_history_column(name));
        if !history.is_empty() {
            debug!(model = %spec.name, excluded = ?history, "lag and rolling columns left out of regressors");
        }
        regressors
    } else {
        config.regressors.iter().map(String::as_str).collect()
    };
    if needs_regressors && regressors.is_empty() {
        return Err(ForecastError::Configuration(format!(
            "model '{}' needs regressor columns but the frame has none",
            spec.name
        )));
    }
    for name in &regressors {
        frame.require_column(name)?;
    }
    info!(
        model = %spec.name,
        regressors = regressors.len(),
        n_splits = splitter.n_splits(),
        horizon = splitter.horizon(),
        "starting backtest"
    );

    let mut folds = Vec::new();
    let mut rows = PredictionRows::default();

    for fold in splitter.split(frame)? {
        let mut series = Vec::new();
        let mut failed = Vec::new();
        let mut train_offset = 0;
        let mut test_offset = 0;

        for bounds in &fold.bounds {
            let w = bounds.window;
            let train_rows = train_offset..train_offset + (w.train_end - w.train_start);
            let test_rows = test_offset..test_offset + (w.test_end - w.test_start);
            train_offset = train_rows.end;
            test_offset = test_rows.end;
            let id = bounds.series_id.as_deref();

            let scored = forecast_series(
                spec,
                &fold,
                train_rows.clone(),
                test_rows.clone(),
                &regressors,
                config.level,
            )
            .and_then(|fc| {
                let metrics = score_series(
                    &fold.train.target()[train_rows.clone()],
                    &fold.test.target()[test_rows.clone()],
                    &fc,
                    config.seasonal_period,
                )?;
                Ok((fc, metrics))
            });

            match scored {
                Ok((fc, metrics)) => {
                    rows.push(fold.index, id, &fold.test, test_rows, &fc);
                    series.push(SeriesScore {
                        series_id: bounds.series_id.clone(),
                        metrics,
                    });
                }
                Err(err) if err.is_configuration() => return Err(err),
                Err(err) => {
                    warn!(model = %spec.name, fold = fold.index, series = ?id, error = %err, "series skipped");
                    failed.push(bounds.series_id.clone());
                }
            }
        }

        let Some(metrics) = AccuracyMetrics::mean_of(&series.iter().map(|s| s.metrics).collect::<Vec<_>>())
        else {
            warn!(model = %spec.name, fold = fold.index, "no series could be scored");
            continue;
        };
        info!(
            model = %spec.name,
            fold = fold.index,
            series = series.len(),
            mape = metrics.mape,
            rmse = metrics.rmse,
            "fold scored"
        );
        folds.push(FoldScore {
            index: fold.index,
            series,
            metrics,
            failed,
        });
    }

    let metrics = AccuracyMetrics::mean_of(&folds.iter().map(|f| f.metrics).collect::<Vec<_>>());
    debug!(model = %spec.name, folds = folds.len(), "backtest finished");
    Ok(BacktestResult {
        model: spec.name.clone(),
        folds,
        metrics,
        predictions: rows.into_frame(frame.is_panel())?,
    })
}
