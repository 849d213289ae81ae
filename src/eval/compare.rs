//! Model comparison: leaderboard and per-fold tables.

use super::metrics::{nan_mean, AccuracyMetrics};
use crate::cv::BacktestResult;
use crate::utils::stats::std_dev;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Metrics shown on a leaderboard unless others are requested.
pub const DEFAULT_METRICS: [&str; 4] = ["mape", "smape", "rmse", "mase"];

/// One model's averaged metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub model: String,
    /// Number of results averaged into this entry.
    pub runs: usize,
    pub metrics: BTreeMap<String, f64>,
}

impl LeaderboardEntry {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Models ranked by MAPE, lower first; models without a finite MAPE last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub metrics: Vec<String>,
    pub entries: Vec<LeaderboardEntry>,
}

/// Ascending order with non-finite or missing values last.
fn finite_first(a: Option<f64>, b: Option<f64>) -> Ordering {
    let key = |v: Option<f64>| v.filter(|x| x.is_finite());
    match (key(a), key(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl Leaderboard {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-ranked entry.
    pub fn best(&self) -> Option<&LeaderboardEntry> {
        self.entries.first()
    }

    pub fn headers(&self) -> Vec<String> {
        std::iter::once("model".to_string())
            .chain(self.metrics.iter().cloned())
            .collect()
    }

    /// Table rows as strings, metrics with four decimals (`-` when missing).
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.entries
            .iter()
            .map(|e| {
                std::iter::once(e.model.clone())
                    .chain(self.metrics.iter().map(|m| format_metric(e.metric(m))))
                    .collect()
            })
            .collect()
    }
}

pub(crate) fn format_metric(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_nan() => "nan".to_string(),
        Some(v) if v == f64::INFINITY => "inf".to_string(),
        Some(v) if v == f64::NEG_INFINITY => "-inf".to_string(),
        Some(v) => format!("{v:.4}"),
        None => "-".to_string(),
    }
}

/// Average results per model (first-seen order) and rank them by MAPE.
///
/// Only `metrics` are kept (the [`DEFAULT_METRICS`] when `None`); a metric
/// absent from every result of a model is left out of its entry.
pub fn create_leaderboard<'a, I>(results: I, metrics: Option<&[&str]>) -> Leaderboard
where
    I: IntoIterator<Item = (&'a str, &'a AccuracyMetrics)>,
{
    let metrics: Vec<String> = metrics
        .unwrap_or(&DEFAULT_METRICS)
        .iter()
        .map(|m| m.to_string())
        .collect();

    let mut order: Vec<&str> = Vec::new();
    let mut grouped: BTreeMap<&str, Vec<&AccuracyMetrics>> = BTreeMap::new();
    for (model, result) in results {
        if !grouped.contains_key(model) {
            order.push(model);
        }
        grouped.entry(model).or_default().push(result);
    }

    let mut entries: Vec<LeaderboardEntry> = order
        .into_iter()
        .map(|model| {
            let runs = &grouped[model];
            let values = metrics
                .iter()
                .filter_map(|name| {
                    let found: Vec<f64> = runs.iter().filter_map(|r| r.get(name)).collect();
                    (!found.is_empty()).then(|| (name.clone(), nan_mean(&found)))
                })
                .collect();
            LeaderboardEntry {
                model: model.to_string(),
                runs: runs.len(),
                metrics: values,
            }
        })
        .collect();

    if metrics.iter().any(|m| m == "mape") {
        entries.sort_by(|a, b| finite_first(a.metric("mape"), b.metric("mape")));
    }
    Leaderboard { metrics, entries }
}

/// Leaderboard over the overall metrics of several backtests.
pub fn leaderboard_from_backtests(results: &[BacktestResult], metrics: Option<&[&str]>) -> Leaderboard {
    create_leaderboard(
        results
            .iter()
            .filter_map(|r| r.metrics.as_ref().map(|m| (r.model.as_str(), m))),
        metrics,
    )
}

/// One model's per-fold values of a metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub model: String,
    pub folds: Vec<f64>,
    pub mean: f64,
    /// Sample standard deviation over folds.
    pub std: f64,
}

/// Per-fold table of one metric, sorted by mean (lower first).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelComparison {
    pub metric: String,
    pub rows: Vec<ComparisonRow>,
}

impl ModelComparison {
    /// Number of fold columns (the longest row).
    pub fn n_folds(&self) -> usize {
        self.rows.iter().map(|r| r.folds.len()).max().unwrap_or(0)
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["model".to_string()];
        headers.extend((1..=self.n_folds()).map(|i| format!("fold_{i}")));
        headers.push("mean".to_string());
        headers.push("std".to_string());
        headers
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        let n = self.n_folds();
        self.rows
            .iter()
            .map(|r| {
                let mut row = vec![r.model.clone()];
                row.extend((0..n).map(|i| format_metric(r.folds.get(i).copied())));
                row.push(format_metric(Some(r.mean)));
                row.push(format_metric(Some(r.std)));
                row
            })
            .collect()
    }
}

/// Compare models on per-fold values of `metric`.
pub fn compare_models<'a, I>(fold_values: I, metric: &str) -> ModelComparison
where
    I: IntoIterator<Item = (&'a str, &'a [f64])>,
{
    let mut rows: Vec<ComparisonRow> = fold_values
        .into_iter()
        .map(|(model, folds)| {
            let finite: Vec<f64> = folds.iter().copied().filter(|v| !v.is_nan()).collect();
            ComparisonRow {
                model: model.to_string(),
                folds: folds.to_vec(),
                mean: nan_mean(&finite),
                std: std_dev(&finite),
            }
        })
        .collect();
    rows.sort_by(|a, b| finite_first(Some(a.mean), Some(b.mean)));
    ModelComparison {
        metric: metric.to_string(),
        rows,
    }
}
