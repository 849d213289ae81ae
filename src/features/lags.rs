//! Lag and rolling-window features computed per series.
//!
//! Both builders are causal: the value at row `r` only reads rows at or
//! before `r` of the same series. Rows are visited through a per-series
//! time-ordered permutation, so the frame keeps its row order.

use super::FeatureColumns;
use crate::core::Frame;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Statistic computed over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollStat {
    Mean,
    /// Sample standard deviation, undefined for a single observation.
    Std,
    Min,
    Max,
}

impl RollStat {
    pub fn name(&self) -> &'static str {
        match self {
            RollStat::Mean => "mean",
            RollStat::Std => "std",
            RollStat::Min => "min",
            RollStat::Max => "max",
        }
    }
}

impl fmt::Display for RollStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RollStat {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(RollStat::Mean),
            "std" => Ok(RollStat::Std),
            "min" => Ok(RollStat::Min),
            "max" => Ok(RollStat::Max),
            other => Err(ForecastError::Configuration(format!(
                "unknown rolling statistic '{other}'"
            ))),
        }
    }
}

/// One rolling window and the statistics to compute over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingSpec {
    pub window: usize,
    #[serde(default = "default_stats")]
    pub stats: Vec<RollStat>,
}

fn default_stats() -> Vec<RollStat> {
    vec![RollStat::Mean]
}

impl RollingSpec {
    pub fn new(window: usize, stats: Vec<RollStat>) -> Self {
        Self { window, stats }
    }
}

/// Target value `lag` steps back, `NaN` before the series start.
pub fn lag_values(values: &[f64], lag: usize) -> Vec<f64> {
    (0..values.len())
        .map(|r| if r >= lag { values[r - lag] } else { f64::NAN })
        .collect()
}

/// Trailing-window statistic with a window that shrinks at the start.
///
/// `NaN` inputs are skipped; a window without valid values yields `NaN`.
pub fn rolling_values(values: &[f64], window: usize, stat: RollStat) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for r in 0..values.len() {
        let lo = (r + 1).saturating_sub(window);
        out.push(window_stat(&values[lo..=r], stat));
    }
    out
}

fn window_stat(window: &[f64], stat: RollStat) -> f64 {
    let valid = window.iter().copied().filter(|v| !v.is_nan());
    match stat {
        RollStat::Mean => {
            let (sum, count) = valid.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        }
        RollStat::Std => {
            let vals: Vec<f64> = valid.collect();
            if vals.len() < 2 {
                return f64::NAN;
            }
            let mean = vals.iter().sum::<f64>() / vals.len() as f64;
            let ss: f64 = vals.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (vals.len() - 1) as f64).sqrt()
        }
        RollStat::Min => valid.fold(f64::NAN, f64::min),
        RollStat::Max => valid.fold(f64::NAN, f64::max),
    }
}

/// Apply `per_series` to each series' time-ordered values of `target` and
/// scatter the results back to the original row positions.
fn per_series_column<F>(frame: &Frame, target: &str, per_series: F) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let source = frame.require_column(target)?;
    let mut out = vec![f64::NAN; frame.len()];
    for rows in frame.series_row_groups()? {
        let values: Vec<f64> = rows.iter().map(|&i| source[i]).collect();
        for (&row, value) in rows.iter().zip(per_series(&values)) {
            out[row] = value;
        }
    }
    Ok(out)
}

/// `lag_{L}` columns of `target` for each lag.
pub fn lag_features(frame: &Frame, target: &str, lags: &[usize]) -> Result<FeatureColumns> {
    if lags.contains(&0) {
        return Err(ForecastError::Configuration(
            "lags must be at least 1".to_string(),
        ));
    }
    frame.require_column(target)?;
    lags.iter()
        .map(|&lag| -> Result<(String, Vec<f64>)> {
            let values = per_series_column(frame, target, |v| lag_values(v, lag))?;
            Ok((format!("lag_{lag}"), values))
        })
        .collect()
}

/// `rolling_{W}_{stat}` columns of `target` for each window and statistic.
pub fn rolling_features(
    frame: &Frame,
    target: &str,
    specs: &[RollingSpec],
) -> Result<FeatureColumns> {
    if specs.iter().any(|s| s.window == 0) {
        return Err(ForecastError::Configuration(
            "rolling window must be at least 1".to_string(),
        ));
    }
    frame.require_column(target)?;
    let mut columns = Vec::new();
    for spec in specs {
        for &stat in &spec.stats {
            let values =
                per_series_column(frame, target, |v| rolling_values(v, spec.window, stat))?;
            columns.push((format!("rolling_{}_{}", spec.window, stat), values));
        }
    }
    Ok(columns)
}

/// Whether `name` is a `lag_{L}` or `rolling_{W}_{stat}` column, i.e. one
/// derived from the target itself.
///
/// Inside a forecast window such columns are computed from actuals that a
/// real forecast would not have seen yet.
pub fn is_history_column(name: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if let Some(lag) = name.strip_prefix("lag_") {
        return digits(lag);
    }
    name.strip_prefix("rolling_")
        .and_then(|rest| rest.split_once('_'))
        .is_some_and(|(window, stat)| digits(window) && stat.parse::<RollStat>().is_ok())
}
