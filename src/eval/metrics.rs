//! Accuracy and calibration metrics for forecast evaluation.
//!
//! Degenerate denominators produce `f64::INFINITY` rather than errors, so
//! callers aggregating metrics must be ready for non-finite values.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accuracy metrics for one forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Mean Absolute Percentage Error over non-zero actuals, in percent
    pub mape: f64,
    /// Symmetric Mean Absolute Percentage Error, in percent
    pub smape: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Scaled Error (only with a training slice)
    pub mase: Option<f64>,
    /// Fraction of actuals inside the interval (only with bounds)
    pub coverage: Option<f64>,
}

impl AccuracyMetrics {
    /// Metrics as named scalars; optional metrics appear only when set.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("mape".to_string(), self.mape);
        map.insert("smape".to_string(), self.smape);
        map.insert("mae".to_string(), self.mae);
        map.insert("rmse".to_string(), self.rmse);
        if let Some(mase) = self.mase {
            map.insert("mase".to_string(), mase);
        }
        if let Some(coverage) = self.coverage {
            map.insert("coverage".to_string(), coverage);
        }
        map
    }

    /// Value of a metric by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "mape" => Some(self.mape),
            "smape" => Some(self.smape),
            "mae" => Some(self.mae),
            "rmse" => Some(self.rmse),
            "mase" => self.mase,
            "coverage" => self.coverage,
            _ => None,
        }
    }

    /// Element-wise mean. `NaN` entries are ignored; an infinite entry makes
    /// the mean infinite. Optional metrics are averaged over the entries
    /// that have them.
    pub fn mean_of(items: &[AccuracyMetrics]) -> Option<AccuracyMetrics> {
        if items.is_empty() {
            return None;
        }
        let avg = |values: Vec<f64>| nan_mean(&values);
        let avg_opt = |values: Vec<f64>| (!values.is_empty()).then(|| nan_mean(&values));
        Some(AccuracyMetrics {
            mape: avg(items.iter().map(|m| m.mape).collect()),
            smape: avg(items.iter().map(|m| m.smape).collect()),
            mae: avg(items.iter().map(|m| m.mae).collect()),
            rmse: avg(items.iter().map(|m| m.rmse).collect()),
            mase: avg_opt(items.iter().filter_map(|m| m.mase).collect()),
            coverage: avg_opt(items.iter().filter_map(|m| m.coverage).collect()),
        })
    }
}

/// Mean of the non-`NaN` values; `NaN` when there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Mean Absolute Percentage Error over rows with non-zero actuals.
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let terms: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, p)| ((a - p) / a).abs())
        .collect();
    if terms.is_empty() {
        return f64::INFINITY;
    }
    100.0 * terms.iter().sum::<f64>() / terms.len() as f64
}

/// Symmetric MAPE over rows with a non-zero denominator.
pub fn smape(actual: &[f64], predicted: &[f64]) -> f64 {
    let terms: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .filter_map(|(a, p)| {
            let denom = a.abs() + p.abs();
            (denom != 0.0).then(|| 2.0 * (a - p).abs() / denom)
        })
        .collect();
    if terms.is_empty() {
        return f64::INFINITY;
    }
    100.0 * terms.iter().sum::<f64>() / terms.len() as f64
}

/// Mean Absolute Error.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Root Mean Squared Error.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64;
    mse.sqrt()
}

/// Mean Absolute Scaled Error.
///
/// The scale is the in-sample MAE of the seasonal naive forecast with
/// period `m` on `train`. Returns `+inf` when that MAE is zero and `NaN`
/// when `train` has no more than `m` points.
pub fn mase(actual: &[f64], predicted: &[f64], train: &[f64], m: usize) -> f64 {
    let m = m.max(1);
    if train.len() <= m {
        return f64::NAN;
    }
    let naive_mae = mae(&train[..train.len() - m], &train[m..]);
    if naive_mae == 0.0 {
        return f64::INFINITY;
    }
    mae(actual, predicted) / naive_mae
}

/// Fraction of actuals with `lower <= actual <= upper`.
pub fn coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let inside = actual
        .iter()
        .zip(lower.iter().zip(upper))
        .filter(|(a, (lo, hi))| *a >= *lo && *a <= *hi)
        .count();
    inside as f64 / actual.len() as f64
}

fn check_len(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(ForecastError::DimensionMismatch { expected, got });
    }
    Ok(())
}

/// Calculate all metrics between actual and predicted values.
///
/// # Arguments
/// * `actual` - Observed values
/// * `predicted` - Point forecasts
/// * `train` - Training slice for MASE scaling
/// * `bounds` - Lower and upper interval bounds for coverage
/// * `seasonal_period` - Naive period for MASE
pub fn calculate_metrics(
    actual: &[f64],
    predicted: &[f64],
    train: Option<&[f64]>,
    bounds: Option<(&[f64], &[f64])>,
    seasonal_period: usize,
) -> Result<AccuracyMetrics> {
    if actual.is_empty() || predicted.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    check_len(actual.len(), predicted.len())?;
    if let Some((lower, upper)) = bounds {
        check_len(actual.len(), lower.len())?;
        check_len(actual.len(), upper.len())?;
    }

    Ok(AccuracyMetrics {
        mape: mape(actual, predicted),
        smape: smape(actual, predicted),
        mae: mae(actual, predicted),
        rmse: rmse(actual, predicted),
        mase: train.map(|t| mase(actual, predicted, t, seasonal_period)),
        coverage: bounds.map(|(lo, hi)| coverage(actual, lo, hi)),
    })
}
