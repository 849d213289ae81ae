//! TimeSeries data structure for one univariate series with regressors.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A single series: strictly increasing timestamps, target values and
/// named regressor columns aligned with them.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    series_id: Option<String>,
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
    regressors: BTreeMap<String, Vec<f64>>,
}

impl TimeSeries {
    /// Create a series, validating lengths and timestamp order.
    pub fn new(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: timestamps.len(),
                got: values.len(),
            });
        }
        if let Some(w) = timestamps.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ForecastError::Data(format!(
                "timestamps must be strictly increasing ({} then {})",
                w[0], w[1]
            )));
        }
        Ok(Self {
            series_id: None,
            timestamps,
            values,
            regressors: BTreeMap::new(),
        })
    }

    /// Attach a series identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.series_id = Some(id.into());
        self
    }

    /// Attach a regressor column aligned with the timestamps.
    pub fn with_regressor(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        self.regressors.insert(name.into(), values);
        Ok(self)
    }

    pub fn series_id(&self) -> Option<&str> {
        self.series_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }

    /// All regressors keyed by name, in name order.
    pub fn regressors(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.regressors
    }

    pub fn regressor(&self, name: &str) -> Option<&[f64]> {
        self.regressors.get(name).map(|v| v.as_slice())
    }

    pub fn regressor_names(&self) -> Vec<&str> {
        self.regressors.keys().map(|k| k.as_str()).collect()
    }

    pub fn has_regressors(&self) -> bool {
        !self.regressors.is_empty()
    }

    /// Rows `start..end` as a new series, regressors included.
    pub fn slice(&self, start: usize, end: usize) -> Result<TimeSeries> {
        if start > end {
            return Err(ForecastError::Configuration(format!(
                "slice start {start} is after end {end}"
            )));
        }
        if end > self.len() {
            return Err(ForecastError::InsufficientData {
                needed: end,
                got: self.len(),
            });
        }
        Ok(TimeSeries {
            series_id: self.series_id.clone(),
            timestamps: self.timestamps[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
            regressors: self
                .regressors
                .iter()
                .map(|(k, v)| (k.clone(), v[start..end].to_vec()))
                .collect(),
        })
    }

    /// Whether the target has NaN or infinite values.
    pub fn has_missing_values(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }

    /// Copy with NaN targets linearly interpolated.
    ///
    /// With `fill_edges`, leading and trailing gaps take the nearest valid
    /// value; otherwise they stay NaN.
    pub fn interpolated(&self, fill_edges: bool) -> TimeSeries {
        TimeSeries {
            values: interpolate_series(&self.values, fill_edges),
            ..self.clone()
        }
    }
}

/// Linear interpolation over NaN runs.
pub(crate) fn interpolate_series(values: &[f64], fill_edges: bool) -> Vec<f64> {
    let mut result = values.to_vec();
    let n = result.len();
    let mut i = 0;
    while i < n {
        if !result[i].is_nan() {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && result[i].is_nan() {
            i += 1;
        }
        let end = i;
        let left = start.checked_sub(1).map(|j| result[j]);
        let right = (end < n).then(|| result[end]);
        match (left, right) {
            (Some(l), Some(r)) => {
                let segments = (end - start + 1) as f64;
                for (j, idx) in (start..end).enumerate() {
                    result[idx] = l + (j + 1) as f64 / segments * (r - l);
                }
            }
            (Some(l), None) if fill_edges => result[start..end].fill(l),
            (None, Some(r)) if fill_edges => result[start..end].fill(r),
            _ => {}
        }
    }
    result
}
