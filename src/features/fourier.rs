//! Fourier seasonality terms.

use super::FeatureColumns;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Fourier term settings: periods in days and the number of harmonics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FourierSpec {
    #[serde(default = "default_periods")]
    pub periods: Vec<f64>,
    #[serde(default = "default_order")]
    pub k: usize,
}

fn default_periods() -> Vec<f64> {
    vec![7.0, 365.25]
}

fn default_order() -> usize {
    5
}

impl Default for FourierSpec {
    fn default() -> Self {
        Self {
            periods: default_periods(),
            k: default_order(),
        }
    }
}

/// Sine and cosine terms for each period (in days) and harmonic `1..=k`.
///
/// `t` is the fractional number of days since the earliest timestamp of
/// the batch. Columns are named `fourier_sin_{P}_{k}` and
/// `fourier_cos_{P}_{k}`, grouped by period, sine before cosine.
pub fn fourier_features(
    timestamps: &[DateTime<Utc>],
    periods: &[f64],
    k: usize,
) -> Result<FeatureColumns> {
    if k == 0 {
        return Err(ForecastError::Configuration(
            "fourier order k must be at least 1".to_string(),
        ));
    }
    if let Some(p) = periods.iter().find(|p| !p.is_finite() || **p <= 0.0) {
        return Err(ForecastError::Configuration(format!(
            "fourier period must be positive, got {p}"
        )));
    }
    let origin = timestamps
        .iter()
        .min()
        .copied()
        .ok_or_else(|| ForecastError::Data("no timestamps to anchor fourier terms".to_string()))?;

    let t: Vec<f64> = timestamps
        .iter()
        .map(|ts| (*ts - origin).num_milliseconds() as f64 / MILLIS_PER_DAY)
        .collect();

    let mut columns = Vec::with_capacity(periods.len() * k * 2);
    for &period in periods {
        let label = format_period(period);
        for harmonic in 1..=k {
            let omega = 2.0 * PI * harmonic as f64 / period;
            columns.push((
                format!("fourier_sin_{label}_{harmonic}"),
                t.iter().map(|x| (omega * x).sin()).collect(),
            ));
            columns.push((
                format!("fourier_cos_{label}_{harmonic}"),
                t.iter().map(|x| (omega * x).cos()).collect(),
            ));
        }
    }
    Ok(columns)
}

/// Shortest float rendering: `7`, `365.25`.
pub fn format_period(period: f64) -> String {
    format!("{period}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn days(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    #[test]
    fn weekly_two_harmonics_shape() {
        let cols = fourier_features(&days(14), &[7.0], 2).unwrap();
        let names: Vec<&str> = cols.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["fourier_sin_7_1", "fourier_cos_7_1", "fourier_sin_7_2", "fourier_cos_7_2"]
        );
        for (_, values) in &cols {
            assert_eq!(values.len(), 14);
            assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
        }
        // one full period later the terms repeat
        assert_relative_eq!(cols[0].1[0], cols[0].1[7], epsilon = 1e-12);
        assert_relative_eq!(cols[1].1[0], 1.0);
    }

    #[test]
    fn depends_only_on_timestamp_set() {
        let mut ts = days(10);
        let forward = fourier_features(&ts, &[365.25], 1).unwrap();
        ts.reverse();
        let backward = fourier_features(&ts, &[365.25], 1).unwrap();
        assert_eq!(forward[0].0, "fourier_sin_365.25_1");
        for i in 0..10 {
            assert_relative_eq!(forward[0].1[i], backward[0].1[9 - i], epsilon = 1e-12);
        }
    }

    #[test]
    fn spec_defaults() {
        let spec: FourierSpec = serde_yaml::from_str("k: 3").unwrap();
        assert_eq!(spec.periods, vec![7.0, 365.25]);
        assert_eq!(spec.k, 3);
        assert_eq!(FourierSpec::default().k, 5);
    }

    #[test]
    fn invalid_inputs() {
        assert!(fourier_features(&[], &[7.0], 1).unwrap_err().is_data());
        assert!(fourier_features(&days(3), &[7.0], 0).unwrap_err().is_configuration());
        assert!(fourier_features(&days(3), &[-1.0], 1).unwrap_err().is_configuration());
        assert!(fourier_features(&days(3), &[f64::NAN], 1).unwrap_err().is_configuration());
    }
}
