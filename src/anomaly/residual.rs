//! Residual- and interval-based anomaly flags.

use crate::error::{ForecastError, Result};
use crate::utils::stats::{mean, population_std, quantile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How residuals are turned into anomaly flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidualMethod {
    /// Outside the `[lower_quantile, upper_quantile]` residual quantiles;
    /// the score is `|residual|`.
    #[default]
    Quantile,
    /// `|z| > z_threshold` with the population standard deviation; the
    /// score is `|z|`.
    Std,
}

impl ResidualMethod {
    pub fn name(&self) -> &'static str {
        match self {
            ResidualMethod::Quantile => "quantile",
            ResidualMethod::Std => "std",
        }
    }
}

impl fmt::Display for ResidualMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResidualMethod {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quantile" => Ok(ResidualMethod::Quantile),
            "std" => Ok(ResidualMethod::Std),
            other => Err(ForecastError::Configuration(format!(
                "unknown anomaly method '{other}'"
            ))),
        }
    }
}

/// Residual detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualConfig {
    pub method: ResidualMethod,
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    pub z_threshold: f64,
}

impl Default for ResidualConfig {
    fn default() -> Self {
        Self {
            method: ResidualMethod::Quantile,
            lower_quantile: 0.05,
            upper_quantile: 0.95,
            z_threshold: 3.0,
        }
    }
}

impl ResidualConfig {
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 <= self.lower_quantile
            && self.lower_quantile < self.upper_quantile
            && self.upper_quantile <= 1.0;
        if !ordered {
            return Err(ForecastError::Configuration(format!(
                "anomaly quantiles must satisfy 0 <= lower < upper <= 1, got {} and {}",
                self.lower_quantile, self.upper_quantile
            )));
        }
        if !(self.z_threshold > 0.0) {
            return Err(ForecastError::Configuration(format!(
                "z_threshold must be positive, got {}",
                self.z_threshold
            )));
        }
        Ok(())
    }
}

/// Per-row anomaly flags and scores (higher = more anomalous).
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyFlags {
    pub is_anomaly: Vec<bool>,
    pub scores: Vec<f64>,
}

impl AnomalyFlags {
    pub fn count(&self) -> usize {
        self.is_anomaly.iter().filter(|f| **f).count()
    }

    /// Flagged row indices.
    pub fn indices(&self) -> Vec<usize> {
        self.is_anomaly
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.then_some(i))
            .collect()
    }
}

fn check_len(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(ForecastError::DimensionMismatch { expected, got });
    }
    Ok(())
}

/// Flag rows whose residual `actual - predicted` is unusual.
///
/// Rows with a missing residual are never flagged and score `NaN`.
pub fn detect_residual(
    actual: &[f64],
    predicted: &[f64],
    config: &ResidualConfig,
) -> Result<AnomalyFlags> {
    check_len(actual.len(), predicted.len())?;
    config.validate()?;
    let residuals: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();
    let finite: Vec<f64> = residuals.iter().copied().filter(|r| r.is_finite()).collect();
    if finite.is_empty() {
        return Ok(AnomalyFlags {
            is_anomaly: vec![false; residuals.len()],
            scores: vec![f64::NAN; residuals.len()],
        });
    }

    let (is_anomaly, scores) = match config.method {
        ResidualMethod::Quantile => {
            let lower = quantile(&finite, config.lower_quantile);
            let upper = quantile(&finite, config.upper_quantile);
            residuals
                .iter()
                .map(|&r| (r < lower || r > upper, r.abs()))
                .unzip()
        }
        ResidualMethod::Std => {
            let center = mean(&finite);
            let sigma = population_std(&finite);
            residuals
                .iter()
                .map(|&r| {
                    let z = if sigma > 0.0 {
                        ((r - center) / sigma).abs()
                    } else if r.is_finite() {
                        0.0
                    } else {
                        f64::NAN
                    };
                    (z > config.z_threshold, z)
                })
                .unzip()
        }
    };
    Ok(AnomalyFlags { is_anomaly, scores })
}

/// Flag rows whose actual lies outside `[lower, upper]`.
pub fn detect_interval(actual: &[f64], lower: &[f64], upper: &[f64]) -> Result<Vec<bool>> {
    check_len(actual.len(), lower.len())?;
    check_len(actual.len(), upper.len())?;
    Ok(actual
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(a, (lo, hi))| a < lo || a > hi)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spiky() -> (Vec<f64>, Vec<f64>) {
        let predicted: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let mut actual: Vec<f64> = predicted
            .iter()
            .enumerate()
            .map(|(i, p)| p + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        actual[40] += 25.0;
        actual[70] -= 30.0;
        (actual, predicted)
    }

    #[test]
    fn std_method_flags_injected_spikes() {
        let (actual, predicted) = spiky();
        let config = ResidualConfig {
            method: ResidualMethod::Std,
            ..ResidualConfig::default()
        };
        let flags = detect_residual(&actual, &predicted, &config).unwrap();
        assert_eq!(flags.indices(), vec![40, 70]);
        assert!(flags.scores[70] > flags.scores[40]);
    }

    #[test]
    fn quantile_method_flags_tails() {
        let (actual, predicted) = spiky();
        let flags = detect_residual(&actual, &predicted, &ResidualConfig::default()).unwrap();
        assert!(flags.is_anomaly[40]);
        assert!(flags.is_anomaly[70]);
        assert_relative_eq!(flags.scores[70], 29.5, epsilon = 1e-10);
        assert!(flags.count() <= 10);
    }

    #[test]
    fn constant_residuals_are_never_flagged() {
        let flags = detect_residual(
            &[1.0, 2.0, 3.0],
            &[0.0, 1.0, 2.0],
            &ResidualConfig {
                method: ResidualMethod::Std,
                ..ResidualConfig::default()
            },
        )
        .unwrap();
        assert_eq!(flags.count(), 0);
        assert_eq!(flags.scores, vec![0.0; 3]);
    }

    #[test]
    fn interval_method() {
        let flags = detect_interval(&[1.0, 5.0, -1.0], &[0.0, 0.0, 0.0], &[2.0, 2.0, 2.0]).unwrap();
        assert_eq!(flags, vec![false, true, true]);
        assert!(detect_interval(&[1.0], &[], &[]).is_err());
    }

    #[test]
    fn unknown_method_and_bad_settings() {
        assert!("iforest".parse::<ResidualMethod>().unwrap_err().is_configuration());
        assert_eq!("std".parse::<ResidualMethod>().unwrap(), ResidualMethod::Std);
        let bad = ResidualConfig {
            lower_quantile: 0.9,
            upper_quantile: 0.1,
            ..ResidualConfig::default()
        };
        assert!(detect_residual(&[1.0], &[1.0], &bad).unwrap_err().is_configuration());
        assert!(serde_yaml::from_str::<ResidualConfig>("method: ocsvm").is_err());
    }
}
