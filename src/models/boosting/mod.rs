//! Gradient boosted regression trees over regressor columns.
//!
//! Each series' regressors (typically the calendar, lag and rolling
//! features built by the feature pipeline) form the design matrix.
//! Forecasting needs the regressor values for the forecast horizon.

mod tree;

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::{normal_intervals, residual_sigma, FutureRegressors};
use crate::models::Forecaster;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tree::{RegressionTree, TreeSettings};

/// Boosting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row fraction sampled for each tree
    pub subsample: f64,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 5,
            subsample: 1.0,
            seed: 42,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<()> {
        let problem = if self.n_estimators == 0 {
            Some("n_estimators must be at least 1".to_string())
        } else if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            Some(format!("learning_rate must be positive, got {}", self.learning_rate))
        } else if self.max_depth == 0 {
            Some("max_depth must be at least 1".to_string())
        } else if self.min_samples_leaf == 0 {
            Some("min_samples_leaf must be at least 1".to_string())
        } else if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            Some(format!("subsample must be in (0, 1], got {}", self.subsample))
        } else {
            None
        };
        match problem {
            Some(msg) => Err(ForecastError::Configuration(msg)),
            None => Ok(()),
        }
    }
}

/// Least-squares gradient boosting forecaster.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    features: Vec<String>,
    base: f64,
    trees: Vec<RegressionTree>,
    importance: Vec<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
    sigma: f64,
}

impl GradientBoostedTrees {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            features: Vec::new(),
            base: 0.0,
            trees: Vec::new(),
            importance: Vec::new(),
            fitted: None,
            residuals: None,
            sigma: 0.0,
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    /// Regressor names in design-matrix order.
    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    /// Total split gain per feature, largest first.
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let mut pairs: Vec<(String, f64)> = self
            .features
            .iter()
            .cloned()
            .zip(self.importance.iter().copied())
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs
    }

    fn predict_row<F>(&self, value: F) -> f64
    where
        F: Fn(usize) -> f64,
    {
        self.base
            + self.params.learning_rate
                * self.trees.iter().map(|t| t.predict(&value)).sum::<f64>()
    }

    fn sample_rows(&self, rows: &[usize], rng: &mut StdRng) -> Vec<usize> {
        if self.params.subsample >= 1.0 {
            return rows.to_vec();
        }
        let size = ((rows.len() as f64 * self.params.subsample).ceil() as usize).max(1);
        let mut sampled = rows.to_vec();
        sampled.shuffle(rng);
        sampled.truncate(size);
        sampled.sort_unstable();
        sampled
    }

    fn future_columns<'a>(
        &self,
        horizon: usize,
        future: &'a FutureRegressors,
    ) -> Result<Vec<&'a [f64]>> {
        if self.fitted.is_none() {
            return Err(ForecastError::FitRequired);
        }
        self.features
            .iter()
            .map(|name| {
                let values = future
                    .get(name)
                    .ok_or_else(|| ForecastError::missing_column(name))?;
                if values.len() != horizon {
                    return Err(ForecastError::DimensionMismatch {
                        expected: horizon,
                        got: values.len(),
                    });
                }
                Ok(values.as_slice())
            })
            .collect()
    }
}

impl Default for GradientBoostedTrees {
    fn default() -> Self {
        Self::new(BoostingParams::default())
    }
}

impl Forecaster for GradientBoostedTrees {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        self.params.validate()?;
        if !series.has_regressors() {
            return Err(ForecastError::Configuration(
                "gradient boosted trees need at least one regressor column".to_string(),
            ));
        }
        let features: Vec<String> = series
            .regressor_names()
            .into_iter()
            .map(String::from)
            .collect();
        let columns: Vec<Vec<f64>> = series.regressors().values().cloned().collect();
        let y = series.values();

        let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i].is_finite()).collect();
        if rows.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: rows.len(),
            });
        }

        let base = rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64;
        let mut predictions = vec![base; y.len()];
        let mut importance = vec![0.0; features.len()];
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let settings = TreeSettings {
            max_depth: self.params.max_depth,
            min_samples_leaf: self.params.min_samples_leaf,
        };

        self.features = features;
        self.base = base;
        self.trees = Vec::with_capacity(self.params.n_estimators);

        for _ in 0..self.params.n_estimators {
            let gradient: Vec<f64> = y
                .iter()
                .zip(&predictions)
                .map(|(yi, pi)| yi - pi)
                .collect();
            let sample = self.sample_rows(&rows, &mut rng);
            let tree = RegressionTree::fit(&columns, &gradient, &sample, settings, &mut importance);
            for (i, p) in predictions.iter_mut().enumerate() {
                *p += self.params.learning_rate * tree.predict(|f| columns[f][i]);
            }
            self.trees.push(tree);
        }
        debug!(
            trees = self.trees.len(),
            rows = rows.len(),
            features = self.features.len(),
            "fitted gradient boosted trees"
        );

        let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(a, p)| a - p).collect();
        self.sigma = residual_sigma(&residuals);
        self.importance = importance;
        self.fitted = Some(predictions);
        self.residuals = Some(residuals);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        if self.fitted.is_none() {
            return Err(ForecastError::FitRequired);
        }
        if horizon == 0 {
            return Ok(Forecast::default());
        }
        Err(ForecastError::Configuration(
            "gradient boosted trees need future regressor values to forecast".to_string(),
        ))
    }

    fn predict_with_intervals(&self, horizon: usize, _level: f64) -> Result<Forecast> {
        self.predict(horizon)
    }

    fn predict_with_exog(&self, horizon: usize, future: &FutureRegressors) -> Result<Forecast> {
        let columns = self.future_columns(horizon, future)?;
        let point = (0..horizon)
            .map(|i| self.predict_row(|f| columns[f][i]))
            .collect();
        Ok(Forecast::from_values(point))
    }

    fn predict_with_exog_intervals(
        &self,
        horizon: usize,
        future: &FutureRegressors,
        level: f64,
    ) -> Result<Forecast> {
        let point = self.predict_with_exog(horizon, future)?.point().to_vec();
        normal_intervals(point, self.sigma, level, |_| 1.0)
    }

    fn requires_regressors(&self) -> bool {
        true
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "GradientBoostedTrees"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn step_series(n: usize) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = (0..n).map(|i| start + Duration::days(i as i64)).collect();
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let noise: Vec<f64> = (0..n).map(|i| ((i * 7) % 3) as f64).collect();
        let y: Vec<f64> = (0..n).map(|i| if i < n / 2 { 1.0 } else { 5.0 }).collect();
        TimeSeries::new(ts, y)
            .unwrap()
            .with_regressor("x", x)
            .unwrap()
            .with_regressor("noise", noise)
            .unwrap()
    }

    fn future(x: Vec<f64>, noise: Vec<f64>) -> FutureRegressors {
        let mut map = FutureRegressors::new();
        map.insert("x".to_string(), x);
        map.insert("noise".to_string(), noise);
        map
    }

    #[test]
    fn fits_a_step_function() {
        let mut model = GradientBoostedTrees::default();
        model.fit(&step_series(40)).unwrap();
        let fc = model
            .predict_with_exog(2, &future(vec![5.0, 35.0], vec![0.0, 1.0]))
            .unwrap();
        assert_relative_eq!(fc.point()[0], 1.0, epsilon = 1e-2);
        assert_relative_eq!(fc.point()[1], 5.0, epsilon = 1e-2);

        let importance = model.feature_importance();
        assert_eq!(importance[0].0, "x");
        assert!(importance[0].1 > importance[1].1);
    }

    #[test]
    fn intervals_have_constant_width() {
        let mut model = GradientBoostedTrees::default();
        model.fit(&step_series(40)).unwrap();
        let fc = model
            .predict_with_exog_intervals(3, &future(vec![1.0, 2.0, 39.0], vec![0.0; 3]), 0.9)
            .unwrap();
        let lower = fc.lower().unwrap();
        let upper = fc.upper().unwrap();
        assert_relative_eq!(upper[0] - lower[0], upper[2] - lower[2], epsilon = 1e-12);
    }

    #[test]
    fn requires_future_regressors() {
        let mut model = GradientBoostedTrees::default();
        assert_eq!(model.predict(3).unwrap_err(), ForecastError::FitRequired);
        model.fit(&step_series(20)).unwrap();
        assert!(model.requires_regressors());
        assert!(model.predict(3).unwrap_err().is_configuration());
        assert!(model.predict_with_intervals(3, 0.9).unwrap_err().is_configuration());
        assert_eq!(model.predict_with_intervals(0, 0.9).unwrap().horizon(), 0);

        let mut partial = FutureRegressors::new();
        partial.insert("x".to_string(), vec![1.0; 3]);
        assert!(model.predict_with_exog(3, &partial).unwrap_err().is_configuration());
        assert!(matches!(
            model.predict_with_exog(3, &future(vec![1.0; 2], vec![1.0; 2])),
            Err(ForecastError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn subsampling_is_seeded() {
        let params = BoostingParams {
            subsample: 0.5,
            n_estimators: 20,
            min_samples_leaf: 2,
            ..BoostingParams::default()
        };
        let mut a = GradientBoostedTrees::new(params.clone());
        let mut b = GradientBoostedTrees::new(params);
        a.fit(&step_series(30)).unwrap();
        b.fit(&step_series(30)).unwrap();
        assert_eq!(a.fitted_values(), b.fitted_values());
    }

    #[test]
    fn rejects_bad_inputs() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let plain = TimeSeries::new(vec![start, start + Duration::days(1)], vec![1.0, 2.0]).unwrap();
        let mut model = GradientBoostedTrees::default();
        assert!(model.fit(&plain).unwrap_err().is_configuration());

        let bad = BoostingParams {
            subsample: 0.0,
            ..BoostingParams::default()
        };
        assert!(GradientBoostedTrees::new(bad)
            .fit(&step_series(10))
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn params_parse_with_defaults() {
        let params: BoostingParams = serde_yaml::from_str("n_estimators: 10\nlearning_rate: 0.05").unwrap();
        assert_eq!(params.n_estimators, 10);
        assert_eq!(params.max_depth, 3);
        assert_eq!(params.seed, 42);
    }
}
