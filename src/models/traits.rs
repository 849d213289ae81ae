//! Forecaster trait defining the common interface for all models.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::utils::z_for_level;
use std::collections::BTreeMap;

/// Future values of the regressor columns, keyed by column name.
pub type FutureRegressors = BTreeMap<String, Vec<f64>>;

/// Common interface for all forecasting models.
///
/// This trait is object-safe and can be used with `Box<dyn Forecaster>`.
pub trait Forecaster {
    /// Fit the model to the time series data.
    fn fit(&mut self, series: &TimeSeries) -> Result<()>;

    /// Generate predictions for the specified horizon.
    fn predict(&self, horizon: usize) -> Result<Forecast>;

    /// Generate predictions with intervals at coverage `level`.
    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        let _ = level;
        self.predict(horizon)
    }

    /// Predictions given future regressor values.
    ///
    /// Models without regressors ignore `future`.
    fn predict_with_exog(&self, horizon: usize, future: &FutureRegressors) -> Result<Forecast> {
        let _ = future;
        self.predict(horizon)
    }

    /// Interval predictions given future regressor values.
    fn predict_with_exog_intervals(
        &self,
        horizon: usize,
        future: &FutureRegressors,
        level: f64,
    ) -> Result<Forecast> {
        let _ = future;
        self.predict_with_intervals(horizon, level)
    }

    /// Whether prediction needs future regressor values.
    fn requires_regressors(&self) -> bool {
        false
    }

    /// Get the fitted values (in-sample predictions).
    fn fitted_values(&self) -> Option<&[f64]>;

    /// Get the residuals (actual - fitted).
    fn residuals(&self) -> Option<&[f64]>;

    /// Get the model name.
    fn name(&self) -> &str;

    /// Check if the model has been fitted.
    fn is_fitted(&self) -> bool {
        self.fitted_values().is_some()
    }
}

/// Type alias for boxed forecaster trait objects.
///
/// # Example
///
/// ```
/// use forecast_lab::models::{BoxedForecaster, Forecaster};
/// use forecast_lab::models::baseline::Naive;
///
/// let model: BoxedForecaster = Box::new(Naive::new());
/// assert_eq!(model.name(), "Naive");
/// ```
pub type BoxedForecaster = Box<dyn Forecaster>;

/// Named model factory.
///
/// The backtest runner creates a fresh instance per fold and series.
///
/// # Example
///
/// ```
/// use forecast_lab::models::ModelSpec;
/// use forecast_lab::models::baseline::Naive;
///
/// let spec = ModelSpec::with_period("seasonal_naive", |p| Box::new(Naive::seasonal(p)), 7, true);
/// let model = spec.create();
/// assert!(!model.is_fitted());
/// ```
pub struct ModelSpec {
    /// Display name of the model
    pub name: String,
    factory: Box<dyn Fn() -> BoxedForecaster + Send + Sync>,
    /// Whether the model produces intervals
    pub has_intervals: bool,
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field("has_intervals", &self.has_intervals)
            .finish_non_exhaustive()
    }
}

impl ModelSpec {
    /// Create a model spec with a simple factory.
    pub fn new<F>(name: impl Into<String>, factory: F, has_intervals: bool) -> Self
    where
        F: Fn() -> BoxedForecaster + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Box::new(factory),
            has_intervals,
        }
    }

    /// Create a model spec with a period parameter.
    pub fn with_period<F>(
        name: impl Into<String>,
        factory: F,
        period: usize,
        has_intervals: bool,
    ) -> Self
    where
        F: Fn(usize) -> BoxedForecaster + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Box::new(move || factory(period)),
            has_intervals,
        }
    }

    /// Create a new model instance.
    pub fn create(&self) -> BoxedForecaster {
        (self.factory)()
    }
}

/// Training values with gaps interpolated and the edges filled.
pub(crate) fn training_values(series: &TimeSeries) -> Result<Vec<f64>> {
    if series.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if series.values().iter().all(|v| v.is_nan()) {
        return Err(ForecastError::Data(
            "training target has no observed values".to_string(),
        ));
    }
    if series.has_missing_values() {
        Ok(series.interpolated(true).values().to_vec())
    } else {
        Ok(series.values().to_vec())
    }
}

/// Root mean square of the finite residuals; zero when there are none.
pub(crate) fn residual_sigma(residuals: &[f64]) -> f64 {
    let (sum, count) = residuals
        .iter()
        .filter(|r| r.is_finite())
        .fold((0.0, 0usize), |(s, c), r| (s + r * r, c + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt()
    }
}

/// Symmetric normal intervals `point ± z·sigma·scale(h)` for `h = 1..`.
pub(crate) fn normal_intervals<S>(
    point: Vec<f64>,
    sigma: f64,
    level: f64,
    scale: S,
) -> Result<Forecast>
where
    S: Fn(usize) -> f64,
{
    if !(level > 0.0 && level < 1.0) {
        return Err(ForecastError::Configuration(format!(
            "interval level must be in (0, 1), got {level}"
        )));
    }
    let z = z_for_level(level);
    let (lower, upper): (Vec<f64>, Vec<f64>) = point
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let half = z * sigma * scale(i + 1);
            (p - half, p + half)
        })
        .unzip();
    Forecast::from_values_with_intervals(point, lower, upper, level)
}
