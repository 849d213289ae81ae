//! Forecasting models.
//!
//! Every model implements [`Forecaster`]. [`ModelConfig`] turns a
//! configuration entry (`naive`, `seasonal_naive`, `ets`, `lgbm`/`gbt`)
//! into a [`ModelSpec`] factory.

mod traits;

pub mod baseline;
pub mod boosting;
pub mod exponential;

pub use baseline::Naive;
pub use boosting::{BoostingParams, GradientBoostedTrees};
pub use exponential::{ExponentialSmoothing, SeasonalType, SmoothingParams, TrendType};
pub use traits::{BoxedForecaster, Forecaster, FutureRegressors, ModelSpec};

use crate::error::{ForecastError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Parameters of the naive models.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveParams {
    pub seasonal_period: Option<usize>,
}

/// Parameters of exponential smoothing; `null` components are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtsParams {
    pub trend: Option<TrendType>,
    pub seasonal: Option<SeasonalType>,
    pub seasonal_periods: usize,
}

impl Default for EtsParams {
    fn default() -> Self {
        Self {
            trend: None,
            seasonal: None,
            seasonal_periods: 7,
        }
    }
}

/// A model selected by configuration tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelConfig {
    Naive(NaiveParams),
    SeasonalNaive(NaiveParams),
    ExponentialSmoothing(EtsParams),
    GradientBoostedTrees(BoostingParams),
}

fn parse_params<T: DeserializeOwned + Default>(params: &serde_yaml::Value) -> Result<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    Ok(serde_yaml::from_value(params.clone())?)
}

impl ModelConfig {
    /// Parse a `models:` entry.
    ///
    /// # Example
    /// ```
    /// use forecast_lab::models::ModelConfig;
    ///
    /// let params: serde_yaml::Value = serde_yaml::from_str("seasonal_period: 7").unwrap();
    /// let config = ModelConfig::from_tag("seasonal_naive", &params).unwrap();
    /// assert_eq!(config.seasonal_period(), 7);
    /// assert!(ModelConfig::from_tag("prophet", &params).is_err());
    /// ```
    pub fn from_tag(tag: &str, params: &serde_yaml::Value) -> Result<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "naive" => Ok(Self::Naive(parse_params(params)?)),
            "seasonal_naive" | "snaive" => Ok(Self::SeasonalNaive(parse_params(params)?)),
            "ets" | "exponential_smoothing" => Ok(Self::ExponentialSmoothing(parse_params(params)?)),
            "lgbm" | "lightgbm" | "gbt" => Ok(Self::GradientBoostedTrees(parse_params(params)?)),
            "prophet" => Err(ForecastError::Configuration(
                "model 'prophet' is not available in this toolkit".to_string(),
            )),
            other => Err(ForecastError::Configuration(format!("unknown model '{other}'"))),
        }
    }

    /// Canonical tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Naive(_) => "naive",
            Self::SeasonalNaive(_) => "seasonal_naive",
            Self::ExponentialSmoothing(_) => "ets",
            Self::GradientBoostedTrees(_) => "gbt",
        }
    }

    /// Season length used by the model and for MASE scaling.
    pub fn seasonal_period(&self) -> usize {
        match self {
            Self::Naive(p) => p.seasonal_period.unwrap_or(1).max(1),
            Self::SeasonalNaive(p) => p.seasonal_period.unwrap_or(7).max(1),
            Self::ExponentialSmoothing(p) if p.seasonal.is_some() => p.seasonal_periods.max(1),
            _ => 1,
        }
    }

    /// Whether the model forecasts from regressor columns.
    pub fn uses_regressors(&self) -> bool {
        matches!(self, Self::GradientBoostedTrees(_))
    }

    /// Fresh, unfitted model.
    pub fn build(&self) -> BoxedForecaster {
        match self {
            Self::Naive(_) | Self::SeasonalNaive(_) => Box::new(Naive::seasonal(self.seasonal_period())),
            Self::ExponentialSmoothing(p) => Box::new(ExponentialSmoothing::new(
                p.trend.unwrap_or_default(),
                p.seasonal.unwrap_or_default(),
                p.seasonal_periods,
            )),
            Self::GradientBoostedTrees(p) => Box::new(GradientBoostedTrees::new(p.clone())),
        }
    }

    /// Factory named `name`.
    pub fn spec(&self, name: impl Into<String>) -> ModelSpec {
        let config = self.clone();
        ModelSpec::new(name, move || config.build(), true)
    }
}
