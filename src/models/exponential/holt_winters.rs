//! Holt-Winters exponential smoothing.
//!
//! One model covers simple smoothing, Holt's linear trend and the
//! seasonal Holt-Winters variants; the components are chosen at
//! construction and the smoothing parameters are fitted on in-sample SSE.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::{normal_intervals, residual_sigma, training_values};
use crate::models::Forecaster;
use crate::utils::{minimize_in_box, SimplexSettings};
use serde::{Deserialize, Serialize};
use tracing::warn;

const PARAM_BOUNDS: (f64, f64) = (0.0001, 0.9999);
const INITIAL_PARAMS: [f64; 3] = [0.3, 0.1, 0.1];

/// Trend component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendType {
    #[default]
    None,
    #[serde(alias = "add")]
    Additive,
}

/// Seasonal component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalType {
    #[default]
    None,
    /// `y_t = l_t + b_t + s_t + e_t`
    #[serde(alias = "add")]
    Additive,
    /// `y_t = (l_t + b_t) * s_t + e_t`
    #[serde(alias = "mul")]
    Multiplicative,
}

/// Fitted smoothing parameters; `beta` and `gamma` only for the
/// components that are present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingParams {
    pub alpha: f64,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Structure {
    trend: bool,
    seasonal: SeasonalType,
    period: usize,
}

impl Structure {
    const SIMPLE: Structure = Structure {
        trend: false,
        seasonal: SeasonalType::None,
        period: 1,
    };

    fn is_seasonal(&self) -> bool {
        self.seasonal != SeasonalType::None
    }

    fn n_params(&self) -> usize {
        1 + usize::from(self.trend) + usize::from(self.is_seasonal())
    }

    fn params(&self, point: &[f64]) -> SmoothingParams {
        let mut rest = point.iter().skip(1).copied();
        SmoothingParams {
            alpha: point[0],
            beta: if self.trend { rest.next() } else { None },
            gamma: if self.is_seasonal() { rest.next() } else { None },
        }
    }
}

/// Final state of one smoothing pass.
#[derive(Debug, Clone)]
struct Pass {
    sse: f64,
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
    fitted: Vec<f64>,
}

/// Exponential smoothing forecaster.
///
/// The update equations for additive seasonality:
/// - Level: `l_t = α(y_t - s_{t-m}) + (1-α)(l_{t-1} + b_{t-1})`
/// - Trend: `b_t = β(l_t - l_{t-1}) + (1-β)b_{t-1}`
/// - Seasonal: `s_t = γ(y_t - l_t) + (1-γ)s_{t-m}`
/// - Forecast: `ŷ_{t+h} = l_t + h*b_t + s_{t+h-m}`
///
/// Multiplicative seasonality divides where the additive form subtracts.
/// When the requested structure cannot be fitted (fewer than two full
/// seasons, or multiplicative seasonality on non-positive data) the model
/// falls back to simple exponential smoothing.
#[derive(Debug, Clone)]
pub struct ExponentialSmoothing {
    trend: TrendType,
    seasonal: SeasonalType,
    seasonal_periods: usize,
    structure: Option<Structure>,
    params: Option<SmoothingParams>,
    level: Option<f64>,
    slope: f64,
    seasonals: Vec<f64>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
    sigma: f64,
    n: usize,
}

impl ExponentialSmoothing {
    /// Create a model with the given components.
    ///
    /// `seasonal_periods` is ignored without a seasonal component.
    pub fn new(trend: TrendType, seasonal: SeasonalType, seasonal_periods: usize) -> Self {
        Self {
            trend,
            seasonal,
            seasonal_periods,
            structure: None,
            params: None,
            level: None,
            slope: 0.0,
            seasonals: Vec::new(),
            fitted: None,
            residuals: None,
            sigma: 0.0,
            n: 0,
        }
    }

    /// Simple exponential smoothing (level only).
    pub fn simple() -> Self {
        Self::new(TrendType::None, SeasonalType::None, 1)
    }

    /// Holt's linear trend method.
    pub fn holt() -> Self {
        Self::new(TrendType::Additive, SeasonalType::None, 1)
    }

    /// Fitted smoothing parameters.
    pub fn params(&self) -> Option<SmoothingParams> {
        self.params
    }

    /// Whether the last fit fell back to simple smoothing.
    pub fn used_fallback(&self) -> bool {
        let requested = self.trend != TrendType::None || self.seasonal != SeasonalType::None;
        matches!(self.structure, Some(s) if requested && s == Structure::SIMPLE)
    }

    /// Seasonal indices of the fitted model, indexed by `t % period`.
    pub fn seasonals(&self) -> &[f64] {
        &self.seasonals
    }

    fn requested_structure(&self, values: &[f64]) -> Result<Structure> {
        let structure = Structure {
            trend: self.trend == TrendType::Additive,
            seasonal: self.seasonal,
            period: if self.seasonal == SeasonalType::None {
                1
            } else {
                self.seasonal_periods
            },
        };
        if !structure.is_seasonal() {
            return Ok(structure);
        }
        if structure.period < 2 {
            return Err(ForecastError::Configuration(format!(
                "seasonal smoothing needs seasonal_periods >= 2, got {}",
                structure.period
            )));
        }
        if values.len() < 2 * structure.period {
            warn!(
                n = values.len(),
                period = structure.period,
                "fewer than two full seasons, falling back to simple exponential smoothing"
            );
            return Ok(Structure::SIMPLE);
        }
        if structure.seasonal == SeasonalType::Multiplicative && values.iter().any(|y| *y <= 0.0) {
            warn!("multiplicative seasonality needs positive data, falling back to simple exponential smoothing");
            return Ok(Structure::SIMPLE);
        }
        Ok(structure)
    }

    fn initialize_state(values: &[f64], structure: Structure) -> (f64, f64, Vec<f64>) {
        if !structure.is_seasonal() {
            let trend = if structure.trend && values.len() > 1 {
                values[1] - values[0]
            } else {
                0.0
            };
            return (values[0], trend, Vec::new());
        }

        let period = structure.period;
        let first_season = &values[..period];
        let level = first_season.iter().sum::<f64>() / period as f64;

        // average per-step change between the first two seasons
        let trend = if structure.trend {
            (0..period)
                .map(|i| (values[period + i] - values[i]) / period as f64)
                .sum::<f64>()
                / period as f64
        } else {
            0.0
        };

        let mut seasonals: Vec<f64> = match structure.seasonal {
            SeasonalType::Multiplicative => first_season
                .iter()
                .map(|y| if level.abs() > 1e-10 { y / level } else { 1.0 })
                .collect(),
            _ => first_season.iter().map(|y| y - level).collect(),
        };
        normalize_seasonals(&mut seasonals, structure.seasonal);
        (level, trend, seasonals)
    }

    fn smooth(values: &[f64], structure: Structure, params: SmoothingParams) -> Pass {
        let (mut level, mut trend, mut seasonals) = Self::initialize_state(values, structure);
        let start = if structure.is_seasonal() {
            structure.period
        } else {
            1
        };
        let alpha = params.alpha;
        let beta = params.beta.unwrap_or(0.0);
        let gamma = params.gamma.unwrap_or(0.0);

        let mut fitted = vec![f64::NAN; values.len()];
        let mut sse = 0.0;

        for (t, &y) in values.iter().enumerate().skip(start) {
            let idx = t % structure.period;
            let level_prev = level;
            let forecast = match structure.seasonal {
                SeasonalType::None => level + trend,
                SeasonalType::Additive => level + trend + seasonals[idx],
                SeasonalType::Multiplicative => (level + trend) * seasonals[idx],
            };
            fitted[t] = forecast;
            sse += (y - forecast).powi(2);

            match structure.seasonal {
                SeasonalType::None => {
                    level = alpha * y + (1.0 - alpha) * (level_prev + trend);
                }
                SeasonalType::Additive => {
                    let s = seasonals[idx];
                    level = alpha * (y - s) + (1.0 - alpha) * (level_prev + trend);
                    seasonals[idx] = gamma * (y - level) + (1.0 - gamma) * s;
                }
                SeasonalType::Multiplicative => {
                    let s = seasonals[idx];
                    let deseasonalized = if s.abs() > 1e-10 { y / s } else { y };
                    level = alpha * deseasonalized + (1.0 - alpha) * (level_prev + trend);
                    if level.abs() > 1e-10 {
                        seasonals[idx] = gamma * (y / level) + (1.0 - gamma) * s;
                    }
                }
            }
            if structure.trend {
                trend = beta * (level - level_prev) + (1.0 - beta) * trend;
            }
        }

        Pass {
            sse,
            level,
            trend,
            seasonals,
            fitted,
        }
    }

    fn point_forecast(&self, horizon: usize) -> Result<Vec<f64>> {
        let level = self.level.ok_or(ForecastError::FitRequired)?;
        let structure = self.structure.ok_or(ForecastError::FitRequired)?;
        Ok((1..=horizon)
            .map(|h| {
                let base = level + h as f64 * self.slope;
                let idx = (self.n - 1 + h) % structure.period;
                match structure.seasonal {
                    SeasonalType::None => base,
                    SeasonalType::Additive => base + self.seasonals[idx],
                    SeasonalType::Multiplicative => base * self.seasonals[idx],
                }
            })
            .collect())
    }
}

impl Default for ExponentialSmoothing {
    fn default() -> Self {
        Self::simple()
    }
}

/// Additive indices sum to zero; multiplicative indices average to one.
fn normalize_seasonals(seasonals: &mut [f64], seasonal_type: SeasonalType) {
    let period = seasonals.len();
    if period == 0 {
        return;
    }
    let mean = seasonals.iter().sum::<f64>() / period as f64;
    match seasonal_type {
        SeasonalType::Multiplicative if mean.abs() > 1e-10 => {
            seasonals.iter_mut().for_each(|s| *s /= mean);
        }
        SeasonalType::Additive => seasonals.iter_mut().for_each(|s| *s -= mean),
        _ => {}
    }
}

impl Forecaster for ExponentialSmoothing {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let values = training_values(series)?;
        if values.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: values.len(),
            });
        }

        let structure = self.requested_structure(&values)?;
        let n_params = structure.n_params();
        let minimum = minimize_in_box(
            |p| Self::smooth(&values, structure, structure.params(p)).sse,
            &INITIAL_PARAMS[..n_params],
            &vec![PARAM_BOUNDS; n_params],
            SimplexSettings {
                max_iter: 1000,
                ..SimplexSettings::default()
            },
        );
        let params = structure.params(&minimum.point);
        let pass = Self::smooth(&values, structure, params);
        if !pass.sse.is_finite() {
            return Err(ForecastError::ComputationError(
                "exponential smoothing diverged".to_string(),
            ));
        }

        let residuals: Vec<f64> = values
            .iter()
            .zip(&pass.fitted)
            .map(|(y, f)| y - f)
            .collect();

        self.sigma = residual_sigma(&residuals);
        self.structure = Some(structure);
        self.params = Some(params);
        self.level = Some(pass.level);
        self.slope = pass.trend;
        self.seasonals = pass.seasonals;
        self.fitted = Some(pass.fitted);
        self.residuals = Some(residuals);
        self.n = values.len();
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        Ok(Forecast::from_values(self.point_forecast(horizon)?))
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        let point = self.point_forecast(horizon)?;
        normal_intervals(point, self.sigma, level, |h| (h as f64).sqrt())
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "ExponentialSmoothing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn series(values: Vec<f64>) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = (0..values.len())
            .map(|i| start + Duration::days(i as i64))
            .collect();
        TimeSeries::new(ts, values).unwrap()
    }

    #[test]
    fn holt_recovers_linear_trend() {
        let values: Vec<f64> = (0..30).map(|t| 10.0 + 2.0 * t as f64).collect();
        let mut model = ExponentialSmoothing::holt();
        model.fit(&series(values)).unwrap();
        let fc = model.predict(3).unwrap();
        for (h, p) in fc.point().iter().enumerate() {
            assert_relative_eq!(*p, 10.0 + 2.0 * (30 + h) as f64, epsilon = 1e-6);
        }
        assert!(model.params().unwrap().beta.is_some());
        assert!(model.params().unwrap().gamma.is_none());
    }

    #[test]
    fn additive_season_is_reproduced() {
        let pattern = [21.0, 19.0, 22.0, 18.0];
        let values: Vec<f64> = (0..40).map(|t| pattern[t % 4]).collect();
        let mut model = ExponentialSmoothing::new(TrendType::None, SeasonalType::Additive, 4);
        model.fit(&series(values)).unwrap();
        assert_eq!(model.seasonals().len(), 4);
        let fc = model.predict(6).unwrap();
        for (h, p) in fc.point().iter().enumerate() {
            assert_relative_eq!(*p, pattern[(40 + h) % 4], epsilon = 1e-6);
        }
        assert!(!model.used_fallback());
    }

    #[test]
    fn multiplicative_season_is_reproduced() {
        let factors = [1.2, 0.8, 1.1, 0.9];
        let values: Vec<f64> = (0..32).map(|t| 50.0 * factors[t % 4]).collect();
        let mut model =
            ExponentialSmoothing::new(TrendType::None, SeasonalType::Multiplicative, 4);
        model.fit(&series(values)).unwrap();
        let fc = model.predict(4).unwrap();
        for (h, p) in fc.point().iter().enumerate() {
            assert_relative_eq!(*p, 50.0 * factors[h % 4], epsilon = 1e-6);
        }
    }

    #[test]
    fn short_history_falls_back_to_simple_smoothing() {
        let mut model = ExponentialSmoothing::new(TrendType::Additive, SeasonalType::Additive, 12);
        model.fit(&series((0..10).map(|t| t as f64).collect())).unwrap();
        assert!(model.used_fallback());
        let params = model.params().unwrap();
        assert!(params.beta.is_none() && params.gamma.is_none());
        let fc = model.predict(3).unwrap();
        assert_relative_eq!(fc.point()[0], fc.point()[2]);
    }

    #[test]
    fn multiplicative_on_non_positive_data_falls_back() {
        let values: Vec<f64> = (0..24).map(|t| (t % 4) as f64 - 1.0).collect();
        let mut model =
            ExponentialSmoothing::new(TrendType::None, SeasonalType::Multiplicative, 4);
        model.fit(&series(values)).unwrap();
        assert!(model.used_fallback());
    }

    #[test]
    fn constant_series_gives_flat_forecast_and_zero_width() {
        let mut model = ExponentialSmoothing::simple();
        model.fit(&series(vec![5.0; 20])).unwrap();
        let fc = model.predict_with_intervals(3, 0.9).unwrap();
        for p in fc.point() {
            assert_relative_eq!(*p, 5.0, epsilon = 1e-10);
        }
        assert_eq!(fc.lower().unwrap(), fc.point());
        assert!(!model.used_fallback());
    }

    #[test]
    fn intervals_widen_with_sqrt_horizon() {
        let values: Vec<f64> = (0..50).map(|t| 10.0 + ((t * 7) % 5) as f64).collect();
        let mut model = ExponentialSmoothing::simple();
        model.fit(&series(values)).unwrap();
        let fc = model.predict_with_intervals(4, 0.95).unwrap();
        let half = |i: usize| fc.upper().unwrap()[i] - fc.point()[i];
        assert!(half(0) > 0.0);
        assert_relative_eq!(half(3) / half(0), 2.0, epsilon = 1e-9);
        assert_eq!(fc.level(), Some(0.95));
    }

    #[test]
    fn errors() {
        let model = ExponentialSmoothing::simple();
        assert_eq!(model.predict(1).unwrap_err(), ForecastError::FitRequired);

        let mut tiny = ExponentialSmoothing::simple();
        assert!(matches!(
            tiny.fit(&series(vec![1.0])),
            Err(ForecastError::InsufficientData { needed: 2, got: 1 })
        ));

        let mut bad_period = ExponentialSmoothing::new(TrendType::None, SeasonalType::Additive, 1);
        assert!(bad_period
            .fit(&series(vec![1.0; 10]))
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn component_names_parse() {
        assert_eq!(
            serde_yaml::from_str::<TrendType>("add").unwrap(),
            TrendType::Additive
        );
        assert_eq!(
            serde_yaml::from_str::<SeasonalType>("mul").unwrap(),
            SeasonalType::Multiplicative
        );
        assert_eq!(
            serde_yaml::from_str::<SeasonalType>("none").unwrap(),
            SeasonalType::None
        );
    }
}
