//! Naive and seasonal naive forecasting.
//!
//! Period 1 repeats the last observation; period `m` tiles the last `m`
//! observations.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::{normal_intervals, residual_sigma, training_values};
use crate::models::Forecaster;

/// Naive forecaster with an optional seasonal period.
#[derive(Debug, Clone)]
pub struct Naive {
    period: usize,
    history: Option<Vec<f64>>,
    fitted: Option<Vec<f64>>,
    residuals: Option<Vec<f64>>,
    sigma: Option<f64>,
}

impl Naive {
    /// Last-value naive forecaster.
    pub fn new() -> Self {
        Self::seasonal(1)
    }

    /// Seasonal naive forecaster with period `period` (0 is treated as 1).
    pub fn seasonal(period: usize) -> Self {
        Self {
            period: period.max(1),
            history: None,
            fitted: None,
            residuals: None,
            sigma: None,
        }
    }

    /// Get the seasonal period.
    pub fn period(&self) -> usize {
        self.period
    }

    fn point_forecast(&self, history: &[f64], horizon: usize) -> Vec<f64> {
        let base = history.len() - self.period;
        (0..horizon)
            .map(|h| history[base + h % self.period])
            .collect()
    }
}

impl Default for Naive {
    fn default() -> Self {
        Self::new()
    }
}

impl Forecaster for Naive {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let values = training_values(series)?;
        if values.len() < self.period {
            return Err(ForecastError::InsufficientData {
                needed: self.period,
                got: values.len(),
            });
        }

        // y_hat[t] = y[t - period]
        let fitted: Vec<f64> = (0..values.len())
            .map(|i| {
                if i < self.period {
                    f64::NAN
                } else {
                    values[i - self.period]
                }
            })
            .collect();
        let residuals: Vec<f64> = values.iter().zip(&fitted).map(|(y, f)| y - f).collect();

        self.sigma = Some(residual_sigma(&residuals));
        self.history = Some(values);
        self.fitted = Some(fitted);
        self.residuals = Some(residuals);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let history = self.history.as_ref().ok_or(ForecastError::FitRequired)?;
        Ok(Forecast::from_values(self.point_forecast(history, horizon)))
    }

    fn predict_with_intervals(&self, horizon: usize, level: f64) -> Result<Forecast> {
        let history = self.history.as_ref().ok_or(ForecastError::FitRequired)?;
        let sigma = self.sigma.unwrap_or(0.0);
        let point = self.point_forecast(history, horizon);
        let period = self.period;
        normal_intervals(point, sigma, level, |h| {
            if period == 1 {
                (h as f64).sqrt()
            } else {
                // complete seasons ahead
                (((h - 1) / period + 1) as f64).sqrt()
            }
        })
    }

    fn fitted_values(&self) -> Option<&[f64]> {
        self.fitted.as_deref()
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        if self.period == 1 {
            "Naive"
        } else {
            "SeasonalNaive"
        }
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
            .map(|i| start + Duration::hours(i as i64))
            .collect();
        TimeSeries::new(ts, values).unwrap()
    }

    #[test]
    fn naive_repeats_last_value() {
        let mut model = Naive::new();
        model.fit(&series(vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(model.predict(3).unwrap().point(), &[3.0, 3.0, 3.0]);
        assert_eq!(model.name(), "Naive");
    }

    #[test]
    fn seasonal_naive_tiles_last_season() {
        let mut model = Naive::seasonal(4);
        model
            .fit(&series(vec![9.0, 9.0, 1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        assert_eq!(
            model.predict(6).unwrap().point(),
            &[1.0, 2.0, 3.0, 4.0, 1.0, 2.0]
        );
        assert_eq!(model.name(), "SeasonalNaive");
        assert!(model.fitted_values().unwrap()[3].is_nan());
        assert_relative_eq!(model.residuals().unwrap()[4], 3.0 - 9.0);
    }

    #[test]
    fn naive_interval_grows_with_sqrt_h() {
        let mut model = Naive::new();
        // residuals are all 1 after the first
        model.fit(&series(vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        let fc = model.predict_with_intervals(4, 0.95).unwrap();
        let width = |i: usize| fc.upper().unwrap()[i] - fc.point()[i];
        assert_relative_eq!(width(3) / width(0), 2.0, epsilon = 1e-10);
    }

    #[test]
    fn seasonal_interval_steps_per_season() {
        let mut model = Naive::seasonal(2);
        model.fit(&series(vec![1.0, 5.0, 2.0, 6.0, 3.0, 7.0])).unwrap();
        let fc = model.predict_with_intervals(4, 0.8).unwrap();
        let width = |i: usize| fc.upper().unwrap()[i] - fc.point()[i];
        assert_relative_eq!(width(0), width(1), epsilon = 1e-10);
        assert_relative_eq!(width(2) / width(0), 2f64.sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn errors() {
        let model = Naive::new();
        assert_eq!(model.predict(1).unwrap_err(), ForecastError::FitRequired);
        let mut seasonal = Naive::seasonal(7);
        assert!(matches!(
            seasonal.fit(&series(vec![1.0, 2.0])),
            Err(ForecastError::InsufficientData { needed: 7, got: 2 })
        ));
    }

    #[test]
    fn gaps_are_interpolated_before_fitting() {
        let mut model = Naive::new();
        model.fit(&series(vec![1.0, 2.0, f64::NAN])).unwrap();
        assert_eq!(model.predict(1).unwrap().point(), &[2.0]);
    }
}
