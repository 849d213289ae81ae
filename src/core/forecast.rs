//! Forecast result structure for holding predictions.

use crate::error::{ForecastError, Result};

/// Point predictions with optional interval bounds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    point: Vec<f64>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
    level: Option<f64>,
}

impl Forecast {
    /// Create a forecast from point predictions.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            point: values,
            ..Self::default()
        }
    }

    /// Create a forecast with prediction intervals at coverage `level`.
    pub fn from_values_with_intervals(
        values: Vec<f64>,
        lower: Vec<f64>,
        upper: Vec<f64>,
        level: f64,
    ) -> Result<Self> {
        for bound in [&lower, &upper] {
            if bound.len() != values.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: values.len(),
                    got: bound.len(),
                });
            }
        }
        Ok(Self {
            point: values,
            lower: Some(lower),
            upper: Some(upper),
            level: Some(level),
        })
    }

    /// Number of forecast steps.
    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }

    pub fn point(&self) -> &[f64] {
        &self.point
    }

    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }

    /// Coverage level the intervals were built for.
    pub fn level(&self) -> Option<f64> {
        self.level
    }

    pub fn has_intervals(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_only_forecast() {
        let f = Forecast::from_values(vec![1.0, 2.0]);
        assert_eq!(f.horizon(), 2);
        assert!(!f.has_intervals());
        assert!(f.lower().is_none());
        assert!(Forecast::default().is_empty());
    }

    #[test]
    fn interval_lengths_are_checked() {
        let f = Forecast::from_values_with_intervals(
            vec![1.0, 2.0],
            vec![0.0, 1.0],
            vec![2.0, 3.0],
            0.95,
        )
        .unwrap();
        assert!(f.has_intervals());
        assert_eq!(f.upper().unwrap(), &[2.0, 3.0]);
        assert_eq!(f.level(), Some(0.95));

        let err = Forecast::from_values_with_intervals(vec![1.0], vec![], vec![2.0], 0.9);
        assert!(matches!(err, Err(ForecastError::DimensionMismatch { .. })));
    }
}
