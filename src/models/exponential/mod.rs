//! Exponential smoothing models.

mod holt_winters;

pub use holt_winters::{ExponentialSmoothing, SeasonalType, SmoothingParams, TrendType};
