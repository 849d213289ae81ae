//! Leakage-safe feature engineering.
//!
//! Every derived column at row `r` depends either on the timestamp of `r`
//! alone (calendar, Fourier, holiday and promotion features) or on target
//! values at or before `r` within the same series (lag and rolling
//! features).
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use forecast_lab::core::Frame;
//! use forecast_lab::features::{build_features, FeatureConfig};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let ts = (0..10).map(|i| start + Duration::days(i)).collect();
//! let frame = Frame::new(None, ts, "y", (0..10).map(|i| i as f64).collect()).unwrap();
//!
//! let config = FeatureConfig { lags: vec![1], ..FeatureConfig::default() };
//! let features = build_features(&frame, &config).unwrap();
//! assert_eq!(features.column("lag_1").unwrap()[5], 4.0);
//! ```

pub mod calendar;
pub mod fourier;
pub mod holidays;
pub mod lags;
pub mod pipeline;
pub mod promos;

/// Named output columns of a feature stage, in output order.
pub type FeatureColumns = Vec<(String, Vec<f64>)>;

pub use calendar::{calendar_features, CALENDAR_COLUMNS};
pub use fourier::{fourier_features, FourierSpec};
pub use holidays::{holiday_features, HolidayCalendar, HolidaySpec, RuleBasedCalendar};
pub use lags::{is_history_column, lag_features, rolling_features, RollStat, RollingSpec};
pub use pipeline::{build_features, FeatureConfig, FeaturePipeline, FeatureStage, StageDescriptor};
pub use promos::{promo_features, PromoSpec};
