//! Core data structures: panel frames, single series, forecasts and
//! sampling frequencies.

mod forecast;
mod frame;
mod frequency;
mod time_series;
mod timestamp;

pub use forecast::Forecast;
pub use frame::{Frame, SeriesRange};
pub use frequency::Frequency;
pub use time_series::TimeSeries;
pub use timestamp::parse_timestamp;

pub(crate) use time_series::interpolate_series;
