//! Seeded synthetic panels and weather covariates for demos, tests and
//! benchmarks.

use crate::core::{Frame, Frequency};
use crate::error::{ForecastError, Result};
use crate::features::FeatureColumns;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Columns produced by [`synthetic_weather`].
pub const WEATHER_COLUMNS: [&str; 3] = ["temperature", "wind_speed", "humidity"];

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Shape of a synthetic panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub n_series: usize,
    /// Observations per series.
    pub length: usize,
    pub start: DateTime<Utc>,
    pub freq: Frequency,
    /// Base level of the first series; series `i` is scaled by `1 + 0.1·i`.
    pub level: f64,
    /// Level change per day.
    pub trend: f64,
    pub weekly_amplitude: f64,
    pub yearly_amplitude: f64,
    pub noise_std: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_series: 3,
            length: 730,
            start: Utc
                .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            freq: Frequency::Day,
            level: 100.0,
            trend: 0.05,
            weekly_amplitude: 10.0,
            yearly_amplitude: 20.0,
            noise_std: 2.0,
            seed: 42,
        }
    }
}

fn normal(mean: f64, std: f64) -> Result<Normal> {
    Normal::new(mean, std)
        .map_err(|e| ForecastError::Configuration(format!("invalid noise distribution: {e}")))
}

/// Panel of `n_series` series with trend, weekly and yearly seasonality and
/// Gaussian noise. The same configuration always yields the same frame.
pub fn synthetic_panel(config: &SyntheticConfig) -> Result<Frame> {
    if config.n_series == 0 || config.length == 0 {
        return Err(ForecastError::EmptyData);
    }
    let mut grid = Vec::with_capacity(config.length);
    for k in 0..config.length {
        let k = u32::try_from(k)
            .map_err(|_| ForecastError::Configuration(format!("length {} too large", config.length)))?;
        grid.push(config.freq.step(config.start, k)?);
    }

    let noise = normal(0.0, config.noise_std.max(f64::MIN_POSITIVE))?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut ids = Vec::with_capacity(config.n_series * config.length);
    let mut timestamps = Vec::with_capacity(ids.capacity());
    let mut values = Vec::with_capacity(ids.capacity());

    for s in 0..config.n_series {
        let level = config.level * (1.0 + 0.1 * s as f64);
        let phase = s as f64 * PI / 7.0;
        let id = format!("series_{s:03}");
        for &ts in &grid {
            let days = (ts - config.start).num_seconds() as f64 / SECONDS_PER_DAY;
            let weekly = config.weekly_amplitude * (2.0 * PI * days / 7.0 + phase).sin();
            let yearly = config.yearly_amplitude * (2.0 * PI * days / 365.25).sin();
            let eps = if config.noise_std > 0.0 {
                noise.sample(&mut rng)
            } else {
                0.0
            };
            ids.push(id.clone());
            timestamps.push(ts);
            values.push(level + config.trend * days + weekly + yearly + eps);
        }
    }

    let ids = (config.n_series > 1).then_some(ids);
    Frame::new(ids, timestamps, "y", values)
}

/// Temperature, wind speed and humidity covariates for `timestamps`.
///
/// Rows sharing a timestamp get the same values. Temperature follows a
/// yearly and a daily cycle; humidity moves against temperature; both
/// carry Gaussian noise and are clipped to plausible ranges.
pub fn synthetic_weather(timestamps: &[DateTime<Utc>], seed: u64) -> Result<FeatureColumns> {
    let mut unique: Vec<DateTime<Utc>> = timestamps.to_vec();
    unique.sort();
    unique.dedup();

    let standard = normal(0.0, 1.0)?;
    let mut temp_rng = StdRng::seed_from_u64(seed);
    let mut wind_rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut humid_rng = StdRng::seed_from_u64(seed.wrapping_add(2));
    let draw = |rng: &mut StdRng| standard.sample(rng);

    let mut by_time: BTreeMap<DateTime<Utc>, [f64; 3]> = BTreeMap::new();
    for ts in unique {
        let day_of_year = ts.ordinal() as f64;
        let hour = ts.hour() as f64;
        let temperature = 10.0
            + 10.0 * (2.0 * PI * (day_of_year - 80.0) / 365.0).sin()
            - 3.0 * (2.0 * PI * hour / 24.0).cos()
            + 2.0 * draw(&mut temp_rng);
        let wind_speed = (5.0 + 3.0 * draw(&mut wind_rng)).clamp(0.0, 25.0);
        let humidity = (70.0 - 0.5 * temperature + 10.0 * draw(&mut humid_rng)).clamp(30.0, 100.0);
        by_time.insert(ts, [temperature, wind_speed, humidity]);
    }

    Ok(WEATHER_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values = timestamps
                .iter()
                .map(|ts| by_time.get(ts).map_or(f64::NAN, |row| row[i]))
                .collect();
            (name.to_string(), values)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::stats::{mean, std_dev};

    #[test]
    fn panel_is_reproducible() {
        let config = SyntheticConfig {
            length: 100,
            ..SyntheticConfig::default()
        };
        let a = synthetic_panel(&config).unwrap();
        let b = synthetic_panel(&config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 300);
        assert!(a.is_sorted());
        assert_eq!(a.series_id(100), Some("series_001"));

        let other = synthetic_panel(&SyntheticConfig { seed: 7, ..config }).unwrap();
        assert_ne!(a.target(), other.target());
    }

    #[test]
    fn noiseless_series_follows_components() {
        let config = SyntheticConfig {
            n_series: 1,
            length: 14,
            noise_std: 0.0,
            yearly_amplitude: 0.0,
            trend: 0.0,
            ..SyntheticConfig::default()
        };
        let frame = synthetic_panel(&config).unwrap();
        assert!(!frame.is_panel());
        let y = frame.target();
        for t in 0..7 {
            approx::assert_relative_eq!(y[t], y[t + 7], epsilon = 1e-9);
        }
        approx::assert_relative_eq!(mean(y), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_panel_is_rejected() {
        let config = SyntheticConfig {
            n_series: 0,
            ..SyntheticConfig::default()
        };
        assert_eq!(synthetic_panel(&config).unwrap_err(), ForecastError::EmptyData);
    }

    #[test]
    fn weather_is_shared_per_timestamp_and_clipped() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let grid: Vec<_> = (0..500).map(|h| start + chrono::Duration::hours(h)).collect();
        let mut rows = grid.clone();
        rows.extend_from_slice(&grid);

        let weather = synthetic_weather(&rows, 42).unwrap();
        let names: Vec<&str> = weather.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, WEATHER_COLUMNS.to_vec());
        for (_, values) in &weather {
            assert_eq!(values.len(), 1000);
            assert_eq!(values[3], values[503]);
        }
        assert!(weather[1].1.iter().all(|w| (0.0..=25.0).contains(w)));
        assert!(weather[2].1.iter().all(|h| (30.0..=100.0).contains(h)));
        // January is cold in this climate
        assert!(mean(&weather[0].1) < 5.0);
        assert!(std_dev(&weather[0].1) > 1.0);
    }
}
