//! Sampling frequency: inference from timestamps, flooring and stepping.

use crate::error::{ForecastError, Result};
use crate::utils::stats::median;
use chrono::{DateTime, Datelike, Duration, DurationRound, Months, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Regular sampling frequency of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "T", alias = "min")]
    Minute,
    #[serde(rename = "H", alias = "h")]
    Hour,
    #[serde(rename = "D", alias = "d")]
    Day,
    #[serde(rename = "W", alias = "w")]
    Week,
    #[serde(rename = "M", alias = "MS")]
    Month,
}

impl Frequency {
    /// Infer the frequency from the median spacing of `timestamps`.
    ///
    /// Spacing below two minutes is minutely, below two hours hourly, below
    /// two days daily, below eight days weekly, anything longer monthly.
    pub fn infer(timestamps: &[DateTime<Utc>]) -> Result<Self> {
        if timestamps.len() < 2 {
            return Err(ForecastError::InsufficientData {
                needed: 2,
                got: timestamps.len(),
            });
        }
        let diffs: Vec<f64> = timestamps
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds().abs() as f64)
            .collect();
        Ok(Self::from_spacing(median(&diffs)))
    }

    /// Frequency for a typical spacing of `seconds` between observations.
    pub fn from_spacing(seconds: f64) -> Self {
        if seconds < 120.0 {
            Frequency::Minute
        } else if seconds < 7_200.0 {
            Frequency::Hour
        } else if seconds < 172_800.0 {
            Frequency::Day
        } else if seconds < 691_200.0 {
            Frequency::Week
        } else {
            Frequency::Month
        }
    }

    /// Start of the period containing `ts`. Weeks start on Monday.
    pub fn floor(&self, ts: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let truncated = match self {
            Frequency::Minute => ts.duration_trunc(Duration::minutes(1)),
            Frequency::Hour => ts.duration_trunc(Duration::hours(1)),
            Frequency::Day => ts.duration_trunc(Duration::days(1)),
            Frequency::Week => {
                let back = Duration::days(ts.weekday().num_days_from_monday() as i64);
                (ts - back).duration_trunc(Duration::days(1))
            }
            Frequency::Month => {
                return Utc
                    .with_ymd_and_hms(ts.year(), ts.month(), 1, 0, 0, 0)
                    .single()
                    .ok_or_else(|| ForecastError::Data(format!("cannot floor {ts} to month")));
            }
        };
        truncated.map_err(|e| ForecastError::Data(format!("cannot floor {ts}: {e}")))
    }

    /// `ts` advanced by `n` periods.
    pub fn step(&self, ts: DateTime<Utc>, n: u32) -> Result<DateTime<Utc>> {
        let stepped = match self {
            Frequency::Minute => ts.checked_add_signed(Duration::minutes(n as i64)),
            Frequency::Hour => ts.checked_add_signed(Duration::hours(n as i64)),
            Frequency::Day => ts.checked_add_signed(Duration::days(n as i64)),
            Frequency::Week => ts.checked_add_signed(Duration::weeks(n as i64)),
            Frequency::Month => ts.checked_add_months(Months::new(n)),
        };
        stepped.ok_or_else(|| ForecastError::Data(format!("timestamp overflow stepping {ts}")))
    }

    /// Short code used in configuration files.
    pub fn code(&self) -> &'static str {
        match self {
            Frequency::Minute => "T",
            Frequency::Hour => "H",
            Frequency::Day => "D",
            Frequency::Week => "W",
            Frequency::Month => "M",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Frequency {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "T" | "min" => Ok(Frequency::Minute),
            "H" | "h" => Ok(Frequency::Hour),
            "D" | "d" => Ok(Frequency::Day),
            "W" | "w" => Ok(Frequency::Week),
            "M" | "MS" => Ok(Frequency::Month),
            other => Err(ForecastError::Configuration(format!(
                "unknown frequency '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn infers_from_median_spacing() {
        let start = at(2024, 1, 1, 0, 0);
        let hourly: Vec<_> = (0..10).map(|i| start + Duration::hours(i)).collect();
        assert_eq!(Frequency::infer(&hourly).unwrap(), Frequency::Hour);

        let mut daily: Vec<_> = (0..10).map(|i| start + Duration::days(i)).collect();
        // one gap does not move the median
        daily.push(start + Duration::days(30));
        assert_eq!(Frequency::infer(&daily).unwrap(), Frequency::Day);

        let weekly: Vec<_> = (0..5).map(|i| start + Duration::weeks(i)).collect();
        assert_eq!(Frequency::infer(&weekly).unwrap(), Frequency::Week);

        let monthly = vec![at(2024, 1, 1, 0, 0), at(2024, 2, 1, 0, 0), at(2024, 3, 1, 0, 0)];
        assert_eq!(Frequency::infer(&monthly).unwrap(), Frequency::Month);

        assert!(Frequency::infer(&[start]).is_err());
    }

    #[test]
    fn floors_to_period_start() {
        let ts = at(2024, 5, 15, 13, 47); // Wednesday
        assert_eq!(Frequency::Hour.floor(ts).unwrap(), at(2024, 5, 15, 13, 0));
        assert_eq!(Frequency::Day.floor(ts).unwrap(), at(2024, 5, 15, 0, 0));
        assert_eq!(Frequency::Week.floor(ts).unwrap(), at(2024, 5, 13, 0, 0));
        assert_eq!(Frequency::Month.floor(ts).unwrap(), at(2024, 5, 1, 0, 0));
    }

    #[test]
    fn steps_calendar_months() {
        let ts = at(2024, 1, 31, 0, 0);
        assert_eq!(Frequency::Month.step(ts, 1).unwrap(), at(2024, 2, 29, 0, 0));
        assert_eq!(Frequency::Day.step(ts, 2).unwrap(), at(2024, 2, 2, 0, 0));
    }

    #[test]
    fn parses_codes() {
        assert_eq!("D".parse::<Frequency>().unwrap(), Frequency::Day);
        assert_eq!("min".parse::<Frequency>().unwrap(), Frequency::Minute);
        assert!("fortnight".parse::<Frequency>().unwrap_err().is_configuration());
        let parsed: Frequency = serde_yaml::from_str("H").unwrap();
        assert_eq!(parsed, Frequency::Hour);
    }
}
