//! Frame-level cleanup: frequency inference, gap filling, calendar
//! alignment and standard scaling.

use crate::core::{interpolate_series, Frame, Frequency};
use crate::error::{ForecastError, Result};
use crate::utils::stats::{finite_values, mean, median, population_std};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Infer the sampling frequency of a frame from the median spacing of
/// consecutive timestamps within each series.
pub fn infer_frequency(frame: &Frame) -> Result<Frequency> {
    let mut diffs: Vec<f64> = Vec::new();
    for rows in frame.series_row_groups()? {
        diffs.extend(rows.windows(2).map(|w| {
            let ts = frame.timestamps();
            (ts[w[1]] - ts[w[0]]).num_seconds() as f64
        }));
    }
    if diffs.is_empty() {
        return Err(ForecastError::InsufficientData {
            needed: 2,
            got: frame.len(),
        });
    }
    Ok(Frequency::from_spacing(median(&diffs)))
}

/// How missing values are filled after the time grid is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMethod {
    /// Carry the last observed value forward.
    #[default]
    Ffill,
    /// Carry the next observed value backward.
    Bfill,
    /// Linear interpolation between observed values.
    Interpolate,
    Zero,
}

impl FillMethod {
    pub fn name(&self) -> &'static str {
        match self {
            FillMethod::Ffill => "ffill",
            FillMethod::Bfill => "bfill",
            FillMethod::Interpolate => "interpolate",
            FillMethod::Zero => "zero",
        }
    }

    fn fill(&self, values: &mut Vec<f64>) {
        match self {
            FillMethod::Ffill => {
                let mut last = f64::NAN;
                for v in values.iter_mut() {
                    if v.is_nan() {
                        *v = last;
                    } else {
                        last = *v;
                    }
                }
            }
            FillMethod::Bfill => {
                let mut next = f64::NAN;
                for v in values.iter_mut().rev() {
                    if v.is_nan() {
                        *v = next;
                    } else {
                        next = *v;
                    }
                }
            }
            FillMethod::Interpolate => *values = interpolate_series(values, false),
            FillMethod::Zero => values.iter_mut().filter(|v| v.is_nan()).for_each(|v| *v = 0.0),
        }
    }
}

impl fmt::Display for FillMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FillMethod {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ffill" => Ok(FillMethod::Ffill),
            "bfill" => Ok(FillMethod::Bfill),
            "interpolate" => Ok(FillMethod::Interpolate),
            "zero" => Ok(FillMethod::Zero),
            other => Err(ForecastError::Configuration(format!(
                "unknown fill method '{other}'"
            ))),
        }
    }
}

/// Complete every series to a regular grid from its first to its last
/// timestamp and fill missing values in the target and every covariate.
///
/// The frequency is inferred when `freq` is `None`. Rows that do not fall on
/// the grid are dropped. Interpolation leaves leading and trailing gaps
/// missing. The result is sorted.
pub fn fill_time_gaps(frame: &Frame, freq: Option<Frequency>, method: FillMethod) -> Result<Frame> {
    let freq = match freq {
        Some(freq) => freq,
        None => infer_frequency(frame)?,
    };
    let names: Vec<String> = frame.column_names().into_iter().map(String::from).collect();
    let sources: Vec<&[f64]> = names
        .iter()
        .map(|n| frame.require_column(n))
        .collect::<Result<_>>()?;

    let mut ids: Vec<String> = Vec::new();
    let mut timestamps: Vec<DateTime<Utc>> = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    let mut off_grid = 0usize;

    for rows in frame.series_row_groups()? {
        let ts = frame.timestamps();
        let (Some(&first), Some(&last)) = (rows.first(), rows.last()) else {
            continue;
        };
        let (start, end) = (ts[first], ts[last]);

        let mut grid = Vec::new();
        let mut k = 0u32;
        loop {
            let point = freq.step(start, k)?;
            if point > end {
                break;
            }
            grid.push(point);
            k += 1;
        }

        let mut filled: Vec<Vec<f64>> = vec![vec![f64::NAN; grid.len()]; names.len()];
        let mut cursor = 0;
        for &row in &rows {
            while cursor < grid.len() && grid[cursor] < ts[row] {
                cursor += 1;
            }
            if cursor < grid.len() && grid[cursor] == ts[row] {
                for (dst, src) in filled.iter_mut().zip(&sources) {
                    dst[cursor] = src[row];
                }
            } else {
                off_grid += 1;
            }
        }
        for values in filled.iter_mut() {
            method.fill(values);
        }

        if let Some(id) = frame.series_id(first) {
            ids.extend(std::iter::repeat(id.to_string()).take(grid.len()));
        }
        timestamps.extend(grid);
        for (dst, src) in columns.iter_mut().zip(filled) {
            dst.extend(src);
        }
    }
    if off_grid > 0 {
        debug!(off_grid, freq = %freq, "dropped rows off the time grid");
    }

    let mut columns = columns.into_iter();
    let target = columns.next().unwrap_or_default();
    let mut out = Frame::new(
        frame.is_panel().then_some(ids),
        timestamps,
        frame.target_name(),
        target,
    )?;
    for (name, values) in names.iter().skip(1).zip(columns) {
        out.add_column(name.as_str(), values)?;
    }
    Ok(out)
}

/// Floor every timestamp to the start of its `freq` period.
///
/// Rows that land on the same period keep their own entries; follow with
/// [`Frame::dedup_last`] to collapse them.
pub fn align_calendars(frame: &Frame, freq: Frequency) -> Result<Frame> {
    let floored: Vec<DateTime<Utc>> = frame
        .timestamps()
        .iter()
        .map(|ts| freq.floor(*ts))
        .collect::<Result<_>>()?;
    let mut out = Frame::new(
        frame.series_ids().map(<[String]>::to_vec),
        floored,
        frame.target_name(),
        frame.target().to_vec(),
    )?;
    for name in frame.feature_names() {
        out.add_column(name, frame.require_column(name)?.to_vec())?;
    }
    Ok(out)
}

/// Per-column standardization fitted on one frame (typically a training
/// slice) and applied to any other frame with the same columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Column name to `(mean, scale)`.
    params: BTreeMap<String, (f64, f64)>,
}

impl StandardScaler {
    /// Fit mean and population standard deviation of `columns`, ignoring
    /// missing values. A constant column gets scale 1.
    pub fn fit(frame: &Frame, columns: &[&str]) -> Result<Self> {
        let mut params = BTreeMap::new();
        for &name in columns {
            let values = finite_values(frame.require_column(name)?);
            if values.is_empty() {
                return Err(ForecastError::Data(format!(
                    "cannot scale column '{name}' without observed values"
                )));
            }
            let std = population_std(&values);
            let scale = if std < 1e-10 { 1.0 } else { std };
            params.insert(name.to_string(), (mean(&values), scale));
        }
        Ok(Self { params })
    }

    pub fn columns(&self) -> Vec<&str> {
        self.params.keys().map(String::as_str).collect()
    }

    /// Fitted `(mean, scale)` of a column.
    pub fn params(&self, column: &str) -> Option<(f64, f64)> {
        self.params.get(column).copied()
    }

    /// Copy of `frame` with the fitted columns standardized.
    pub fn transform(&self, frame: &Frame) -> Result<Frame> {
        let mut out = frame.clone();
        for (name, &(center, scale)) in &self.params {
            let scaled = frame
                .require_column(name)?
                .iter()
                .map(|v| (v - center) / scale)
                .collect();
            out.add_column(name.as_str(), scaled)?;
        }
        Ok(out)
    }

    /// Map standardized values of `column` back to the original scale.
    pub fn inverse(&self, column: &str, values: &[f64]) -> Result<Vec<f64>> {
        let (center, scale) = self
            .params(column)
            .ok_or_else(|| ForecastError::missing_column(column))?;
        Ok(values.iter().map(|v| v * scale + center).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn day(d: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(d)
    }

    fn gappy_panel() -> Frame {
        let ids = ["a", "a", "a", "b", "b"].map(String::from).to_vec();
        let ts = vec![day(0), day(1), day(4), day(0), day(2)];
        Frame::new(Some(ids), ts, "y", vec![1.0, 2.0, 5.0, 10.0, 30.0])
            .unwrap()
            .with_column("price", vec![1.0, f64::NAN, 3.0, 7.0, 9.0])
            .unwrap()
    }

    #[test]
    fn infers_daily_panel() {
        assert_eq!(infer_frequency(&gappy_panel()).unwrap(), Frequency::Day);
        let single = Frame::new(None, vec![day(0)], "y", vec![1.0]).unwrap();
        assert!(infer_frequency(&single).is_err());
    }

    #[test]
    fn ffill_completes_each_series() {
        let filled = fill_time_gaps(&gappy_panel(), None, FillMethod::Ffill).unwrap();
        assert_eq!(filled.len(), 8);
        assert_eq!(filled.target(), &[1.0, 2.0, 2.0, 2.0, 5.0, 10.0, 10.0, 30.0][..]);
        assert_eq!(
            filled.column("price").unwrap(),
            &[1.0, 1.0, 1.0, 1.0, 3.0, 7.0, 7.0, 9.0][..]
        );
        assert_eq!(filled.series_id(5), Some("b"));
        assert_eq!(filled.timestamps()[3], day(3));
    }

    #[test]
    fn other_fill_methods() {
        let frame = gappy_panel();
        let interp = fill_time_gaps(&frame, Some(Frequency::Day), FillMethod::Interpolate).unwrap();
        assert_relative_eq!(interp.target()[2], 3.0);
        assert_relative_eq!(interp.target()[3], 4.0);
        assert_relative_eq!(interp.target()[6], 20.0);

        let back = fill_time_gaps(&frame, Some(Frequency::Day), FillMethod::Bfill).unwrap();
        assert_eq!(back.target()[2], 5.0);

        let zero = fill_time_gaps(&frame, Some(Frequency::Day), FillMethod::Zero).unwrap();
        assert_eq!(zero.target()[2], 0.0);
        assert_eq!(zero.column("price").unwrap()[1], 0.0);
    }

    #[test]
    fn fill_method_names() {
        assert_eq!("bfill".parse::<FillMethod>().unwrap(), FillMethod::Bfill);
        assert!("mean".parse::<FillMethod>().unwrap_err().is_configuration());
        assert_eq!(FillMethod::Interpolate.to_string(), "interpolate");
    }

    #[test]
    fn align_floors_timestamps() {
        let ts = vec![day(0) + Duration::minutes(90), day(1) + Duration::hours(23)];
        let frame = Frame::new(None, ts, "y", vec![1.0, 2.0]).unwrap();
        let aligned = align_calendars(&frame, Frequency::Day).unwrap();
        assert_eq!(aligned.timestamps(), &[day(0), day(1)][..]);
        let hourly = align_calendars(&frame, Frequency::Hour).unwrap();
        assert_eq!(hourly.timestamps()[0], day(0) + Duration::hours(1));
    }

    #[test]
    fn scaler_fits_on_train_only() {
        let frame = gappy_panel();
        let train = frame.slice(0..3);
        let scaler = StandardScaler::fit(&train, &["price"]).unwrap();
        let (center, scale) = scaler.params("price").unwrap();
        assert_relative_eq!(center, 2.0);
        assert_relative_eq!(scale, 1.0);

        let scaled = scaler.transform(&frame).unwrap();
        assert_relative_eq!(scaled.column("price").unwrap()[3], 5.0);
        assert!(scaled.column("price").unwrap()[1].is_nan());
        assert_eq!(scaled.target(), frame.target());

        let back = scaler.inverse("price", &[5.0]).unwrap();
        assert_relative_eq!(back[0], 7.0);
        assert!(scaler.inverse("y", &[1.0]).unwrap_err().is_configuration());
    }
}
