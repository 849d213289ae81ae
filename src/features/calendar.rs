//! Calendar covariates derived from timestamps alone.

use super::FeatureColumns;
use chrono::{DateTime, Datelike, Duration, Utc};

/// Names of the calendar columns, in output order.
pub const CALENDAR_COLUMNS: [&str; 12] = [
    "dayofweek",
    "dayofmonth",
    "dayofyear",
    "week",
    "month",
    "quarter",
    "year",
    "is_weekend",
    "is_month_start",
    "is_month_end",
    "is_quarter_start",
    "is_quarter_end",
];

/// Calendar features for each timestamp.
///
/// `dayofweek` runs from 0 (Monday) to 6 (Sunday) and `week` is the ISO
/// week number. Flags are 0/1. Every row depends only on its own timestamp.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use forecast_lab::features::calendar_features;
///
/// let ts = vec![Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap()];
/// let cols = calendar_features(&ts);
/// let month_end = cols.iter().find(|(n, _)| n == "is_month_end").unwrap();
/// assert_eq!(month_end.1, vec![1.0]);
/// ```
pub fn calendar_features(timestamps: &[DateTime<Utc>]) -> FeatureColumns {
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(timestamps.len()); 12];
    for ts in timestamps {
        let row = calendar_row(ts);
        for (col, value) in columns.iter_mut().zip(row) {
            col.push(value);
        }
    }
    CALENDAR_COLUMNS
        .iter()
        .map(|name| name.to_string())
        .zip(columns)
        .collect()
}

fn calendar_row(ts: &DateTime<Utc>) -> [f64; 12] {
    let date = ts.date_naive();
    let weekday = date.weekday().num_days_from_monday();
    let month = date.month();
    let month_end = (date + Duration::days(1)).month() != month;
    let month_start = date.day() == 1;
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    [
        weekday as f64,
        date.day() as f64,
        date.ordinal() as f64,
        date.iso_week().week() as f64,
        month as f64,
        ((month - 1) / 3 + 1) as f64,
        date.year() as f64,
        flag(weekday >= 5),
        flag(month_start),
        flag(month_end),
        flag(month_start && (month - 1) % 3 == 0),
        flag(month_end && month % 3 == 0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn column<'a>(cols: &'a FeatureColumns, name: &str) -> &'a [f64] {
        &cols.iter().find(|(n, _)| n == name).unwrap().1
    }

    #[test]
    fn produces_twelve_columns_per_row() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts: Vec<_> = (0..10).map(|i| start + Duration::days(i)).collect();
        let cols = calendar_features(&ts);
        assert_eq!(cols.len(), 12);
        assert!(cols.iter().all(|(_, v)| v.len() == 10));
        // 2024-01-01 is a Monday
        assert_eq!(column(&cols, "dayofweek")[0], 0.0);
        assert_eq!(column(&cols, "dayofweek")[6], 6.0);
        assert_eq!(column(&cols, "is_weekend")[5], 1.0);
        assert_eq!(column(&cols, "is_weekend")[4], 0.0);
    }

    #[test]
    fn quarter_and_month_boundaries() {
        let ts = vec![
            Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap(),
        ];
        let cols = calendar_features(&ts);
        assert_eq!(column(&cols, "quarter"), &[2.0, 2.0, 1.0]);
        assert_eq!(column(&cols, "is_quarter_start"), &[1.0, 0.0, 0.0]);
        assert_eq!(column(&cols, "is_quarter_end"), &[0.0, 1.0, 0.0]);
        assert_eq!(column(&cols, "is_month_end"), &[0.0, 1.0, 1.0]);
        assert_eq!(column(&cols, "dayofyear")[2], 60.0);
    }

    #[test]
    fn iso_week_wraps_at_year_start() {
        // 2021-01-01 belongs to ISO week 53 of 2020
        let ts = vec![Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()];
        let cols = calendar_features(&ts);
        assert_eq!(column(&cols, "week"), &[53.0]);
        assert_eq!(column(&cols, "year"), &[2021.0]);
    }

    #[test]
    fn empty_input_gives_empty_columns() {
        let cols = calendar_features(&[]);
        assert_eq!(cols.len(), 12);
        assert!(cols.iter().all(|(_, v)| v.is_empty()));
    }
}
