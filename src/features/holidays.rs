//! Holiday indicator features and a rule-based public holiday calendar.

use super::FeatureColumns;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

/// Source of public holiday dates.
pub trait HolidayCalendar {
    /// Holidays of `country` in `year`, or `None` when the country is not
    /// covered.
    fn holidays(&self, country: &str, year: i32) -> Option<Vec<NaiveDate>>;
}

/// Holiday feature settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidaySpec {
    #[serde(default = "default_countries")]
    pub countries: Vec<String>,
    /// Days before a holiday to flag with `holiday_minus_{i}`.
    #[serde(default)]
    pub lookback: usize,
    /// Days after a holiday to flag with `holiday_plus_{i}`.
    #[serde(default)]
    pub lookahead: usize,
}

fn default_countries() -> Vec<String> {
    vec!["US".to_string()]
}

impl Default for HolidaySpec {
    fn default() -> Self {
        Self {
            countries: default_countries(),
            lookback: 0,
            lookahead: 0,
        }
    }
}

/// Fixed-date and weekday rules for `US`, `DE` and `GB` (alias `UK`).
///
/// US federal holidays include the observed Friday/Monday when the date
/// falls on a weekend. GB covers England & Wales bank holidays with
/// substitute days. One-off holidays such as jubilees are not included.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedCalendar;

impl HolidayCalendar for RuleBasedCalendar {
    fn holidays(&self, country: &str, year: i32) -> Option<Vec<NaiveDate>> {
        let days = match country.to_ascii_uppercase().as_str() {
            "US" => united_states(year),
            "DE" => germany(year),
            "GB" | "UK" => england_and_wales(year),
            _ => return None,
        };
        Some(days)
    }
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_next = if month == 12 {
        ymd(year + 1, 1, 1)?
    } else {
        ymd(year, month + 1, 1)?
    };
    let mut day = first_next - Duration::days(1);
    while day.weekday() != weekday {
        day -= Duration::days(1);
    }
    Some(day)
}

/// Gregorian Easter Sunday (anonymous algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    ymd(year, month as u32, day as u32)
}

fn united_states(year: i32) -> Vec<NaiveDate> {
    let fixed = [
        ymd(year, 1, 1),
        (year >= 2021).then(|| ymd(year, 6, 19)).flatten(),
        ymd(year, 7, 4),
        ymd(year, 11, 11),
        ymd(year, 12, 25),
    ];
    let floating = [
        (year >= 1986)
            .then(|| nth_weekday(year, 1, Weekday::Mon, 3))
            .flatten(),
        nth_weekday(year, 2, Weekday::Mon, 3),
        last_weekday(year, 5, Weekday::Mon),
        nth_weekday(year, 9, Weekday::Mon, 1),
        nth_weekday(year, 10, Weekday::Mon, 2),
        nth_weekday(year, 11, Weekday::Thu, 4),
    ];
    let mut days: Vec<NaiveDate> = Vec::new();
    for date in fixed.into_iter().flatten() {
        days.push(date);
        match date.weekday() {
            Weekday::Sat => days.push(date - Duration::days(1)),
            Weekday::Sun => days.push(date + Duration::days(1)),
            _ => {}
        }
    }
    days.extend(floating.into_iter().flatten());
    days
}

fn germany(year: i32) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = [
        ymd(year, 1, 1),
        ymd(year, 5, 1),
        (year >= 1990).then(|| ymd(year, 10, 3)).flatten(),
        ymd(year, 12, 25),
        ymd(year, 12, 26),
    ]
    .into_iter()
    .flatten()
    .collect();
    if let Some(easter) = easter_sunday(year) {
        // Good Friday, Easter Monday, Ascension, Whit Monday
        for offset in [-2, 1, 39, 50] {
            days.push(easter + Duration::days(offset));
        }
    }
    days
}

fn england_and_wales(year: i32) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = Vec::new();
    if let Some(new_year) = ymd(year, 1, 1) {
        days.push(new_year);
        match new_year.weekday() {
            Weekday::Sat => days.push(new_year + Duration::days(2)),
            Weekday::Sun => days.push(new_year + Duration::days(1)),
            _ => {}
        }
    }
    if let Some(easter) = easter_sunday(year) {
        days.push(easter - Duration::days(2));
        days.push(easter + Duration::days(1));
    }
    days.extend(
        [
            nth_weekday(year, 5, Weekday::Mon, 1),
            last_weekday(year, 5, Weekday::Mon),
            last_weekday(year, 8, Weekday::Mon),
        ]
        .into_iter()
        .flatten(),
    );
    if let (Some(christmas), Some(boxing)) = (ymd(year, 12, 25), ymd(year, 12, 26)) {
        days.push(christmas);
        days.push(boxing);
        // substitutes land on the next weekdays not already taken
        let substitute = match christmas.weekday() {
            Weekday::Fri => vec![ymd(year, 12, 28)],
            Weekday::Sat => vec![ymd(year, 12, 27), ymd(year, 12, 28)],
            Weekday::Sun => vec![ymd(year, 12, 27)],
            _ => vec![],
        };
        days.extend(substitute.into_iter().flatten());
    }
    days
}

/// Holiday indicator columns for each timestamp.
///
/// `is_holiday` flags dates that are a holiday in any of `countries`;
/// `holiday_minus_{i}` flags dates `i` days before one and
/// `holiday_plus_{i}` dates `i` days after one. Countries the calendar does
/// not know are skipped with a warning.
pub fn holiday_features(
    timestamps: &[DateTime<Utc>],
    spec: &HolidaySpec,
    calendar: &dyn HolidayCalendar,
) -> FeatureColumns {
    let dates: Vec<NaiveDate> = timestamps.iter().map(|ts| ts.date_naive()).collect();
    let years: BTreeSet<i32> = dates
        .iter()
        // neighbouring years feed the lookback/lookahead window at year ends
        .flat_map(|d| [d.year() - 1, d.year(), d.year() + 1])
        .collect();

    let mut holidays: HashSet<NaiveDate> = HashSet::new();
    for country in &spec.countries {
        let mut known = true;
        for &year in &years {
            match calendar.holidays(country, year) {
                Some(days) => holidays.extend(days),
                None => {
                    known = false;
                    break;
                }
            }
        }
        if !known {
            warn!(country = %country, "no holiday rules for country, skipping");
        }
    }

    let flag = |shift: i64| -> Vec<f64> {
        dates
            .iter()
            .map(|d| {
                if holidays.contains(&(*d + Duration::days(shift))) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    };

    let mut columns = vec![("is_holiday".to_string(), flag(0))];
    for i in 1..=spec.lookback {
        columns.push((format!("holiday_minus_{i}"), flag(i as i64)));
    }
    for i in 1..=spec.lookahead {
        columns.push((format!("holiday_plus_{i}"), flag(-(i as i64))));
    }
    columns
}
