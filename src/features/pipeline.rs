//! Feature pipeline: an ordered list of stage descriptors applied to a frame.

use super::{
    calendar_features, fourier_features, holiday_features, lag_features, promo_features,
    rolling_features, FeatureColumns, FourierSpec, HolidayCalendar, HolidaySpec, PromoSpec,
    RollingSpec, RuleBasedCalendar,
};
use crate::core::Frame;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Feature recipe as written in configuration files.
///
/// Every stage but calendar is switched on by the presence of its key
/// (a non-empty list for `lags`, `rolls` and `promos`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub lags: Vec<usize>,
    #[serde(default)]
    pub rolls: Vec<RollingSpec>,
    #[serde(default)]
    pub fourier: Option<FourierSpec>,
    #[serde(default)]
    pub holidays: Option<HolidaySpec>,
    #[serde(default)]
    pub promos: Vec<PromoSpec>,
}

/// One feature stage and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureStage {
    Calendar,
    Fourier(FourierSpec),
    Lags(Vec<usize>),
    Rolling(Vec<RollingSpec>),
    Holidays(HolidaySpec),
    Promos(Vec<PromoSpec>),
}

impl FeatureStage {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureStage::Calendar => "calendar",
            FeatureStage::Fourier(_) => "fourier",
            FeatureStage::Lags(_) => "lags",
            FeatureStage::Rolling(_) => "rolling",
            FeatureStage::Holidays(_) => "holidays",
            FeatureStage::Promos(_) => "promos",
        }
    }
}

/// A stage with its on/off switch.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDescriptor {
    pub stage: FeatureStage,
    pub enabled: bool,
}

/// Applies calendar, Fourier, lag, rolling, holiday and promotion stages
/// in that order. Missing values produced by lag and rolling stages are
/// left in place.
pub struct FeaturePipeline {
    stages: Vec<StageDescriptor>,
    target: Option<String>,
    calendar: Box<dyn HolidayCalendar>,
}

impl fmt::Debug for FeaturePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeaturePipeline")
            .field("stages", &self.stages)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl FeaturePipeline {
    /// Stage list for `config`, in the fixed order.
    pub fn from_config(config: &FeatureConfig) -> Self {
        let stages = vec![
            StageDescriptor {
                stage: FeatureStage::Calendar,
                enabled: true,
            },
            StageDescriptor {
                enabled: config.fourier.is_some(),
                stage: FeatureStage::Fourier(config.fourier.clone().unwrap_or_default()),
            },
            StageDescriptor {
                enabled: !config.lags.is_empty(),
                stage: FeatureStage::Lags(config.lags.clone()),
            },
            StageDescriptor {
                enabled: !config.rolls.is_empty(),
                stage: FeatureStage::Rolling(config.rolls.clone()),
            },
            StageDescriptor {
                enabled: config.holidays.is_some(),
                stage: FeatureStage::Holidays(config.holidays.clone().unwrap_or_default()),
            },
            StageDescriptor {
                enabled: !config.promos.is_empty(),
                stage: FeatureStage::Promos(config.promos.clone()),
            },
        ];
        Self {
            stages,
            target: None,
            calendar: Box::new(RuleBasedCalendar),
        }
    }

    /// Column used by lag and rolling stages; defaults to the frame target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Replace the built-in holiday rules.
    pub fn with_holiday_calendar(mut self, calendar: impl HolidayCalendar + 'static) -> Self {
        self.calendar = Box::new(calendar);
        self
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn enabled_stages(&self) -> impl Iterator<Item = &FeatureStage> {
        self.stages.iter().filter(|d| d.enabled).map(|d| &d.stage)
    }

    /// Names of the enabled lag and rolling columns: the ones that are
    /// missing until a series has enough history.
    pub fn history_columns(&self) -> Vec<String> {
        let mut names = Vec::new();
        for stage in self.enabled_stages() {
            match stage {
                FeatureStage::Lags(lags) => {
                    names.extend(lags.iter().map(|l| format!("lag_{l}")));
                }
                FeatureStage::Rolling(specs) => {
                    for spec in specs {
                        names.extend(
                            spec.stats
                                .iter()
                                .map(|s| format!("rolling_{}_{}", spec.window, s)),
                        );
                    }
                }
                _ => {}
            }
        }
        names
    }

    /// New frame with every enabled stage's columns appended.
    pub fn transform(&self, frame: &Frame) -> Result<Frame> {
        let mut out = frame.clone();
        let target = self
            .target
            .clone()
            .unwrap_or_else(|| frame.target_name().to_string());

        for stage in self.enabled_stages() {
            let columns: FeatureColumns = match stage {
                FeatureStage::Calendar => calendar_features(frame.timestamps()),
                FeatureStage::Fourier(spec) => {
                    fourier_features(frame.timestamps(), &spec.periods, spec.k)?
                }
                FeatureStage::Lags(lags) => lag_features(frame, &target, lags)?,
                FeatureStage::Rolling(specs) => rolling_features(frame, &target, specs)?,
                FeatureStage::Holidays(spec) => {
                    holiday_features(frame.timestamps(), spec, self.calendar.as_ref())
                }
                FeatureStage::Promos(promos) => promo_features(frame.timestamps(), promos)?,
            };
            debug!(stage = stage.name(), columns = columns.len(), "applied feature stage");
            for (name, values) in columns {
                out.add_column(name, values)?;
            }
        }
        Ok(out)
    }
}

/// Run the pipeline described by `config` over `frame`.
pub fn build_features(frame: &Frame, config: &FeatureConfig) -> Result<Frame> {
    FeaturePipeline::from_config(config).transform(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{RollStat, CALENDAR_COLUMNS};
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    fn frame(n: i64) -> Frame {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts: Vec<DateTime<Utc>> = (0..n).map(|i| start + Duration::days(i)).collect();
        Frame::new(None, ts, "y", (0..n).map(|i| i as f64).collect()).unwrap()
    }

    #[test]
    fn calendar_only_by_default() {
        let out = build_features(&frame(10), &FeatureConfig::default()).unwrap();
        assert_eq!(out.feature_names(), CALENDAR_COLUMNS.to_vec());
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn stages_follow_declared_order() {
        let config = FeatureConfig {
            lags: vec![1, 7],
            rolls: vec![RollingSpec::new(7, vec![RollStat::Mean, RollStat::Std])],
            fourier: Some(FourierSpec {
                periods: vec![7.0],
                k: 1,
            }),
            holidays: Some(HolidaySpec::default()),
            promos: vec![PromoSpec::new("2024-01-02", "2024-01-03").with_name("x")],
        };
        let out = build_features(&frame(30), &config).unwrap();
        let names = out.feature_names();
        let tail: Vec<&str> = names[12..].to_vec();
        assert_eq!(
            tail,
            vec![
                "fourier_sin_7_1",
                "fourier_cos_7_1",
                "lag_1",
                "lag_7",
                "rolling_7_mean",
                "rolling_7_std",
                "is_holiday",
                "promo_x",
            ]
        );
        assert_eq!(out.column("is_holiday").unwrap()[0], 1.0);
        assert_eq!(out.column("lag_7").unwrap()[10], 3.0);
        // missing history is left for the caller
        assert!(out.column("lag_7").unwrap()[6].is_nan());
    }

    #[test]
    fn history_columns_list_lag_and_rolling_outputs() {
        let config = FeatureConfig {
            lags: vec![2],
            rolls: vec![RollingSpec::new(3, vec![RollStat::Max])],
            ..FeatureConfig::default()
        };
        let pipeline = FeaturePipeline::from_config(&config);
        assert_eq!(pipeline.history_columns(), vec!["lag_2", "rolling_3_max"]);
        assert_eq!(pipeline.enabled_stages().count(), 3);
        assert_eq!(pipeline.stages().len(), 6);
    }

    struct NewYearOnly;

    impl HolidayCalendar for NewYearOnly {
        fn holidays(&self, _country: &str, year: i32) -> Option<Vec<NaiveDate>> {
            Some(vec![NaiveDate::from_ymd_opt(year, 1, 2)?])
        }
    }

    #[test]
    fn custom_holiday_calendar() {
        let config = FeatureConfig {
            holidays: Some(HolidaySpec::default()),
            ..FeatureConfig::default()
        };
        let out = FeaturePipeline::from_config(&config)
            .with_holiday_calendar(NewYearOnly)
            .transform(&frame(3))
            .unwrap();
        assert_eq!(out.column("is_holiday").unwrap(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn lags_on_custom_target() {
        let base = frame(4).with_column("sales", vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let config = FeatureConfig {
            lags: vec![1],
            ..FeatureConfig::default()
        };
        let out = FeaturePipeline::from_config(&config)
            .with_target("sales")
            .transform(&base)
            .unwrap();
        assert_eq!(out.column("lag_1").unwrap()[1], 5.0);

        let err = FeaturePipeline::from_config(&config)
            .with_target("missing")
            .transform(&base)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn config_parses_from_yaml() {
        let yaml = r#"
lags: [1, 7, 28]
rolls:
  - window: 7
    stats: [mean, std]
  - window: 28
fourier:
  k: 3
holidays:
  countries: [US, DE]
  lookahead: 1
promos:
  - {start: "2024-11-29", end: "2024-12-02", name: bf}
"#;
        let config: FeatureConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.lags, vec![1, 7, 28]);
        assert_eq!(config.rolls[1].stats, vec![RollStat::Mean]);
        assert_eq!(config.fourier.as_ref().unwrap().periods, vec![7.0, 365.25]);
        assert_eq!(config.holidays.as_ref().unwrap().lookback, 0);
        assert_eq!(config.promos[0].name.as_deref(), Some("bf"));
    }
}
