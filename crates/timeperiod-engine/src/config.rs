//! Engine configuration.
//!
//! Everything that the original front end read from global settings (period
//! limits, the default time selector period, the maximum storable date) is
//! carried in an [`EngineConfig`] value that callers pass explicitly. The
//! struct deserializes from JSON with every field optional.

use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TimePeriodError};

pub const SEC_PER_MIN: i64 = 60;
pub const SEC_PER_HOUR: i64 = 3_600;
pub const SEC_PER_DAY: i64 = 86_400;
pub const SEC_PER_WEEK: i64 = 604_800;

/// Largest timestamp the storage layer accepts (19 Jan 2038 03:14:07 UTC).
pub const MAX_DATE: i64 = i32::MAX as i64;

/// Shortest displayable period.
pub const MIN_PERIOD: i64 = SEC_PER_MIN;

/// Two years, the stock upper limit for the time selector.
pub const DEFAULT_MAX_PERIOD: i64 = 2 * 365 * SEC_PER_DAY;

/// Which day begins a week for `/w` snapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStartDay {
    /// ISO 8601 standard (Monday = day 0 of the week).
    #[default]
    Monday,
    /// US/Canada convention (Sunday = day 0 of the week).
    Sunday,
}

impl WeekStartDay {
    /// How many days `weekday` is from the week-start day.
    pub fn days_from_start(self, weekday: Weekday) -> i64 {
        match self {
            WeekStartDay::Monday => weekday.num_days_from_monday() as i64,
            WeekStartDay::Sunday => weekday.num_days_from_sunday() as i64,
        }
    }
}

/// Minimum and maximum resolved length of a displayed range, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBounds {
    pub min_period: i64,
    pub max_period: i64,
}

impl Default for PeriodBounds {
    fn default() -> Self {
        PeriodBounds {
            min_period: MIN_PERIOD,
            max_period: DEFAULT_MAX_PERIOD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// IANA zone used for wall-clock arithmetic and date rendering.
    pub timezone: String,
    pub min_period: i64,
    pub max_period: i64,
    /// Relative offset used when no range is stored yet, e.g. `"1h"`.
    pub default_period: String,
    pub max_date: i64,
    pub week_start: WeekStartDay,
    /// Profile namespaces the time selector endpoint accepts as `idx`.
    pub profile_indexes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            timezone: "UTC".to_string(),
            min_period: MIN_PERIOD,
            max_period: DEFAULT_MAX_PERIOD,
            default_period: "1h".to_string(),
            max_date: MAX_DATE,
            week_start: WeekStartDay::Monday,
            profile_indexes: [
                "web.dashboard.filter",
                "web.charts.filter",
                "web.problem.filter",
                "web.graphs.filter",
                "web.httpdetails.filter",
                "web.item.graph.filter",
                "web.auditlog.filter",
                "web.actionlog.filter",
                "web.toptriggers.filter",
                "web.avail_report.filter",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| TimePeriodError::invalid_field("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        if self.min_period <= 0 {
            return Err(TimePeriodError::invalid_field(
                "min_period",
                "must be greater than zero",
            ));
        }
        if self.max_period < self.min_period {
            return Err(TimePeriodError::invalid_field(
                "max_period",
                "must not be less than min_period",
            ));
        }
        Ok(())
    }

    pub fn bounds(&self) -> PeriodBounds {
        PeriodBounds {
            min_period: self.min_period,
            max_period: self.max_period,
        }
    }

    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }
}

/// Parse an IANA timezone string into `Tz`.
pub fn parse_timezone(s: &str) -> Result<Tz> {
    s.parse::<Tz>()
        .map_err(|_| TimePeriodError::InvalidTimezone(format!("'{}'", s)))
}
