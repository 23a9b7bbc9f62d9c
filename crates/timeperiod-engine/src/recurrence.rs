//! Maintenance time periods: the typed [`RecurrencePattern`] and its flat field
//! representation.
//!
//! A maintenance time period is stored as one flat record with eight fields
//! (`timeperiod_type`, `every`, `start_time`, `period`, `start_date`, `day`,
//! `dayofweek`, `month`). Which fields matter depends on `timeperiod_type`.
//! [`decode`] validates exactly the fields the selected type needs and builds a
//! variant that carries nothing else; [`encode`] writes every field back, with
//! zero for the unused ones.
//!
//! Weekday and month bitmasks only exist at this boundary. Bit `i` of
//! `dayofweek` is weekday `i` counting from Monday; bit `i` of `month` is month
//! `i + 1`. Inside the engine they are [`WeekdaySet`] and [`MonthSet`].

use std::collections::BTreeMap;

use chrono::{Month, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EngineConfig, SEC_PER_DAY};
use crate::error::{Result, TimePeriodError};
use crate::expression::{parse_absolute, parse_time_of_day, Side, Timestamp};

pub const TIMEPERIOD_TYPE_ONETIME: u8 = 0;
pub const TIMEPERIOD_TYPE_HOURLY: u8 = 1;
pub const TIMEPERIOD_TYPE_DAILY: u8 = 2;
pub const TIMEPERIOD_TYPE_WEEKLY: u8 = 3;
pub const TIMEPERIOD_TYPE_MONTHLY: u8 = 4;
pub const TIMEPERIOD_TYPE_YEARLY: u8 = 5;

/// Form-style field map, as submitted or as persisted.
pub type RawFields = BTreeMap<String, String>;

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

// ── Weekday / month sets ────────────────────────────────────────────────────

/// A set of weekdays, kept in Monday-first order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct WeekdaySet {
    days: Vec<Weekday>,
}

impl WeekdaySet {
    pub fn all() -> Self {
        ALL_WEEKDAYS.into_iter().collect()
    }

    pub fn insert(&mut self, day: Weekday) {
        if !self.contains(day) {
            self.days.push(day);
            self.days.sort_by_key(|d| d.num_days_from_monday());
        }
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        self.days.iter().copied()
    }

    pub fn from_mask(mask: u32) -> Self {
        ALL_WEEKDAYS
            .into_iter()
            .filter(|day| mask & (1 << day.num_days_from_monday()) != 0)
            .collect()
    }

    pub fn to_mask(&self) -> u32 {
        self.days
            .iter()
            .fold(0, |mask, day| mask | (1 << day.num_days_from_monday()))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::default();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl From<Vec<Weekday>> for WeekdaySet {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<WeekdaySet> for Vec<Weekday> {
    fn from(set: WeekdaySet) -> Self {
        set.days
    }
}

/// A set of calendar months, kept in January-first order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct MonthSet {
    months: Vec<Month>,
}

impl MonthSet {
    pub fn all() -> Self {
        MonthSet::from_mask(0xFFF)
    }

    pub fn insert(&mut self, month: Month) {
        if !self.contains(month) {
            self.months.push(month);
            self.months.sort_by_key(|m| m.number_from_month());
        }
    }

    pub fn contains(&self, month: Month) -> bool {
        self.months.contains(&month)
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Month> + '_ {
        self.months.iter().copied()
    }

    pub fn from_mask(mask: u32) -> Self {
        (0u8..12)
            .filter(|bit| mask & (1u32 << *bit) != 0)
            .filter_map(|bit| Month::try_from(bit + 1).ok())
            .collect()
    }

    pub fn to_mask(&self) -> u32 {
        self.months
            .iter()
            .fold(0, |mask, month| mask | (1 << (month.number_from_month() - 1)))
    }
}

impl FromIterator<Month> for MonthSet {
    fn from_iter<I: IntoIterator<Item = Month>>(iter: I) -> Self {
        let mut set = MonthSet::default();
        for month in iter {
            set.insert(month);
        }
        set
    }
}

impl TryFrom<Vec<u32>> for MonthSet {
    type Error = String;

    fn try_from(numbers: Vec<u32>) -> std::result::Result<Self, Self::Error> {
        numbers
            .into_iter()
            .map(|n| {
                u8::try_from(n)
                    .ok()
                    .and_then(|n| Month::try_from(n).ok())
                    .ok_or_else(|| format!("invalid month number {}", n))
            })
            .collect()
    }
}

impl From<MonthSet> for Vec<u32> {
    fn from(set: MonthSet) -> Self {
        set.months.iter().map(|m| m.number_from_month()).collect()
    }
}

// ── Pattern ─────────────────────────────────────────────────────────────────

/// Which week of the month a monthly weekday pattern fires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekOfMonth {
    First,
    Second,
    Third,
    Fourth,
    Last,
}

impl WeekOfMonth {
    /// Stored `every` value: 1-4, with 5 for "last".
    pub fn number(self) -> u32 {
        match self {
            WeekOfMonth::First => 1,
            WeekOfMonth::Second => 2,
            WeekOfMonth::Third => 3,
            WeekOfMonth::Fourth => 4,
            WeekOfMonth::Last => 5,
        }
    }

    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            1 => Some(WeekOfMonth::First),
            2 => Some(WeekOfMonth::Second),
            3 => Some(WeekOfMonth::Third),
            4 => Some(WeekOfMonth::Fourth),
            5 => Some(WeekOfMonth::Last),
            _ => None,
        }
    }
}

/// The two mutually exclusive ways a monthly pattern picks its days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyDay {
    /// A fixed day of the month (1-31); months without that day are skipped.
    DayOfMonth(u8),
    /// The given weekdays in the given week of the month.
    Weekdays {
        week: WeekOfMonth,
        weekdays: WeekdaySet,
    },
}

/// A recurring maintenance definition. Durations and start times are seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrencePattern {
    OneTime {
        start_date: Timestamp,
        duration: u32,
    },
    Daily {
        every: u16,
        start_time: u32,
        duration: u32,
    },
    Weekly {
        every: u16,
        weekdays: WeekdaySet,
        start_time: u32,
        duration: u32,
    },
    Monthly {
        months: MonthSet,
        on: MonthlyDay,
        start_time: u32,
        duration: u32,
    },
}

impl RecurrencePattern {
    pub fn timeperiod_type(&self) -> u8 {
        match self {
            RecurrencePattern::OneTime { .. } => TIMEPERIOD_TYPE_ONETIME,
            RecurrencePattern::Daily { .. } => TIMEPERIOD_TYPE_DAILY,
            RecurrencePattern::Weekly { .. } => TIMEPERIOD_TYPE_WEEKLY,
            RecurrencePattern::Monthly { .. } => TIMEPERIOD_TYPE_MONTHLY,
        }
    }

    pub fn duration(&self) -> u32 {
        match self {
            RecurrencePattern::OneTime { duration, .. }
            | RecurrencePattern::Daily { duration, .. }
            | RecurrencePattern::Weekly { duration, .. }
            | RecurrencePattern::Monthly { duration, .. } => *duration,
        }
    }
}

// ── Persisted record ────────────────────────────────────────────────────────

/// The flat record as the storage layer keeps it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimePeriodRecord {
    pub timeperiod_type: u8,
    pub every: u32,
    pub start_time: u32,
    pub period: u32,
    pub start_date: Timestamp,
    pub day: u32,
    pub dayofweek: u32,
    pub month: u32,
}

impl TimePeriodRecord {
    pub fn to_fields(&self) -> RawFields {
        [
            ("timeperiod_type", self.timeperiod_type.to_string()),
            ("every", self.every.to_string()),
            ("start_time", self.start_time.to_string()),
            ("period", self.period.to_string()),
            ("start_date", self.start_date.to_string()),
            ("day", self.day.to_string()),
            ("dayofweek", self.dayofweek.to_string()),
            ("month", self.month.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    pub fn decode(&self, config: &EngineConfig) -> Result<RecurrencePattern> {
        decode(&self.to_fields(), config)
    }
}

impl From<&RecurrencePattern> for TimePeriodRecord {
    fn from(pattern: &RecurrencePattern) -> Self {
        let mut record = TimePeriodRecord {
            timeperiod_type: pattern.timeperiod_type(),
            period: pattern.duration(),
            ..TimePeriodRecord::default()
        };
        match pattern {
            RecurrencePattern::OneTime { start_date, .. } => {
                record.start_date = *start_date;
            }
            RecurrencePattern::Daily {
                every, start_time, ..
            } => {
                record.every = *every as u32;
                record.start_time = *start_time;
            }
            RecurrencePattern::Weekly {
                every,
                weekdays,
                start_time,
                ..
            } => {
                record.every = *every as u32;
                record.dayofweek = weekdays.to_mask();
                record.start_time = *start_time;
            }
            RecurrencePattern::Monthly {
                months,
                on,
                start_time,
                ..
            } => {
                record.month = months.to_mask();
                record.start_time = *start_time;
                match on {
                    MonthlyDay::DayOfMonth(day) => {
                        record.every = 1;
                        record.day = *day as u32;
                    }
                    MonthlyDay::Weekdays { week, weekdays } => {
                        record.every = week.number();
                        record.dayofweek = weekdays.to_mask();
                    }
                }
            }
        }
        record
    }
}

// ── Codec ───────────────────────────────────────────────────────────────────

/// Flatten a pattern into all eight fields.
pub fn encode(pattern: &RecurrencePattern) -> RawFields {
    TimePeriodRecord::from(pattern).to_fields()
}

/// Validate the fields required by `timeperiod_type` and build the pattern.
///
/// # Errors
///
/// Returns [`TimePeriodError::MissingRequiredField`] for an absent or blank
/// field the type needs, and [`TimePeriodError::InvalidFieldValue`] for a value
/// that is not a number or is out of range.
pub fn decode(fields: &RawFields, config: &EngineConfig) -> Result<RecurrencePattern> {
    let result = decode_fields(fields, config);
    if let Err(e) = &result {
        debug!(error = %e, "rejected maintenance time period");
    }
    result
}

fn decode_fields(fields: &RawFields, config: &EngineConfig) -> Result<RecurrencePattern> {
    let kind = int_field(fields, "timeperiod_type")?;

    match u8::try_from(kind).unwrap_or(u8::MAX) {
        TIMEPERIOD_TYPE_ONETIME => Ok(RecurrencePattern::OneTime {
            start_date: start_date_field(fields, config)?,
            duration: period_field(fields)?,
        }),
        TIMEPERIOD_TYPE_DAILY => Ok(RecurrencePattern::Daily {
            every: every_field(fields)?,
            start_time: start_time_field(fields)?,
            duration: period_field(fields)?,
        }),
        TIMEPERIOD_TYPE_WEEKLY => Ok(RecurrencePattern::Weekly {
            every: every_field(fields)?,
            weekdays: weekday_field(fields)?,
            start_time: start_time_field(fields)?,
            duration: period_field(fields)?,
        }),
        TIMEPERIOD_TYPE_MONTHLY => {
            let every = int_field(fields, "every")?;
            let month = int_field(fields, "month")?;
            let dayofweek = int_field(fields, "dayofweek")?;
            let day = int_field(fields, "day")?;

            if !(1..=0xFFF).contains(&month) {
                return Err(TimePeriodError::invalid_field(
                    "month",
                    "at least one month must be selected",
                ));
            }
            if !(0..=0x7F).contains(&dayofweek) {
                return Err(TimePeriodError::invalid_field("dayofweek", "unknown weekday bits"));
            }
            if !(0..=31).contains(&day) {
                return Err(TimePeriodError::invalid_field("day", "must be between 0 and 31"));
            }

            let on = match (day, dayofweek) {
                (0, 0) => {
                    return Err(TimePeriodError::invalid_field(
                        "dayofweek",
                        "at least one weekday must be selected",
                    ));
                }
                (0, mask) => MonthlyDay::Weekdays {
                    week: WeekOfMonth::from_number(every).ok_or_else(|| {
                        TimePeriodError::invalid_field("every", "must be between 1 and 5")
                    })?,
                    weekdays: WeekdaySet::from_mask(mask as u32),
                },
                (day, 0) => {
                    if every < 1 {
                        return Err(TimePeriodError::invalid_field("every", "must be at least 1"));
                    }
                    MonthlyDay::DayOfMonth(day as u8)
                }
                (_, _) => {
                    return Err(TimePeriodError::invalid_field(
                        "dayofweek",
                        "cannot be combined with a day of month",
                    ));
                }
            };

            Ok(RecurrencePattern::Monthly {
                months: MonthSet::from_mask(month as u32),
                on,
                start_time: start_time_field(fields)?,
                duration: period_field(fields)?,
            })
        }
        TIMEPERIOD_TYPE_HOURLY | TIMEPERIOD_TYPE_YEARLY => Err(TimePeriodError::invalid_field(
            "timeperiod_type",
            "hourly and yearly periods are not supported",
        )),
        _ => Err(TimePeriodError::invalid_field(
            "timeperiod_type",
            format!("unknown type {}", kind),
        )),
    }
}

fn required<'a>(fields: &'a RawFields, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TimePeriodError::MissingRequiredField(name.to_string()))
}

fn int_field(fields: &RawFields, name: &str) -> Result<i64> {
    required(fields, name)?
        .parse()
        .map_err(|_| TimePeriodError::invalid_field(name, "must be an integer"))
}

fn every_field(fields: &RawFields) -> Result<u16> {
    let every = int_field(fields, "every")?;
    u16::try_from(every)
        .ok()
        .filter(|every| *every >= 1)
        .ok_or_else(|| TimePeriodError::invalid_field("every", "must be at least 1"))
}

fn period_field(fields: &RawFields) -> Result<u32> {
    let period = int_field(fields, "period")?;
    u32::try_from(period)
        .ok()
        .filter(|period| *period > 0)
        .ok_or_else(|| TimePeriodError::invalid_field("period", "must be greater than zero"))
}

/// Seconds since midnight, or `HH:MM`.
fn start_time_field(fields: &RawFields) -> Result<u32> {
    let text = required(fields, "start_time")?;
    let seconds = if text.contains(':') {
        parse_time_of_day(text, false)
    } else {
        text.parse::<u32>().ok()
    };
    seconds
        .filter(|s| (*s as i64) < SEC_PER_DAY)
        .ok_or_else(|| TimePeriodError::invalid_field("start_time", "must be a time of day"))
}

fn weekday_field(fields: &RawFields) -> Result<WeekdaySet> {
    let mask = int_field(fields, "dayofweek")?;
    if !(1..=0x7F).contains(&mask) {
        return Err(TimePeriodError::invalid_field(
            "dayofweek",
            "at least one weekday must be selected",
        ));
    }
    Ok(WeekdaySet::from_mask(mask as u32))
}

/// A timestamp, or an absolute date/time literal in the configured zone.
fn start_date_field(fields: &RawFields, config: &EngineConfig) -> Result<Timestamp> {
    let text = required(fields, "start_date")?;
    let ts = match text.parse::<i64>() {
        Ok(ts) => ts,
        Err(_) => parse_absolute(text, config)
            .and_then(|absolute| absolute.resolve(Side::From, &config.tz()?))
            .map_err(|e| TimePeriodError::invalid_field("start_date", e.to_string()))?,
    };
    if ts < 0 || ts > config.max_date {
        return Err(TimePeriodError::invalid_field(
            "start_date",
            "outside the supported range",
        ));
    }
    Ok(ts)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fields(pairs: &[(&str, &str)]) -> RawFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    // ── set tests ───────────────────────────────────────────────────────

    #[test]
    fn test_weekday_mask_monday_is_bit_zero() {
        let set = WeekdaySet::from_mask(0b001_0001);
        assert!(set.contains(Weekday::Mon));
        assert!(set.contains(Weekday::Fri));
        assert!(!set.contains(Weekday::Sun));
        assert_eq!(set.to_mask(), 17);
        assert_eq!(WeekdaySet::all().to_mask(), 127);
    }

    #[test]
    fn test_weekday_set_order_and_dedup() {
        let set: WeekdaySet = [Weekday::Sun, Weekday::Mon, Weekday::Sun].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Weekday::Mon, Weekday::Sun]);
    }

    #[test]
    fn test_month_mask_january_is_bit_zero() {
        let set = MonthSet::from_mask(0b1000_0000_0001);
        assert!(set.contains(Month::January));
        assert!(set.contains(Month::December));
        assert_eq!(set.iter().count(), 2);
        assert_eq!(MonthSet::all().to_mask(), 4095);
    }

    // ── decode tests ────────────────────────────────────────────────────

    #[test]
    fn test_decode_one_time_with_timestamp() {
        let pattern = decode(
            &fields(&[("timeperiod_type", "0"), ("start_date", "1771425000"), ("period", "3600")]),
            &config(),
        )
        .unwrap();
        assert_eq!(
            pattern,
            RecurrencePattern::OneTime {
                start_date: 1_771_425_000,
                duration: 3600
            }
        );
    }

    #[test]
    fn test_decode_one_time_with_date_text() {
        let pattern = decode(
            &fields(&[
                ("timeperiod_type", "0"),
                ("start_date", "2026-02-18 14:30"),
                ("period", "7200"),
            ]),
            &config(),
        )
        .unwrap();
        assert!(matches!(pattern, RecurrencePattern::OneTime { start_date: 1_771_425_000, .. }));
    }

    #[test]
    fn test_decode_one_time_bad_date() {
        let err = decode(
            &fields(&[("timeperiod_type", "0"), ("start_date", "2026-02-30"), ("period", "60")]),
            &config(),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("start_date"));
    }

    #[test]
    fn test_decode_one_time_ignores_unrelated_fields() {
        let pattern = decode(
            &fields(&[
                ("timeperiod_type", "0"),
                ("start_date", "0"),
                ("period", "60"),
                ("every", "garbage"),
                ("dayofweek", "-3"),
            ]),
            &config(),
        );
        assert!(pattern.is_ok());
    }

    #[test]
    fn test_decode_daily() {
        let pattern = decode(
            &fields(&[
                ("timeperiod_type", "2"),
                ("every", "3"),
                ("start_time", "03:30"),
                ("period", "1800"),
            ]),
            &config(),
        )
        .unwrap();
        assert_eq!(
            pattern,
            RecurrencePattern::Daily {
                every: 3,
                start_time: 12_600,
                duration: 1800
            }
        );
    }

    #[test]
    fn test_decode_daily_start_time_bounds() {
        let base = [("timeperiod_type", "2"), ("every", "1"), ("period", "60")];
        for (value, ok) in [("0", true), ("86399", true), ("86400", false), ("24:00", false), ("-1", false)] {
            let mut f = fields(&base);
            f.insert("start_time".into(), value.into());
            assert_eq!(decode(&f, &config()).is_ok(), ok, "start_time={value}");
        }
    }

    #[test]
    fn test_decode_daily_every_zero() {
        let err = decode(
            &fields(&[("timeperiod_type", "2"), ("every", "0"), ("start_time", "0"), ("period", "60")]),
            &config(),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("every"));
    }

    #[test]
    fn test_decode_missing_field_names_it() {
        let err = decode(
            &fields(&[("timeperiod_type", "2"), ("every", "1"), ("period", "60")]),
            &config(),
        )
        .unwrap_err();
        assert_eq!(err, TimePeriodError::MissingRequiredField("start_time".to_string()));

        let err = decode(&fields(&[]), &config()).unwrap_err();
        assert_eq!(err, TimePeriodError::MissingRequiredField("timeperiod_type".to_string()));
    }

    #[test]
    fn test_decode_blank_is_missing() {
        let err = decode(
            &fields(&[("timeperiod_type", "0"), ("start_date", "  "), ("period", "60")]),
            &config(),
        )
        .unwrap_err();
        assert_eq!(err, TimePeriodError::MissingRequiredField("start_date".to_string()));
    }

    #[test]
    fn test_decode_zero_period() {
        let err = decode(
            &fields(&[("timeperiod_type", "0"), ("start_date", "0"), ("period", "0")]),
            &config(),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("period"));
    }

    #[test]
    fn test_decode_weekly_requires_weekday() {
        let err = decode(
            &fields(&[
                ("timeperiod_type", "3"),
                ("every", "1"),
                ("dayofweek", "0"),
                ("start_time", "0"),
                ("period", "60"),
            ]),
            &config(),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("dayofweek"));
    }

    #[test]
    fn test_decode_monthly_day_of_month() {
        let pattern = decode(
            &fields(&[
                ("timeperiod_type", "4"),
                ("every", "1"),
                ("month", "4095"),
                ("dayofweek", "0"),
                ("day", "31"),
                ("start_time", "0"),
                ("period", "3600"),
            ]),
            &config(),
        )
        .unwrap();
        assert!(matches!(
            pattern,
            RecurrencePattern::Monthly {
                on: MonthlyDay::DayOfMonth(31),
                ..
            }
        ));
    }

    #[test]
    fn test_decode_monthly_last_friday() {
        let pattern = decode(
            &fields(&[
                ("timeperiod_type", "4"),
                ("every", "5"),
                ("month", "4095"),
                ("dayofweek", "16"),
                ("day", "0"),
                ("start_time", "3600"),
                ("period", "3600"),
            ]),
            &config(),
        )
        .unwrap();
        let RecurrencePattern::Monthly { on, .. } = pattern else {
            panic!("expected monthly pattern");
        };
        assert_eq!(
            on,
            MonthlyDay::Weekdays {
                week: WeekOfMonth::Last,
                weekdays: [Weekday::Fri].into_iter().collect()
            }
        );
    }

    #[test]
    fn test_decode_monthly_sub_modes_are_exclusive() {
        let base = [
            ("timeperiod_type", "4"),
            ("every", "1"),
            ("month", "1"),
            ("start_time", "0"),
            ("period", "60"),
        ];
        for (day, dayofweek) in [("0", "0"), ("5", "16")] {
            let mut f = fields(&base);
            f.insert("day".into(), day.into());
            f.insert("dayofweek".into(), dayofweek.into());
            let err = decode(&f, &config()).unwrap_err();
            assert_eq!(err.field(), Some("dayofweek"), "day={day} dayofweek={dayofweek}");
        }
    }

    #[test]
    fn test_decode_monthly_week_out_of_range() {
        let err = decode(
            &fields(&[
                ("timeperiod_type", "4"),
                ("every", "6"),
                ("month", "1"),
                ("dayofweek", "1"),
                ("day", "0"),
                ("start_time", "0"),
                ("period", "60"),
            ]),
            &config(),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("every"));
    }

    #[test]
    fn test_decode_monthly_no_months() {
        let err = decode(
            &fields(&[
                ("timeperiod_type", "4"),
                ("every", "1"),
                ("month", "0"),
                ("dayofweek", "0"),
                ("day", "1"),
                ("start_time", "0"),
                ("period", "60"),
            ]),
            &config(),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("month"));
    }

    #[test]
    fn test_decode_legacy_and_unknown_types() {
        for kind in ["1", "5", "9", "-1"] {
            let err = decode(&fields(&[("timeperiod_type", kind)]), &config()).unwrap_err();
            assert_eq!(err.field(), Some("timeperiod_type"), "type={kind}");
        }
    }

    // ── encode tests ────────────────────────────────────────────────────

    #[test]
    fn test_encode_writes_all_fields() {
        let raw = encode(&RecurrencePattern::Daily {
            every: 2,
            start_time: 3600,
            duration: 600,
        });
        assert_eq!(raw.len(), 8);
        assert_eq!(raw["timeperiod_type"], "2");
        assert_eq!(raw["every"], "2");
        assert_eq!(raw["dayofweek"], "0");
        assert_eq!(raw["month"], "0");
    }

    #[test]
    fn test_monthly_last_weekday_round_trip_keeps_day_zero() {
        let pattern = RecurrencePattern::Monthly {
            months: MonthSet::all(),
            on: MonthlyDay::Weekdays {
                week: WeekOfMonth::First,
                weekdays: [Weekday::Fri].into_iter().collect(),
            },
            start_time: 0,
            duration: 3600,
        };
        let raw = encode(&pattern);
        assert_eq!(raw["day"], "0");
        assert_eq!(raw["dayofweek"], "16");
        assert_eq!(raw["every"], "1");
        assert_eq!(raw["month"], "4095");
        assert_eq!(decode(&raw, &config()).unwrap(), pattern);
    }

    #[test]
    fn test_record_serde_and_decode() {
        let record: TimePeriodRecord = serde_json::from_str(
            r#"{"timeperiod_type": 3, "every": 2, "dayofweek": 65, "start_time": 7200, "period": 3600}"#,
        )
        .unwrap();
        let pattern = record.decode(&config()).unwrap();
        let RecurrencePattern::Weekly { weekdays, every, .. } = &pattern else {
            panic!("expected weekly pattern");
        };
        assert_eq!(*every, 2);
        assert_eq!(weekdays.iter().collect::<Vec<_>>(), vec![Weekday::Mon, Weekday::Sun]);
        assert_eq!(TimePeriodRecord::from(&pattern), record);
    }

    #[test]
    fn test_pattern_serde_shape() {
        let json = serde_json::to_value(RecurrencePattern::Weekly {
            every: 1,
            weekdays: [Weekday::Tue].into_iter().collect(),
            start_time: 0,
            duration: 60,
        })
        .unwrap();
        assert_eq!(json["type"], "weekly");
        assert_eq!(json["weekdays"], serde_json::json!(["Tue"]));
    }

    // ── property tests ──────────────────────────────────────────────────

    fn weekday_set() -> impl Strategy<Value = WeekdaySet> {
        (1u32..=127).prop_map(WeekdaySet::from_mask)
    }

    fn pattern() -> impl Strategy<Value = RecurrencePattern> {
        let start_time = 0u32..86_400;
        let duration = 1u32..=10 * 86_400;
        prop_oneof![
            (0i64..=i32::MAX as i64, duration.clone())
                .prop_map(|(start_date, duration)| RecurrencePattern::OneTime { start_date, duration }),
            (1u16..=999, start_time.clone(), duration.clone()).prop_map(
                |(every, start_time, duration)| RecurrencePattern::Daily {
                    every,
                    start_time,
                    duration
                }
            ),
            (1u16..=99, weekday_set(), start_time.clone(), duration.clone()).prop_map(
                |(every, weekdays, start_time, duration)| RecurrencePattern::Weekly {
                    every,
                    weekdays,
                    start_time,
                    duration
                }
            ),
            (1u32..=4095, 1u8..=31, start_time.clone(), duration.clone()).prop_map(
                |(mask, day, start_time, duration)| RecurrencePattern::Monthly {
                    months: MonthSet::from_mask(mask),
                    on: MonthlyDay::DayOfMonth(day),
                    start_time,
                    duration
                }
            ),
            (1u32..=4095, 1i64..=5, weekday_set(), start_time, duration).prop_map(
                |(mask, week, weekdays, start_time, duration)| RecurrencePattern::Monthly {
                    months: MonthSet::from_mask(mask),
                    on: MonthlyDay::Weekdays {
                        week: WeekOfMonth::from_number(week).unwrap(),
                        weekdays
                    },
                    start_time,
                    duration
                }
            ),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(p in pattern()) {
            prop_assert_eq!(decode(&encode(&p), &config()).unwrap(), p);
        }

        #[test]
        fn prop_weekday_mask_round_trip(mask in 0u32..=127) {
            prop_assert_eq!(WeekdaySet::from_mask(mask).to_mask(), mask);
        }

        #[test]
        fn prop_month_mask_round_trip(mask in 0u32..=4095) {
            prop_assert_eq!(MonthSet::from_mask(mask).to_mask(), mask);
        }
    }
}
