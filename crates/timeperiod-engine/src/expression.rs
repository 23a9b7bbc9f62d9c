//! Time expressions: absolute date/time literals and relative `now` expressions.
//!
//! A relative expression is the literal `now` followed by a list of signed
//! offsets (`-1d`, `+30m`) and an optional trailing snap (`/d`), for example
//! `now-1d/d`. The parser builds an explicit step list instead of matching one
//! big pattern, so every step is inspectable and the text can be rendered back
//! exactly as it was written.
//!
//! Absolute literals use the `YYYY-MM-DD HH:MM:SS` layout and may be cut short
//! at any component (`2026-02`, `2026-02-18 14`). A truncated literal covers a
//! whole period, so its resolution depends on which side of a range it sits:
//! the `from` side takes the first second of the period and the `to` side takes
//! the last one. Snapped relative expressions behave the same way.
//!
//! All resolution is done against an explicit `now` timestamp supplied by the
//! caller; nothing here reads the system clock.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, WeekStartDay, SEC_PER_DAY, SEC_PER_HOUR, SEC_PER_MIN};
use crate::error::{Result, TimePeriodError};

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// Full-precision layout used when freezing a timestamp into an absolute expression.
pub const FULL_DATE_TIME: &str = "%Y-%m-%d %H:%M:%S";

// ── Units ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeUnit {
    pub fn from_char(c: char) -> Option<TimeUnit> {
        match c {
            'y' => Some(TimeUnit::Year),
            'M' => Some(TimeUnit::Month),
            'w' => Some(TimeUnit::Week),
            'd' => Some(TimeUnit::Day),
            'h' => Some(TimeUnit::Hour),
            'm' => Some(TimeUnit::Minute),
            's' => Some(TimeUnit::Second),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            TimeUnit::Year => 'y',
            TimeUnit::Month => 'M',
            TimeUnit::Week => 'w',
            TimeUnit::Day => 'd',
            TimeUnit::Hour => 'h',
            TimeUnit::Minute => 'm',
            TimeUnit::Second => 's',
        }
    }

    /// Nominal length in seconds (30-day months, 365-day years).
    pub fn nominal_seconds(self) -> i64 {
        match self {
            TimeUnit::Year => 365 * SEC_PER_DAY,
            TimeUnit::Month => 30 * SEC_PER_DAY,
            TimeUnit::Week => 7 * SEC_PER_DAY,
            TimeUnit::Day => SEC_PER_DAY,
            TimeUnit::Hour => SEC_PER_HOUR,
            TimeUnit::Minute => SEC_PER_MIN,
            TimeUnit::Second => 1,
        }
    }

    /// Years, months, weeks and days follow the wall clock.
    pub fn is_calendar(self) -> bool {
        matches!(self, TimeUnit::Year | TimeUnit::Month | TimeUnit::Week | TimeUnit::Day)
    }
}

/// Which end of a range an expression is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// First second of the denoted period.
    From,
    /// Last second of the denoted period.
    To,
}

// ── Relative expressions ────────────────────────────────────────────────────

/// One `±N<unit>` step of a relative expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeStep {
    pub negative: bool,
    pub amount: u32,
    pub unit: TimeUnit,
}

impl RelativeStep {
    pub fn new(negative: bool, amount: u32, unit: TimeUnit) -> Self {
        RelativeStep {
            negative,
            amount,
            unit,
        }
    }

    fn signed_amount(&self) -> i64 {
        if self.negative {
            -(self.amount as i64)
        } else {
            self.amount as i64
        }
    }
}

impl fmt::Display for RelativeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.negative { '-' } else { '+' };
        write!(f, "{}{}{}", sign, self.amount, self.unit.as_char())
    }
}

/// Parsed form of `now[±N<unit>...][/<unit>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelativeSpec {
    pub steps: Vec<RelativeStep>,
    pub snap: Option<TimeUnit>,
}

impl RelativeSpec {
    /// Plain `now`.
    pub fn now() -> Self {
        RelativeSpec::default()
    }

    /// `now-<seconds>` written with the largest unit that divides the length
    /// evenly (days, hours, minutes or seconds).
    pub fn ago(seconds: u32) -> Self {
        let unit = [TimeUnit::Day, TimeUnit::Hour, TimeUnit::Minute]
            .into_iter()
            .find(|unit| {
                let size = unit.nominal_seconds() as u32;
                seconds >= size && seconds % size == 0
            })
            .unwrap_or(TimeUnit::Second);
        let amount = seconds / unit.nominal_seconds() as u32;
        RelativeSpec {
            steps: vec![RelativeStep::new(true, amount, unit)],
            snap: None,
        }
    }

    pub fn is_now(&self) -> bool {
        self.steps.is_empty() && self.snap.is_none()
    }

    /// Resolve against `now` in `tz`. Calendar steps and snaps move the wall
    /// clock; hour, minute and second steps are exact elapsed seconds.
    pub fn resolve(
        &self,
        now: Timestamp,
        side: Side,
        tz: &Tz,
        week_start: WeekStartDay,
    ) -> Result<Timestamp> {
        let out_of_range = || TimePeriodError::InvalidDate(format!("'{}' is out of range", self));
        let mut current = timestamp_to_local(now, tz)?;

        for step in &self.steps {
            current = if step.unit.is_calendar() {
                let local = apply_step(current.naive_local(), step).ok_or_else(out_of_range)?;
                timestamp_to_local(local_to_timestamp(tz, &local)?, tz)?
            } else {
                step.signed_amount()
                    .checked_mul(step.unit.nominal_seconds())
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|offset| current.checked_add_signed(offset))
                    .ok_or_else(out_of_range)?
            };
        }

        let Some(unit) = self.snap else {
            return Ok(current.timestamp());
        };

        let local = current.naive_local();
        let start = snap_to_start(local, unit, week_start);

        if !unit.is_calendar() {
            let start = current.timestamp() - local.signed_duration_since(start).num_seconds();
            return Ok(match side {
                Side::From => start,
                Side::To => start + unit.nominal_seconds() - 1,
            });
        }

        match side {
            Side::From => local_to_timestamp(tz, &start),
            Side::To => {
                let next = advance(start, unit).ok_or_else(out_of_range)?;
                Ok(local_to_timestamp(tz, &next)? - 1)
            }
        }
    }
}

impl fmt::Display for RelativeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("now")?;
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        if let Some(unit) = self.snap {
            write!(f, "/{}", unit.as_char())?;
        }
        Ok(())
    }
}

/// Parse a relative expression such as `now`, `now-1h` or `now-1d/d`.
///
/// # Errors
///
/// Returns [`TimePeriodError::MalformedTimeExpression`] if the text does not
/// start with `now`, contains an unknown token, or has anything after a snap.
pub fn parse_relative(text: &str) -> Result<RelativeSpec> {
    let malformed = |why: &str| {
        TimePeriodError::MalformedTimeExpression(format!("'{}': {}", text.trim(), why))
    };

    let rest = text
        .trim()
        .strip_prefix("now")
        .ok_or_else(|| malformed("must start with 'now'"))?;

    let mut spec = RelativeSpec::now();
    let mut chars = rest.chars().peekable();

    while let Some(ch) = chars.next() {
        if spec.snap.is_some() {
            return Err(malformed("snap must be the last token"));
        }
        match ch {
            '+' | '-' => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                if digits.is_empty() {
                    return Err(malformed("expected a number after the sign"));
                }
                let amount: u32 = digits
                    .parse()
                    .map_err(|_| malformed("offset amount is too large"))?;
                let unit = chars
                    .next()
                    .and_then(TimeUnit::from_char)
                    .ok_or_else(|| malformed("expected one of y, M, w, d, h, m, s after the number"))?;
                spec.steps.push(RelativeStep::new(ch == '-', amount, unit));
            }
            '/' => {
                let unit = chars
                    .next()
                    .and_then(TimeUnit::from_char)
                    .filter(|unit| *unit != TimeUnit::Second)
                    .ok_or_else(|| malformed("expected one of y, M, w, d, h, m after '/'"))?;
                spec.snap = Some(unit);
            }
            other => return Err(malformed(&format!("unexpected character '{}'", other))),
        }
    }

    Ok(spec)
}

// ── Absolute expressions ────────────────────────────────────────────────────

/// How much of `YYYY-MM-DD HH:MM:SS` an absolute literal spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Precision {
    fn unit(self) -> TimeUnit {
        match self {
            Precision::Year => TimeUnit::Year,
            Precision::Month => TimeUnit::Month,
            Precision::Day => TimeUnit::Day,
            Precision::Hour => TimeUnit::Hour,
            Precision::Minute => TimeUnit::Minute,
            Precision::Second => TimeUnit::Second,
        }
    }

    fn layout(self) -> &'static str {
        match self {
            Precision::Year => "%Y",
            Precision::Month => "%Y-%m",
            Precision::Day => "%Y-%m-%d",
            Precision::Hour => "%Y-%m-%d %H",
            Precision::Minute => "%Y-%m-%d %H:%M",
            Precision::Second => FULL_DATE_TIME,
        }
    }
}

/// A wall-clock date/time literal; `start` is the first second it denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteTime {
    pub start: NaiveDateTime,
    pub precision: Precision,
}

impl AbsoluteTime {
    /// Full-precision literal for `ts` rendered in `tz`.
    pub fn from_timestamp(ts: Timestamp, tz: &Tz) -> Result<Self> {
        Ok(AbsoluteTime {
            start: timestamp_to_local(ts, tz)?.naive_local(),
            precision: Precision::Second,
        })
    }

    pub fn is_date_only(&self) -> bool {
        self.precision <= Precision::Day
    }

    pub fn resolve(&self, side: Side, tz: &Tz) -> Result<Timestamp> {
        let start = local_to_timestamp(tz, &self.start)?;
        match side {
            Side::From => Ok(start),
            Side::To if self.precision == Precision::Second => Ok(start),
            Side::To => {
                let next = advance(self.start, self.precision.unit()).ok_or_else(|| {
                    TimePeriodError::InvalidDate(format!("'{}' is out of range", self))
                })?;
                Ok(local_to_timestamp(tz, &next)? - 1)
            }
        }
    }
}

impl fmt::Display for AbsoluteTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start.format(self.precision.layout()))
    }
}

/// Parse an absolute literal without range checks.
fn parse_absolute_literal(text: &str) -> Result<AbsoluteTime> {
    let text = text.trim();
    let invalid = |why: &str| TimePeriodError::InvalidDate(format!("'{}': {}", text, why));

    let (date_part, time_part) = match text.split_once(' ') {
        Some((d, t)) => (d, Some(t)),
        None => (text, None),
    };

    let date_fields: Vec<&str> = date_part.split('-').collect();
    let widths = [4usize, 2, 2];
    if date_fields.len() > 3
        || date_fields
            .iter()
            .zip(widths)
            .any(|(field, width)| field.len() != width || !field.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(invalid("expected YYYY[-MM[-DD[ hh[:mm[:ss]]]]]"));
    }

    let number = |s: &str| s.parse::<u32>().map_err(|_| invalid("not a number"));
    let year = number(date_fields[0])? as i32;
    let month = date_fields.get(1).copied().map(|s| number(s)).transpose()?.unwrap_or(1);
    let day = date_fields.get(2).copied().map(|s| number(s)).transpose()?.unwrap_or(1);

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| invalid("no such date"))?;

    let mut precision = match date_fields.len() {
        1 => Precision::Year,
        2 => Precision::Month,
        _ => Precision::Day,
    };

    let time = match time_part {
        None => NaiveTime::default(),
        Some(_) if precision != Precision::Day => {
            return Err(invalid("a time requires a full date"));
        }
        Some(t) => {
            let fields: Vec<&str> = t.split(':').collect();
            if fields.len() > 3
                || fields
                    .iter()
                    .any(|f| f.len() != 2 || !f.bytes().all(|b| b.is_ascii_digit()))
            {
                return Err(invalid("expected hh[:mm[:ss]]"));
            }
            precision = match fields.len() {
                1 => Precision::Hour,
                2 => Precision::Minute,
                _ => Precision::Second,
            };
            let h = number(fields[0])?;
            let m = fields.get(1).copied().map(|s| number(s)).transpose()?.unwrap_or(0);
            let s = fields.get(2).copied().map(|s| number(s)).transpose()?.unwrap_or(0);
            NaiveTime::from_hms_opt(h, m, s).ok_or_else(|| invalid("no such time"))?
        }
    };

    Ok(AbsoluteTime {
        start: date.and_time(time),
        precision,
    })
}

/// Parse an absolute date or date-time literal and check it is storable.
///
/// # Errors
///
/// Returns [`TimePeriodError::InvalidDate`] if the text is not a valid literal,
/// or if it resolves (in the configured zone) to a negative timestamp or one
/// beyond `config.max_date`.
pub fn parse_absolute(text: &str, config: &EngineConfig) -> Result<AbsoluteTime> {
    let absolute = parse_absolute_literal(text)?;
    check_storable(&absolute, config)?;
    Ok(absolute)
}

fn check_storable(absolute: &AbsoluteTime, config: &EngineConfig) -> Result<()> {
    let ts = absolute.resolve(Side::From, &config.tz()?)?;
    if ts < 0 || ts > config.max_date {
        return Err(TimePeriodError::InvalidDate(format!(
            "'{}' is outside the supported range",
            absolute
        )));
    }
    Ok(())
}

/// Parse an `H:MM` or `HH:MM` time of day into seconds since midnight.
///
/// Returns `None` for anything else, including minutes above 59. With
/// `allow_end_of_day`, `24:00` is accepted and yields `86400`.
pub fn parse_time_of_day(text: &str, allow_end_of_day: bool) -> Option<u32> {
    let (hours, minutes) = text.trim().split_once(':')?;
    if hours.is_empty()
        || hours.len() > 2
        || minutes.len() != 2
        || !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if minutes > 59 {
        return None;
    }
    let seconds = hours * SEC_PER_HOUR as u32 + minutes * SEC_PER_MIN as u32;
    let limit = if allow_end_of_day {
        SEC_PER_DAY as u32
    } else {
        SEC_PER_DAY as u32 - 1
    };
    (seconds <= limit).then_some(seconds)
}

/// Render seconds since midnight as `HH:MM`.
pub fn format_time_of_day(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60)
}

// ── TimeExpression ──────────────────────────────────────────────────────────

/// Either an absolute literal or a relative `now` expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeExpression {
    Absolute(AbsoluteTime),
    Relative(RelativeSpec),
}

impl TimeExpression {
    pub fn now() -> Self {
        TimeExpression::Relative(RelativeSpec::now())
    }

    /// Parse `text` and, for absolute literals, check the storable range.
    pub fn parse(text: &str, config: &EngineConfig) -> Result<Self> {
        let expr: TimeExpression = text.parse()?;
        if let TimeExpression::Absolute(absolute) = &expr {
            check_storable(absolute, config)?;
        }
        Ok(expr)
    }

    /// Full-precision absolute expression for `ts`.
    pub fn frozen(ts: Timestamp, tz: &Tz) -> Result<Self> {
        AbsoluteTime::from_timestamp(ts, tz).map(TimeExpression::Absolute)
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, TimeExpression::Relative(_))
    }

    pub fn is_now(&self) -> bool {
        matches!(self, TimeExpression::Relative(spec) if spec.is_now())
    }

    /// Resolve as the start of a range.
    pub fn resolve(&self, now: Timestamp, config: &EngineConfig) -> Result<Timestamp> {
        self.resolve_side(now, Side::From, config)
    }

    pub fn resolve_side(
        &self,
        now: Timestamp,
        side: Side,
        config: &EngineConfig,
    ) -> Result<Timestamp> {
        let tz = config.tz()?;
        match self {
            TimeExpression::Absolute(absolute) => absolute.resolve(side, &tz),
            TimeExpression::Relative(spec) => spec.resolve(now, side, &tz, config.week_start),
        }
    }
}

impl FromStr for TimeExpression {
    type Err = TimePeriodError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimePeriodError::MalformedTimeExpression(
                "empty expression".to_string(),
            ));
        }
        if s.starts_with("now") {
            parse_relative(s).map(TimeExpression::Relative)
        } else {
            parse_absolute_literal(s).map(TimeExpression::Absolute)
        }
    }
}

impl TryFrom<String> for TimeExpression {
    type Error = TimePeriodError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeExpression> for String {
    fn from(value: TimeExpression) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeExpression::Absolute(absolute) => absolute.fmt(f),
            TimeExpression::Relative(spec) => spec.fmt(f),
        }
    }
}

// ── Calendar helpers ────────────────────────────────────────────────────────

pub(crate) fn timestamp_to_local(ts: Timestamp, tz: &Tz) -> Result<DateTime<Tz>> {
    tz.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| TimePeriodError::InvalidDate(format!("timestamp {} is out of range", ts)))
}

/// Map a wall-clock time to a timestamp. Ambiguous times take the earlier
/// instant; times skipped by a DST jump move forward by the gap.
pub(crate) fn local_to_timestamp(tz: &Tz, naive: &NaiveDateTime) -> Result<Timestamp> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Ok(dt.timestamp()),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.timestamp()),
        LocalResult::None => {
            let shifted = *naive + chrono::Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.timestamp())
                .ok_or_else(|| {
                    TimePeriodError::InvalidDate(format!("'{}' does not exist in {}", naive, tz))
                })
        }
    }
}

/// Format `ts` as `YYYY-MM-DD HH:MM:SS` in `tz`.
pub fn format_timestamp(ts: Timestamp, tz: &Tz) -> Result<String> {
    Ok(timestamp_to_local(ts, tz)?.format(FULL_DATE_TIME).to_string())
}

fn apply_step(local: NaiveDateTime, step: &RelativeStep) -> Option<NaiveDateTime> {
    let n = step.signed_amount();
    match step.unit {
        TimeUnit::Year => shift_months(local, n.checked_mul(12)?),
        TimeUnit::Month => shift_months(local, n),
        TimeUnit::Week => local.checked_add_signed(chrono::Duration::try_days(n.checked_mul(7)?)?),
        TimeUnit::Day => local.checked_add_signed(chrono::Duration::try_days(n)?),
        TimeUnit::Hour | TimeUnit::Minute | TimeUnit::Second => local
            .checked_add_signed(chrono::Duration::try_seconds(n.checked_mul(step.unit.nominal_seconds())?)?),
    }
}

/// Calendar month arithmetic; the day is clamped to the end of a shorter month.
fn shift_months(local: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        local.checked_add_months(magnitude)
    } else {
        local.checked_sub_months(magnitude)
    }
}

fn snap_to_start(local: NaiveDateTime, unit: TimeUnit, week_start: WeekStartDay) -> NaiveDateTime {
    let date = local.date();
    let midnight = |d: NaiveDate| d.and_time(NaiveTime::default());
    match unit {
        TimeUnit::Year => midnight(date.with_ordinal(1).unwrap_or(date)),
        TimeUnit::Month => midnight(date.with_day(1).unwrap_or(date)),
        TimeUnit::Week => {
            let back = week_start.days_from_start(date.weekday());
            midnight(date - chrono::Duration::days(back))
        }
        TimeUnit::Day => midnight(date),
        TimeUnit::Hour => local
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(local),
        TimeUnit::Minute => local
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(local),
        TimeUnit::Second => local.with_nanosecond(0).unwrap_or(local),
    }
}

/// Start of the period following the one starting at `start`.
fn advance(start: NaiveDateTime, unit: TimeUnit) -> Option<NaiveDateTime> {
    apply_step(start, &RelativeStep::new(false, 1, unit))
}

// ── Tests ───────────────────────────────────────────────────────────────────
