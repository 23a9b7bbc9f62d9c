//! SLA schedules: per-weekday `HH:MM-HH:MM` text compiled into intervals of a
//! Sunday-started week, plus excluded downtimes.
//!
//! Interval offsets count seconds from Sunday 00:00 local time, so Monday
//! 08:00 is `86400 + 28800`. An absent schedule means the service is counted
//! around the clock ([`WeeklySchedule::Always`]).

use std::collections::HashMap;

use chrono::{Datelike, Timelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{SEC_PER_DAY, SEC_PER_WEEK};
use crate::error::{Result, TimePeriodError};
use crate::expression::{format_time_of_day, parse_time_of_day, timestamp_to_local, Timestamp};
use crate::recurrence::WeekdaySet;

/// Weekdays in schedule order (Sunday first).
const SCHEDULE_WEEK: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// A half-open `[period_from, period_to)` span in seconds since Sunday 00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScheduleInterval {
    pub period_from: u32,
    pub period_to: u32,
}

impl ScheduleInterval {
    pub fn new(period_from: u32, period_to: u32) -> Self {
        ScheduleInterval {
            period_from,
            period_to,
        }
    }

    pub fn len(&self) -> u32 {
        self.period_to - self.period_from
    }

    pub fn is_empty(&self) -> bool {
        self.period_to <= self.period_from
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.period_from <= offset && offset < self.period_to
    }
}

/// A stored SLA schedule. `null` in JSON is [`WeeklySchedule::Always`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<Vec<ScheduleInterval>>", into = "Option<Vec<ScheduleInterval>>")]
pub enum WeeklySchedule {
    Always,
    Intervals(Vec<ScheduleInterval>),
}

impl WeeklySchedule {
    /// Whether the local wall-clock time of `ts` in `tz` falls in the schedule.
    pub fn contains(&self, ts: Timestamp, tz: &Tz) -> Result<bool> {
        let intervals = match self {
            WeeklySchedule::Always => return Ok(true),
            WeeklySchedule::Intervals(intervals) => intervals,
        };
        let local = timestamp_to_local(ts, tz)?;
        let offset = local.weekday().num_days_from_sunday() * SEC_PER_DAY as u32
            + local.num_seconds_from_midnight();
        Ok(intervals.iter().any(|interval| interval.contains(offset)))
    }

    /// Seconds per week the schedule covers.
    pub fn weekly_seconds(&self) -> u32 {
        match self {
            WeeklySchedule::Always => SEC_PER_WEEK as u32,
            WeeklySchedule::Intervals(intervals) => match normalize(intervals.clone()) {
                WeeklySchedule::Always => SEC_PER_WEEK as u32,
                WeeklySchedule::Intervals(merged) => merged.iter().map(|i| i.len()).sum(),
            },
        }
    }
}

impl From<Option<Vec<ScheduleInterval>>> for WeeklySchedule {
    fn from(intervals: Option<Vec<ScheduleInterval>>) -> Self {
        match intervals {
            None => WeeklySchedule::Always,
            Some(intervals) => WeeklySchedule::Intervals(intervals),
        }
    }
}

impl From<WeeklySchedule> for Option<Vec<ScheduleInterval>> {
    fn from(schedule: WeeklySchedule) -> Self {
        match schedule {
            WeeklySchedule::Always => None,
            WeeklySchedule::Intervals(intervals) => Some(intervals),
        }
    }
}

/// Parse one day's `H:MM-H:MM[,H:MM-H:MM...]` text into sorted second offsets
/// within the day. Blank text yields no periods.
///
/// # Errors
///
/// [`TimePeriodError::InvalidFieldValue`] for a token that is not a time span,
/// minutes above 59, a value past `24:00`, an empty or reversed span, or two
/// spans that overlap.
pub fn parse_day_spec(text: &str) -> Result<Vec<(u32, u32)>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut periods = text
        .split(',')
        .map(|token| {
            let token = token.trim();
            let invalid = || {
                TimePeriodError::invalid_field(
                    "schedule",
                    format!("\"{}\" is not a valid time period", token),
                )
            };
            let (from, to) = token.split_once('-').ok_or_else(invalid)?;
            let from = parse_time_of_day(from, true).ok_or_else(invalid)?;
            let to = parse_time_of_day(to, true).ok_or_else(invalid)?;
            if from >= to {
                return Err(TimePeriodError::invalid_field(
                    "schedule",
                    format!("\"{}\": start time must be before end time", token),
                ));
            }
            Ok((from, to))
        })
        .collect::<Result<Vec<_>>>()?;

    periods.sort_unstable();
    if let Some(pair) = periods.windows(2).find(|pair| pair[1].0 < pair[0].1) {
        return Err(TimePeriodError::invalid_field(
            "schedule",
            format!(
                "periods {}-{} and {}-{} overlap",
                format_time_of_day(pair[0].0),
                format_time_of_day(pair[0].1),
                format_time_of_day(pair[1].0),
                format_time_of_day(pair[1].1)
            ),
        ));
    }
    Ok(periods)
}

/// Compile the enabled days' specs into one sorted interval list.
///
/// Days not in `enabled`, and enabled days with blank text, contribute
/// nothing. Parse errors are reported against `schedule.<weekday>`.
pub fn compile(
    per_weekday: &HashMap<Weekday, String>,
    enabled: &WeekdaySet,
) -> Result<Vec<ScheduleInterval>> {
    let mut intervals = Vec::new();

    for day in SCHEDULE_WEEK.into_iter().filter(|day| enabled.contains(*day)) {
        let Some(text) = per_weekday.get(&day) else {
            continue;
        };
        let periods = parse_day_spec(text).map_err(|e| match e {
            TimePeriodError::InvalidFieldValue { reason, .. } => {
                TimePeriodError::invalid_field(&format!("schedule.{}", day_key(day)), reason)
            }
            other => other,
        })?;
        let base = day.num_days_from_sunday() * SEC_PER_DAY as u32;
        intervals.extend(
            periods
                .into_iter()
                .map(|(from, to)| ScheduleInterval::new(base + from, base + to)),
        );
    }

    if intervals.is_empty() {
        return Err(TimePeriodError::EmptySchedule);
    }

    intervals.sort_unstable();
    debug!(count = intervals.len(), "compiled SLA schedule");
    Ok(intervals)
}

/// Sort and merge overlapping or touching intervals; full-week coverage
/// collapses to [`WeeklySchedule::Always`].
pub fn normalize(mut intervals: Vec<ScheduleInterval>) -> WeeklySchedule {
    intervals.retain(|interval| !interval.is_empty());
    intervals.sort_unstable();

    let mut merged: Vec<ScheduleInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.period_from <= last.period_to => {
                last.period_to = last.period_to.max(interval.period_to);
            }
            _ => merged.push(interval),
        }
    }

    if let [only] = merged.as_slice() {
        if only.period_from == 0 && only.period_to >= SEC_PER_WEEK as u32 {
            return WeeklySchedule::Always;
        }
    }
    WeeklySchedule::Intervals(merged)
}

/// Decompile intervals back into per-weekday text, splitting spans that cross
/// midnight. Days without periods are absent from the result.
pub fn to_day_specs(intervals: &[ScheduleInterval]) -> HashMap<Weekday, String> {
    let day = SEC_PER_DAY as u32;
    let mut per_day: HashMap<Weekday, Vec<String>> = HashMap::new();

    for interval in intervals {
        let mut from = interval.period_from;
        let to = interval.period_to.min(SEC_PER_WEEK as u32);
        while from < to {
            let index = from / day;
            let day_end = (index + 1) * day;
            let end = to.min(day_end);
            per_day
                .entry(SCHEDULE_WEEK[index as usize])
                .or_default()
                .push(format!(
                    "{}-{}",
                    format_time_of_day(from - index * day),
                    format_time_of_day(end - index * day)
                ));
            from = end;
        }
    }

    per_day
        .into_iter()
        .map(|(weekday, spans)| (weekday, spans.join(",")))
        .collect()
}

fn day_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

// ── Excluded downtimes ──────────────────────────────────────────────────────

/// A named absolute interval removed from SLA uptime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedDowntime {
    pub name: String,
    pub period_from: Timestamp,
    pub period_to: Timestamp,
}

impl ExcludedDowntime {
    pub fn validate(&self, max_date: Timestamp) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TimePeriodError::MissingRequiredField("name".to_string()));
        }
        for (field, value) in [("period_from", self.period_from), ("period_to", self.period_to)] {
            if value < 0 || value > max_date {
                return Err(TimePeriodError::invalid_field(
                    field,
                    format!("must be between 0 and {}", max_date),
                ));
            }
        }
        if self.period_from >= self.period_to {
            return Err(TimePeriodError::RangeInverted {
                from_ts: self.period_from,
                to_ts: self.period_to,
            });
        }
        Ok(())
    }

    pub fn overlaps(&self, from_ts: Timestamp, to_ts: Timestamp) -> bool {
        self.period_from < to_ts && from_ts < self.period_to
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
