//! Occurrence search for maintenance periods.
//!
//! A [`RecurrencePattern`] is rendered to an RFC 5545 `DTSTART`/`RRULE` pair
//! and expanded with the `rrule` crate, so month lengths, leap days and "last
//! weekday of the month" come out exact.
//!
//! Repeating patterns are phased against an anchor: the day (daily), the
//! Monday-started week (weekly) or the month (monthly) containing it. `every`
//! counts cycles from that anchor cycle. Only occurrences inside or after the
//! anchor cycle are reported.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::trace;

use crate::config::SEC_PER_DAY;
use crate::error::{Result, TimePeriodError};
use crate::expression::{local_to_timestamp, timestamp_to_local, Timestamp};
use crate::recurrence::{MonthlyDay, RecurrencePattern, WeekOfMonth, WeekdaySet};

const RRULE_DATE_TIME: &str = "%Y%m%dT%H%M%S";

/// Render `pattern` as a `DTSTART` line and an `RRULE` line, phased against
/// the cycle containing `anchor`.
///
/// `DTSTART` is placed one full cycle before the anchor cycle, which keeps the
/// phase of `every` while guaranteeing the start itself never lands inside the
/// anchor cycle.
pub fn to_rrule(pattern: &RecurrencePattern, anchor: Timestamp, tz: &Tz) -> Result<String> {
    let anchor_date = timestamp_to_local(anchor, tz)?.date_naive();

    let (dtstart, rule) = match pattern {
        RecurrencePattern::OneTime { start_date, .. } => {
            let start = timestamp_to_local(*start_date, tz)?.naive_local();
            (start, "FREQ=DAILY;COUNT=1".to_string())
        }
        RecurrencePattern::Daily {
            every, start_time, ..
        } => {
            let day = shift_days(anchor_date, -(*every as i64))?;
            (
                at_time_of_day(day, *start_time)?,
                format!("FREQ=DAILY;INTERVAL={}", every),
            )
        }
        RecurrencePattern::Weekly {
            every,
            weekdays,
            start_time,
            ..
        } => {
            let monday = week_start(anchor_date)?;
            let day = shift_days(monday, -7 * (*every as i64))?;
            (
                at_time_of_day(day, *start_time)?,
                format!(
                    "FREQ=WEEKLY;INTERVAL={};WKST=MO;BYDAY={}",
                    every,
                    byday(weekdays, None)
                ),
            )
        }
        RecurrencePattern::Monthly {
            months,
            on,
            start_time,
            ..
        } => {
            let first = month_start(anchor_date)?;
            let day = first
                .checked_sub_months(chrono::Months::new(1))
                .ok_or_else(|| out_of_range(anchor))?;
            let bymonth = months
                .iter()
                .map(|m| m.number_from_month().to_string())
                .collect::<Vec<_>>()
                .join(",");
            let selector = match on {
                MonthlyDay::DayOfMonth(d) => format!("BYMONTHDAY={}", d),
                MonthlyDay::Weekdays { week, weekdays } => {
                    format!("BYDAY={}", byday(weekdays, Some(*week)))
                }
            };
            (
                at_time_of_day(day, *start_time)?,
                format!("FREQ=MONTHLY;BYMONTH={};{}", bymonth, selector),
            )
        }
    };

    Ok(format!("{}\nRRULE:{}", dtstart_line(&dtstart, tz), rule))
}

/// First occurrence start strictly after `after`, with `every` counted from
/// the cycle containing `after`.
pub fn next_occurrence(
    pattern: &RecurrencePattern,
    after: Timestamp,
    tz: &Tz,
) -> Result<Option<Timestamp>> {
    next_occurrence_since(pattern, after, after, tz)
}

/// First occurrence start strictly after `after`, with `every` counted from
/// the cycle containing `active_since`.
pub fn next_occurrence_since(
    pattern: &RecurrencePattern,
    active_since: Timestamp,
    after: Timestamp,
    tz: &Tz,
) -> Result<Option<Timestamp>> {
    let anchor = fast_forward(pattern, active_since, after, tz)?;
    let lower = match pattern {
        RecurrencePattern::OneTime { .. } => after + 1,
        _ => (after + 1).max(cycle_start(pattern, anchor, tz)?),
    };

    let text = to_rrule(pattern, anchor, tz)?;
    let set: RRuleSet = text
        .parse()
        .map_err(|e: rrule::RRuleError| TimePeriodError::Recurrence(e.to_string()))?;

    let bound = rrule::Tz::UTC
        .timestamp_opt(lower - 1, 0)
        .single()
        .ok_or_else(|| out_of_range(lower))?;
    let result = set.after(bound).all(2);

    let next = result
        .dates
        .iter()
        .map(|dt| dt.timestamp())
        .find(|ts| *ts >= lower);

    trace!(rrule = %text, after, next = ?next, "expanded recurrence");
    Ok(next)
}

/// The occurrence window containing `now`, clipped to the maintenance's
/// `[active_since, active_until)` activity window. A recurring occurrence
/// that began before `active_since` does not count; a one-time period is
/// clipped instead.
pub fn active_window(
    pattern: &RecurrencePattern,
    active_since: Timestamp,
    active_until: Timestamp,
    now: Timestamp,
    tz: &Tz,
) -> Result<Option<(Timestamp, Timestamp)>> {
    if now < active_since || now >= active_until {
        return Ok(None);
    }

    let duration = pattern.duration() as i64;
    let Some(start) = next_occurrence_since(pattern, active_since, now - duration, tz)? else {
        return Ok(None);
    };
    if start > now {
        return Ok(None);
    }
    if start < active_since && !matches!(pattern, RecurrencePattern::OneTime { .. }) {
        return Ok(None);
    }

    let window = (start.max(active_since), (start + duration).min(active_until));
    Ok((window.0 <= now && now < window.1).then_some(window))
}

/// Move `since` forward by whole `every` cycles to the last cycle start not
/// after `after`, so expansion does not walk years of past occurrences.
fn fast_forward(
    pattern: &RecurrencePattern,
    since: Timestamp,
    after: Timestamp,
    tz: &Tz,
) -> Result<Timestamp> {
    if after <= since {
        return Ok(since);
    }
    let since_date = timestamp_to_local(since, tz)?.date_naive();
    let after_date = timestamp_to_local(after, tz)?.date_naive();

    let (from, cycle_days) = match pattern {
        RecurrencePattern::OneTime { .. } => return Ok(since),
        RecurrencePattern::Monthly { .. } => return Ok(after),
        RecurrencePattern::Daily { every, .. } => (since_date, *every as i64),
        RecurrencePattern::Weekly { every, .. } => (week_start(since_date)?, 7 * *every as i64),
    };

    let elapsed = after_date.signed_duration_since(from).num_days();
    if elapsed < cycle_days {
        return Ok(since);
    }
    let day = shift_days(from, elapsed - elapsed % cycle_days)?;
    local_to_timestamp(tz, &day.and_time(NaiveTime::default()))
}

/// Start of the day, Monday-started week, or month containing `anchor`.
fn cycle_start(pattern: &RecurrencePattern, anchor: Timestamp, tz: &Tz) -> Result<Timestamp> {
    let date = timestamp_to_local(anchor, tz)?.date_naive();
    let day = match pattern {
        RecurrencePattern::OneTime { .. } | RecurrencePattern::Daily { .. } => date,
        RecurrencePattern::Weekly { .. } => week_start(date)?,
        RecurrencePattern::Monthly { .. } => month_start(date)?,
    };
    local_to_timestamp(tz, &day.and_time(NaiveTime::default()))
}

fn dtstart_line(start: &NaiveDateTime, tz: &Tz) -> String {
    if *tz == chrono_tz::UTC {
        format!("DTSTART:{}Z", start.format(RRULE_DATE_TIME))
    } else {
        format!("DTSTART;TZID={}:{}", tz.name(), start.format(RRULE_DATE_TIME))
    }
}

fn byday(weekdays: &WeekdaySet, week: Option<WeekOfMonth>) -> String {
    let prefix = match week {
        None => "",
        Some(WeekOfMonth::First) => "1",
        Some(WeekOfMonth::Second) => "2",
        Some(WeekOfMonth::Third) => "3",
        Some(WeekOfMonth::Fourth) => "4",
        Some(WeekOfMonth::Last) => "-1",
    };
    weekdays
        .iter()
        .map(|day| format!("{}{}", prefix, weekday_code(day)))
        .collect::<Vec<_>>()
        .join(",")
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn at_time_of_day(date: NaiveDate, seconds: u32) -> Result<NaiveDateTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)
        .filter(|_| (seconds as i64) < SEC_PER_DAY)
        .map(|time| date.and_time(time))
        .ok_or_else(|| TimePeriodError::invalid_field("start_time", "must be a time of day"))
}

fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    chrono::Duration::try_days(days)
        .and_then(|d| date.checked_add_signed(d))
        .ok_or_else(|| TimePeriodError::InvalidDate(format!("{} is out of range", date)))
}

fn week_start(date: NaiveDate) -> Result<NaiveDate> {
    shift_days(date, -(date.weekday().num_days_from_monday() as i64))
}

fn month_start(date: NaiveDate) -> Result<NaiveDate> {
    date.with_day(1)
        .ok_or_else(|| TimePeriodError::InvalidDate(format!("{} is out of range", date)))
}

fn out_of_range(ts: Timestamp) -> TimePeriodError {
    TimePeriodError::InvalidDate(format!("timestamp {} is out of range", ts))
}

// ── Tests ───────────────────────────────────────────────────────────────────
