//! Resolution of `(from, to)` expression pairs and their length bounds.

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, PeriodBounds};
use crate::error::{Result, TimePeriodError};
use crate::expression::{Side, TimeExpression, TimeUnit, Timestamp};

/// A displayed range as the user wrote it (or as the navigator re-expressed it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: TimeExpression,
    pub to: TimeExpression,
}

impl TimeRange {
    pub fn new(from: TimeExpression, to: TimeExpression) -> Self {
        TimeRange { from, to }
    }

    /// Parse both sides, checking absolute literals against the storable range.
    pub fn parse(from: &str, to: &str, config: &EngineConfig) -> Result<Self> {
        Ok(TimeRange {
            from: TimeExpression::parse(from, config)?,
            to: TimeExpression::parse(to, config)?,
        })
    }

    /// `now-<seconds>` .. `now`.
    pub fn last(seconds: u32) -> Self {
        TimeRange {
            from: TimeExpression::Relative(crate::expression::RelativeSpec::ago(seconds)),
            to: TimeExpression::now(),
        }
    }
}

/// A range pinned to concrete timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub from_ts: Timestamp,
    pub to_ts: Timestamp,
}

impl ResolvedRange {
    pub fn length(&self) -> i64 {
        self.to_ts - self.from_ts
    }
}

/// Resolve both sides of `range` against `now`.
///
/// The `from` side resolves to the first second and the `to` side to the last
/// second of whatever period its expression denotes.
///
/// # Errors
///
/// Propagates expression errors, and returns [`TimePeriodError::RangeInverted`]
/// if `from_ts >= to_ts`.
pub fn resolve_pair(range: &TimeRange, now: Timestamp, config: &EngineConfig) -> Result<ResolvedRange> {
    let from_ts = range.from.resolve_side(now, Side::From, config)?;
    let to_ts = range.to.resolve_side(now, Side::To, config)?;

    if from_ts >= to_ts {
        return Err(TimePeriodError::RangeInverted { from_ts, to_ts });
    }

    Ok(ResolvedRange { from_ts, to_ts })
}

/// Check that `to_ts - from_ts` lies within `bounds`.
pub fn enforce_bounds(from_ts: Timestamp, to_ts: Timestamp, bounds: &PeriodBounds) -> Result<()> {
    let length = to_ts - from_ts;

    if length < bounds.min_period {
        return Err(TimePeriodError::RangeTooShort {
            length,
            min_period: bounds.min_period,
            min_label: format_period(bounds.min_period),
        });
    }
    if length > bounds.max_period {
        return Err(TimePeriodError::RangeTooLong {
            length,
            max_period: bounds.max_period,
            max_label: format_period(bounds.max_period),
        });
    }

    Ok(())
}

/// Human label for a range: named quick ranges ("Today", "Previous week"),
/// "Last N units" for a single negative offset ending at `now`, otherwise
/// `"from – to"`.
pub fn range_label(from: &TimeExpression, to: &TimeExpression) -> String {
    let from_text = from.to_string();
    let to_text = to.to_string();

    if let Some(label) = named_range(&from_text, &to_text) {
        return label.to_string();
    }

    if to.is_now() {
        if let TimeExpression::Relative(spec) = from {
            if let ([step], None) = (spec.steps.as_slice(), spec.snap) {
                if step.negative {
                    if let Some(label) = last_n_label(step.amount as i64, step.unit) {
                        return label;
                    }
                }
            }
        }
    }

    format!("{} – {}", from_text, to_text)
}

const NAMED_RANGES: &[(&str, &str, &str)] = &[
    ("now-1d/d", "now-1d/d", "Yesterday"),
    ("now-2d/d", "now-2d/d", "Day before yesterday"),
    ("now-1w/d", "now-1w/d", "This day last week"),
    ("now-1w/w", "now-1w/w", "Previous week"),
    ("now-1M/M", "now-1M/M", "Previous month"),
    ("now-1y/y", "now-1y/y", "Previous year"),
    ("now/d", "now/d", "Today"),
    ("now/d", "now", "Today so far"),
    ("now/w", "now/w", "This week"),
    ("now/w", "now", "This week so far"),
    ("now/M", "now/M", "This month"),
    ("now/M", "now", "This month so far"),
    ("now/y", "now/y", "This year"),
    ("now/y", "now", "This year so far"),
];

fn named_range(from: &str, to: &str) -> Option<&'static str> {
    NAMED_RANGES
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, label)| *label)
}

/// The named quick ranges, in display order, as `(from, to, label)`.
pub fn named_ranges() -> impl Iterator<Item = (&'static str, &'static str, &'static str)> {
    NAMED_RANGES.iter().copied()
}

/// "Last N <unit>" with seconds, minutes and hours promoted to the next unit
/// when they divide evenly.
fn last_n_label(mut value: i64, mut unit: TimeUnit) -> Option<String> {
    loop {
        let (next, factor) = match unit {
            TimeUnit::Second => (TimeUnit::Minute, 60),
            TimeUnit::Minute => (TimeUnit::Hour, 60),
            TimeUnit::Hour => (TimeUnit::Day, 24),
            _ => break,
        };
        if value < factor || value % factor != 0 {
            break;
        }
        value /= factor;
        unit = next;
    }

    let noun = match unit {
        TimeUnit::Second => "second",
        TimeUnit::Minute => "minute",
        TimeUnit::Hour => "hour",
        TimeUnit::Day => "day",
        TimeUnit::Month => "month",
        TimeUnit::Year => "year",
        TimeUnit::Week => return None,
    };
    Some(format!("Last {} {}{}", value, noun, plural(value)))
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Format a number of seconds as e.g. "2 days, 3 hours, 15 minutes".
pub fn format_period(total_seconds: i64) -> String {
    let abs_seconds = total_seconds.unsigned_abs();

    let days = (abs_seconds / 86400) as i64;
    let remainder = abs_seconds % 86400;
    let hours = (remainder / 3600) as i64;
    let remainder = remainder % 3600;
    let minutes = (remainder / 60) as i64;
    let seconds = (remainder % 60) as i64;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{} day{}", days, plural(days)));
    }
    if hours > 0 {
        parts.push(format!("{} hour{}", hours, plural(hours)));
    }
    if minutes > 0 {
        parts.push(format!("{} minute{}", minutes, plural(minutes)));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{} second{}", seconds, plural(seconds)));
    }
    parts.join(", ")
}

// ── Tests ───────────────────────────────────────────────────────────────────
