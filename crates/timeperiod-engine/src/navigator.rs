//! Time selector navigation.
//!
//! [`apply`] is a pure function from the current range and an operation to
//! the next range. It never stores anything, so a failed operation leaves the
//! caller's persisted range as it was.
//!
//! Results that end exactly at `now` are re-expressed relative to `now`
//! (`now-2h` .. `now`) so the range keeps following the clock. Any other
//! result is frozen to full-precision absolute timestamps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EngineConfig, PeriodBounds};
use crate::error::{Result, TimePeriodError};
use crate::expression::{RelativeSpec, Side, TimeExpression, Timestamp};
use crate::range::{enforce_bounds, resolve_pair, ResolvedRange, TimeRange};

/// One time selector action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum NavigationOp {
    /// Move forward by one range length.
    Increment,
    /// Move back by one range length, stopping at the epoch.
    Decrement,
    /// Double the length around the midpoint, up to the maximum period.
    ZoomOut,
    /// Replace the range with new expressions.
    RangeChange { from: TimeExpression, to: TimeExpression },
    /// Move each end forward by its own number of seconds.
    RangeOffset { from_offset: i64, to_offset: i64 },
}

impl NavigationOp {
    pub fn method(&self) -> Method {
        match self {
            NavigationOp::Increment => Method::Increment,
            NavigationOp::Decrement => Method::Decrement,
            NavigationOp::ZoomOut => Method::ZoomOut,
            NavigationOp::RangeChange { .. } => Method::RangeChange,
            NavigationOp::RangeOffset { .. } => Method::RangeOffset,
        }
    }
}

/// Operation name as it appears in requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Increment,
    Decrement,
    ZoomOut,
    RangeChange,
    RangeOffset,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Increment => "increment",
            Method::Decrement => "decrement",
            Method::ZoomOut => "zoomout",
            Method::RangeChange => "rangechange",
            Method::RangeOffset => "rangeoffset",
        }
    }
}

impl FromStr for Method {
    type Err = TimePeriodError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "increment" => Ok(Method::Increment),
            "decrement" => Ok(Method::Decrement),
            "zoomout" => Ok(Method::ZoomOut),
            "rangechange" => Ok(Method::RangeChange),
            "rangeoffset" => Ok(Method::RangeOffset),
            other => Err(TimePeriodError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply `op` to `current` as seen at `now`.
///
/// # Errors
///
/// Propagates resolution errors of the current range, and returns
/// [`TimePeriodError::RangeTooShort`] / [`TimePeriodError::RangeTooLong`] when
/// the result violates `bounds`.
pub fn apply(
    current: &TimeRange,
    now: Timestamp,
    op: &NavigationOp,
    bounds: &PeriodBounds,
    config: &EngineConfig,
) -> Result<TimeRange> {
    let resolve = || resolve_pair(current, now, config);
    let (from_ts, to_ts) = match op {
        NavigationOp::RangeChange { from, to } => return change(from, to, now, bounds, config),
        NavigationOp::Increment => {
            let resolved = resolve()?;
            let step = step_length(current, &resolved, now, config)?;
            (resolved.from_ts + step, resolved.to_ts + step)
        }
        NavigationOp::Decrement => {
            let resolved = resolve()?;
            let step = step_length(current, &resolved, now, config)?.min(resolved.from_ts);
            (resolved.from_ts - step, resolved.to_ts - step)
        }
        NavigationOp::ZoomOut => zoom_out(&resolve()?, now, bounds),
        NavigationOp::RangeOffset {
            from_offset,
            to_offset,
        } => {
            for (field, offset) in [("from_offset", from_offset), ("to_offset", to_offset)] {
                if *offset < 0 {
                    return Err(TimePeriodError::invalid_field(field, "must not be negative"));
                }
            }
            let resolved = resolve()?;
            let shift = |ts: Timestamp, offset: i64, field: &str| {
                ts.checked_add(offset)
                    .ok_or_else(|| TimePeriodError::invalid_field(field, "is out of range"))
            };
            (
                shift(resolved.from_ts, *from_offset, "from_offset")?,
                shift(resolved.to_ts, *to_offset, "to_offset")?,
            )
        }
    };

    if from_ts >= to_ts {
        return Err(TimePeriodError::RangeInverted { from_ts, to_ts });
    }
    enforce_bounds(from_ts, to_ts, bounds)?;
    let next = reexpress(from_ts, to_ts, now, config)?;

    debug!(
        method = %op.method(),
        from = %next.from,
        to = %next.to,
        from_ts,
        to_ts,
        "navigated time range"
    );
    Ok(next)
}

/// Distance to move by: the resolved length, plus one second when the `to`
/// side covers a whole period and so resolves to that period's last second.
fn step_length(
    range: &TimeRange,
    resolved: &ResolvedRange,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<i64> {
    let to_start = range.to.resolve_side(now, Side::From, config)?;
    let inclusive_end = to_start != resolved.to_ts;
    Ok(resolved.length() + i64::from(inclusive_end))
}

fn zoom_out(resolved: &ResolvedRange, now: Timestamp, bounds: &PeriodBounds) -> (Timestamp, Timestamp) {
    let length = resolved.length();
    let zoomed = length.saturating_mul(2).min(bounds.max_period).max(length);

    let midpoint = resolved.from_ts + length / 2;
    let mut from_ts = midpoint - zoomed / 2;
    let mut to_ts = from_ts + zoomed;

    // a range that ended in the past or present does not grow into the future
    if resolved.to_ts <= now && to_ts > now {
        from_ts -= to_ts - now;
        to_ts = now;
    }
    if from_ts < 0 {
        to_ts -= from_ts;
        from_ts = 0;
    }
    (from_ts, to_ts)
}

fn change(
    from: &TimeExpression,
    to: &TimeExpression,
    now: Timestamp,
    bounds: &PeriodBounds,
    config: &EngineConfig,
) -> Result<TimeRange> {
    let requested = TimeRange::new(from.clone(), to.clone());
    let resolved = resolve_pair(&requested, now, config)?;
    enforce_bounds(resolved.from_ts, resolved.to_ts, bounds)?;

    let tz = config.tz()?;
    let from = match from {
        TimeExpression::Absolute(_) => TimeExpression::frozen(resolved.from_ts, &tz)?,
        relative => relative.clone(),
    };
    let to = match to {
        TimeExpression::Absolute(_) => TimeExpression::frozen(resolved.to_ts, &tz)?,
        relative => relative.clone(),
    };

    debug!(from = %from, to = %to, "changed time range");
    Ok(TimeRange::new(from, to))
}

/// Relative to `now` when the range ends exactly at `now`, otherwise frozen.
fn reexpress(
    from_ts: Timestamp,
    to_ts: Timestamp,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<TimeRange> {
    if to_ts == now {
        if let Ok(length) = u32::try_from(to_ts - from_ts) {
            return Ok(TimeRange::new(
                TimeExpression::Relative(RelativeSpec::ago(length)),
                TimeExpression::now(),
            ));
        }
    }

    if to_ts > config.max_date {
        return Err(TimePeriodError::invalid_field(
            "to",
            format!("must not be later than {}", config.max_date),
        ));
    }
    let tz = config.tz()?;
    Ok(TimeRange::new(
        TimeExpression::frozen(from_ts, &tz)?,
        TimeExpression::frozen(to_ts, &tz)?,
    ))
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Timestamp = 1_771_425_000; // 2026-02-18 14:30:00 UTC

    fn config() -> EngineConfig {
        EngineConfig {
            max_period: 2_592_000,
            ..EngineConfig::default()
        }
    }

    fn range(from: &str, to: &str) -> TimeRange {
        TimeRange::parse(from, to, &config()).unwrap()
    }

    fn run(current: &TimeRange, op: NavigationOp) -> Result<TimeRange> {
        let config = config();
        apply(current, NOW, &op, &config.bounds(), &config)
    }

    fn resolved(r: &TimeRange) -> ResolvedRange {
        resolve_pair(r, NOW, &config()).unwrap()
    }

    #[test]
    fn test_method_names() {
        for name in ["increment", "decrement", "zoomout", "rangechange", "rangeoffset"] {
            assert_eq!(name.parse::<Method>().unwrap().as_str(), name);
        }
        assert_eq!(
            "zoomin".parse::<Method>().unwrap_err(),
            TimePeriodError::UnknownMethod("zoomin".to_string())
        );
    }

    #[test]
    fn test_decrement_freezes_to_absolute() {
        let next = run(&range("now-1h", "now"), NavigationOp::Decrement).unwrap();
        assert_eq!(next, range("2026-02-18 12:30:00", "2026-02-18 13:30:00"));
    }

    #[test]
    fn test_increment_back_to_now_is_relative() {
        let next = run(&range("2026-02-18 12:30:00", "2026-02-18 13:30:00"), NavigationOp::Increment).unwrap();
        assert_eq!(next, range("now-1h", "now"));
    }

    #[test]
    fn test_increment_decrement_symmetry() {
        let start = range("now-1h", "now");
        let original = resolved(&start);

        let there_and_back = run(&run(&start, NavigationOp::Increment).unwrap(), NavigationOp::Decrement).unwrap();
        let back_and_there = run(&run(&start, NavigationOp::Decrement).unwrap(), NavigationOp::Increment).unwrap();

        for r in [there_and_back, back_and_there] {
            let r = resolved(&r);
            assert_eq!(r.length(), 3600);
            assert_eq!(r.to_ts, original.to_ts);
        }
    }

    #[test]
    fn test_increment_whole_day_moves_to_next_day() {
        let next = run(&range("now/d", "now/d"), NavigationOp::Increment).unwrap();
        assert_eq!(next, range("2026-02-19 00:00:00", "2026-02-19 23:59:59"));

        let prev = run(&range("now/d", "now/d"), NavigationOp::Decrement).unwrap();
        assert_eq!(prev, range("2026-02-17 00:00:00", "2026-02-17 23:59:59"));
    }

    #[test]
    fn test_decrement_stops_at_epoch() {
        let next = run(&range("1970-01-01 00:30:00", "1970-01-01 01:30:00"), NavigationOp::Decrement).unwrap();
        assert_eq!(next, range("1970-01-01 00:00:00", "1970-01-01 01:00:00"));
    }

    #[test]
    fn test_zoom_out_doubles_and_keeps_now() {
        let next = run(&range("now-1h", "now"), NavigationOp::ZoomOut).unwrap();
        assert_eq!(next, range("now-2h", "now"));
    }

    #[test]
    fn test_zoom_out_around_midpoint() {
        let next = run(&range("2026-02-10 10:00:00", "2026-02-10 12:00:00"), NavigationOp::ZoomOut).unwrap();
        assert_eq!(next, range("2026-02-10 09:00:00", "2026-02-10 13:00:00"));
    }

    #[test]
    fn test_zoom_out_reaches_ceiling_and_stays() {
        let mut current = range("now-1h", "now");
        for _ in 0..20 {
            current = run(&current, NavigationOp::ZoomOut).unwrap();
        }
        assert_eq!(resolved(&current).length(), 2_592_000);
        assert_eq!(current, range("now-30d", "now"));

        let again = run(&current, NavigationOp::ZoomOut).unwrap();
        assert_eq!(resolved(&again).length(), 2_592_000);
        assert_eq!(again, current);
    }

    #[test]
    fn test_zoom_out_near_epoch_shifts_right() {
        let next = run(&range("1970-01-01 00:00:00", "1970-01-01 02:00:00"), NavigationOp::ZoomOut).unwrap();
        assert_eq!(next, range("1970-01-01 00:00:00", "1970-01-01 04:00:00"));
    }

    #[test]
    fn test_range_change_keeps_relative_and_expands_absolute() {
        let next = run(
            &range("now-1h", "now"),
            NavigationOp::RangeChange {
                from: "2026-02-01".parse().unwrap(),
                to: "now".parse().unwrap(),
            },
        )
        .unwrap();
        assert_eq!(next, range("2026-02-01 00:00:00", "now"));

        let next = run(
            &range("now-1h", "now"),
            NavigationOp::RangeChange {
                from: "now-7d/d".parse().unwrap(),
                to: "2026-02-17".parse().unwrap(),
            },
        )
        .unwrap();
        assert_eq!(next, range("now-7d/d", "2026-02-17 23:59:59"));
    }

    #[test]
    fn test_range_change_bounds() {
        let err = run(
            &range("now-1h", "now"),
            NavigationOp::RangeChange {
                from: "now-30s".parse().unwrap(),
                to: "now".parse().unwrap(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TimePeriodError::RangeTooShort { .. }));

        let err = run(
            &range("now-1h", "now"),
            NavigationOp::RangeChange {
                from: "now-1y".parse().unwrap(),
                to: "now".parse().unwrap(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TimePeriodError::RangeTooLong { .. }));
        assert_eq!(err.to_string(), "Maximum time period to display is 30 days");
    }

    #[test]
    fn test_range_offset() {
        let next = run(
            &range("2026-02-18 10:00:00", "2026-02-18 12:00:00"),
            NavigationOp::RangeOffset {
                from_offset: 1800,
                to_offset: 600,
            },
        )
        .unwrap();
        assert_eq!(next, range("2026-02-18 10:30:00", "2026-02-18 12:10:00"));
    }

    #[test]
    fn test_range_offset_rejects_negative_and_short() {
        let current = range("2026-02-18 10:00:00", "2026-02-18 12:00:00");
        let err = run(&current, NavigationOp::RangeOffset { from_offset: -1, to_offset: 0 }).unwrap_err();
        assert_eq!(err.field(), Some("from_offset"));

        let err = run(&current, NavigationOp::RangeOffset { from_offset: 7170, to_offset: 0 }).unwrap_err();
        assert!(matches!(err, TimePeriodError::RangeTooShort { length: 30, .. }));
    }

    #[test]
    fn test_range_offset_overflow_is_rejected() {
        let current = range("2026-02-18 10:00:00", "2026-02-18 12:00:00");
        let err = run(&current, NavigationOp::RangeOffset { from_offset: 0, to_offset: i64::MAX }).unwrap_err();
        assert_eq!(err.field(), Some("to_offset"));

        let err = run(&current, NavigationOp::RangeOffset { from_offset: i64::MAX, to_offset: 0 }).unwrap_err();
        assert_eq!(err.field(), Some("from_offset"));
    }

    #[test]
    fn test_invalid_current_range_propagates() {
        let current = TimeRange::new("now".parse().unwrap(), "now-1h".parse().unwrap());
        assert!(matches!(
            run(&current, NavigationOp::Increment).unwrap_err(),
            TimePeriodError::RangeInverted { .. }
        ));
    }

    #[test]
    fn test_op_serde() {
        let op: NavigationOp = serde_json::from_str(r#"{"method":"rangeoffset","from_offset":10,"to_offset":20}"#).unwrap();
        assert_eq!(op, NavigationOp::RangeOffset { from_offset: 10, to_offset: 20 });
        let op: NavigationOp = serde_json::from_str(r#"{"method":"zoomout"}"#).unwrap();
        assert_eq!(op, NavigationOp::ZoomOut);
    }
}
