//! The time selector endpoint: request validation, navigation, persistence.
//!
//! A request carries the range the client is currently displaying plus the
//! operation to apply. Validation happens before any computation, and the
//! profile store is written only after the new range passed every check, so a
//! rejected request leaves the stored range untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::TimePeriodError;
use crate::expression::{format_timestamp, TimeExpression, Timestamp};
use crate::navigator::{apply, Method, NavigationOp};
use crate::range::{named_ranges, range_label, resolve_pair, TimeRange};

/// Per-user key/value storage for the selected range.
///
/// Keys are `"<idx>.from"` and `"<idx>.to"`; `idx2` separates ranges of
/// different objects under the same `idx`.
pub trait ProfileStore {
    fn get(&self, key: &str, idx2: u64) -> Option<String>;
    fn set(&mut self, key: &str, idx2: u64, value: String);
}

/// In-memory [`ProfileStore`]; serializable so it can be kept in a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryProfileStore {
    entries: BTreeMap<u64, BTreeMap<String, String>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get(&self, key: &str, idx2: u64) -> Option<String> {
        self.entries.get(&idx2)?.get(key).cloned()
    }

    fn set(&mut self, key: &str, idx2: u64, value: String) {
        self.entries
            .entry(idx2)
            .or_default()
            .insert(key.to_string(), value);
    }
}

/// A time selector update as submitted by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSelectorRequest {
    pub method: Option<String>,
    pub idx: Option<String>,
    pub idx2: Option<u64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub from_offset: Option<i64>,
    pub to_offset: Option<i64>,
}

/// A preset shortcut range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickRange {
    pub from: String,
    pub to: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSelectorResponse {
    pub label: String,
    pub from: String,
    pub to: String,
    pub from_ts: Timestamp,
    pub to_ts: Timestamp,
    pub from_date: String,
    pub to_date: String,
    pub can_zoomout: bool,
    pub can_decrement: bool,
    pub can_increment: bool,
    pub quick_ranges: Vec<QuickRange>,
}

/// Field name to message, as redisplayed next to the form inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` against its own field, or against `fallback`.
    pub fn push(&mut self, fallback: &str, error: &TimePeriodError) {
        let field = error.field().unwrap_or(fallback).to_string();
        self.0.entry(field).or_insert_with(|| error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn single(fallback: &str, error: TimePeriodError) -> Self {
        let mut errors = FieldErrors::new();
        errors.push(fallback, &error);
        errors
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl From<TimePeriodError> for FieldErrors {
    fn from(error: TimePeriodError) -> Self {
        FieldErrors::single("request", error)
    }
}

/// A request that passed structural validation.
struct ValidRequest<'a> {
    idx: &'a str,
    idx2: u64,
    current: TimeRange,
    op: NavigationOp,
}

fn validate<'a>(
    request: &'a TimeSelectorRequest,
    config: &EngineConfig,
) -> Result<ValidRequest<'a>, FieldErrors> {
    let mut errors = FieldErrors::new();
    let missing = |name: &str| TimePeriodError::MissingRequiredField(name.to_string());

    let method = match request.method.as_deref() {
        None => {
            errors.push("method", &missing("method"));
            None
        }
        Some(text) => match text.parse::<Method>() {
            Ok(method) => Some(method),
            Err(e) => {
                errors.push("method", &e);
                None
            }
        },
    };

    match request.idx.as_deref() {
        None => errors.push("idx", &missing("idx")),
        Some(idx) if !config.profile_indexes.iter().any(|allowed| allowed == idx) => {
            errors.push("idx", &TimePeriodError::InvalidProfileIndex(idx.to_string()))
        }
        Some(_) => {}
    }
    if request.idx2.is_none() {
        errors.push("idx2", &missing("idx2"));
    }

    let mut side = |name: &str, text: Option<&str>| match text {
        None => {
            errors.push(name, &missing(name));
            None
        }
        Some(text) => match TimeExpression::parse(text, config) {
            Ok(expr) => Some(expr),
            Err(e) => {
                errors.push(name, &e);
                None
            }
        },
    };
    let from = side("from", request.from.as_deref());
    let to = side("to", request.to.as_deref());

    if method == Some(Method::RangeOffset) {
        if request.from_offset.is_none() {
            errors.push("from_offset", &missing("from_offset"));
        }
        if request.to_offset.is_none() {
            errors.push("to_offset", &missing("to_offset"));
        }
    }

    match (method, request.idx.as_deref(), request.idx2, from, to) {
        (Some(method), Some(idx), Some(idx2), Some(from), Some(to)) if errors.is_empty() => {
            let op = match method {
                Method::Increment => NavigationOp::Increment,
                Method::Decrement => NavigationOp::Decrement,
                Method::ZoomOut => NavigationOp::ZoomOut,
                Method::RangeChange => NavigationOp::RangeChange {
                    from: from.clone(),
                    to: to.clone(),
                },
                Method::RangeOffset => NavigationOp::RangeOffset {
                    from_offset: request.from_offset.unwrap_or_default(),
                    to_offset: request.to_offset.unwrap_or_default(),
                },
            };
            Ok(ValidRequest {
                idx,
                idx2,
                current: TimeRange::new(from, to),
                op,
            })
        }
        _ => Err(errors),
    }
}

/// Validate `request`, navigate, persist the result and describe it.
///
/// # Errors
///
/// A [`FieldErrors`] map naming each offending field. The store is not
/// modified when an error is returned.
pub fn update(
    store: &mut dyn ProfileStore,
    config: &EngineConfig,
    request: &TimeSelectorRequest,
    now: Timestamp,
) -> Result<TimeSelectorResponse, FieldErrors> {
    let valid = validate(request, config).inspect_err(|errors| {
        debug!(%errors, "rejected time selector request");
    })?;

    let next = apply(&valid.current, now, &valid.op, &config.bounds(), config)
        .and_then(|range| describe(&range, now, config).map(|response| (range, response)));
    let (range, response) = next.map_err(|e| {
        debug!(error = %e, method = %valid.op.method(), "time selector update failed");
        FieldErrors::single("from", e)
    })?;

    store.set(&format!("{}.from", valid.idx), valid.idx2, range.from.to_string());
    store.set(&format!("{}.to", valid.idx), valid.idx2, range.to.to_string());
    Ok(response)
}

/// The stored range for `idx`/`idx2`, or the default range when nothing (or
/// nothing usable) is stored.
pub fn current_period(
    store: &dyn ProfileStore,
    config: &EngineConfig,
    idx: Option<&str>,
    idx2: u64,
    now: Timestamp,
) -> Result<TimeSelectorResponse, FieldErrors> {
    let default = default_range(config)?;

    let stored = idx.and_then(|idx| {
        let from = store.get(&format!("{}.from", idx), idx2)?;
        let to = store.get(&format!("{}.to", idx), idx2)?;
        match TimeRange::parse(&from, &to, config) {
            Ok(range) => Some(range),
            Err(e) => {
                warn!(idx, idx2, error = %e, "ignoring unusable stored time range");
                None
            }
        }
    });

    Ok(describe(&stored.unwrap_or(default), now, config)?)
}

fn default_range(config: &EngineConfig) -> Result<TimeRange, TimePeriodError> {
    TimeRange::parse(&format!("now-{}", config.default_period), "now", config)
        .map_err(|e| TimePeriodError::invalid_field("default_period", e.to_string()))
}

fn describe(
    range: &TimeRange,
    now: Timestamp,
    config: &EngineConfig,
) -> Result<TimeSelectorResponse, TimePeriodError> {
    let resolved = resolve_pair(range, now, config)?;
    let tz = config.tz()?;
    let from = range.from.to_string();
    let to = range.to.to_string();

    let quick_ranges = named_ranges()
        .map(|(qfrom, qto, label)| QuickRange {
            from: qfrom.to_string(),
            to: qto.to_string(),
            label: label.to_string(),
            selected: qfrom == from && qto == to,
        })
        .chain(quick_last_ranges(&from, &to))
        .collect();

    Ok(TimeSelectorResponse {
        label: range_label(&range.from, &range.to),
        from_date: format_timestamp(resolved.from_ts, &tz)?,
        to_date: format_timestamp(resolved.to_ts, &tz)?,
        can_zoomout: resolved.length() < config.max_period,
        can_decrement: resolved.from_ts > 0,
        can_increment: resolved.to_ts < now - config.min_period,
        from,
        to,
        from_ts: resolved.from_ts,
        to_ts: resolved.to_ts,
        quick_ranges,
    })
}

const QUICK_LAST: &[&str] = &[
    "now-5m", "now-15m", "now-30m", "now-1h", "now-3h", "now-6h", "now-12h", "now-1d",
    "now-2d", "now-7d", "now-30d", "now-3M", "now-6M", "now-1y", "now-2y",
];

fn quick_last_ranges<'a>(from: &'a str, to: &'a str) -> impl Iterator<Item = QuickRange> + 'a {
    QUICK_LAST.iter().filter_map(move |qfrom| {
        let expr: TimeExpression = qfrom.parse().ok()?;
        Some(QuickRange {
            from: qfrom.to_string(),
            to: "now".to_string(),
            label: range_label(&expr, &TimeExpression::now()),
            selected: *qfrom == from && to == "now",
        })
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────
