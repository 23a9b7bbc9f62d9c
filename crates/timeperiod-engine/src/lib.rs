//! # timeperiod-engine
//!
//! Time period and recurrence computation for monitoring front ends.
//!
//! The engine parses relative and absolute time expressions (`now-1d/d`,
//! `2026-02-18 14:30`), resolves display ranges against an explicit `now`,
//! moves a time selector through increment, decrement, zoom-out and range
//! changes, and converts maintenance recurrences and weekly SLA schedules
//! between their flat storage form and typed values.
//!
//! Nothing here reads the system clock; every time-dependent operation takes
//! `now` as an argument.
//!
//! ## Modules
//!
//! - [`expression`]: time expression parsing, rendering and resolution
//! - [`range`]: range resolution, length bounds and labels
//! - [`recurrence`]: maintenance recurrence patterns and their field codec
//! - [`occurrence`]: next occurrence and active window of a recurrence
//! - [`schedule`]: weekly SLA schedules and excluded downtimes
//! - [`navigator`]: pure time selector navigation
//! - [`selector`]: the time selector endpoint over a profile store
//! - [`config`]: engine settings
//! - [`error`]: error types

pub mod config;
pub mod error;
pub mod expression;
pub mod navigator;
pub mod occurrence;
pub mod range;
pub mod recurrence;
pub mod schedule;
pub mod selector;

pub use config::{EngineConfig, PeriodBounds, WeekStartDay};
pub use error::{Result, TimePeriodError};
pub use expression::{
    format_timestamp, parse_absolute, parse_relative, AbsoluteTime, Precision, RelativeSpec,
    RelativeStep, Side, TimeExpression, TimeUnit, Timestamp,
};
pub use navigator::{apply, Method, NavigationOp};
pub use occurrence::{active_window, next_occurrence, next_occurrence_since, to_rrule};
pub use range::{enforce_bounds, format_period, range_label, resolve_pair, ResolvedRange, TimeRange};
pub use recurrence::{
    decode, encode, MonthSet, MonthlyDay, RawFields, RecurrencePattern, TimePeriodRecord,
    WeekOfMonth, WeekdaySet,
};
pub use schedule::{
    compile, normalize, parse_day_spec, to_day_specs, ExcludedDowntime, ScheduleInterval,
    WeeklySchedule,
};
pub use selector::{
    current_period, update, FieldErrors, MemoryProfileStore, ProfileStore, QuickRange,
    TimeSelectorRequest, TimeSelectorResponse,
};
