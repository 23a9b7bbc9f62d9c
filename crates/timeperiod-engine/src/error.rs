//! Error types for time period operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimePeriodError {
    #[error("Malformed time expression: {0}")]
    MalformedTimeExpression(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Time range start ({from_ts}) must be before its end ({to_ts})")]
    RangeInverted { from_ts: i64, to_ts: i64 },

    #[error("Minimum time period to display is {min_label}")]
    RangeTooShort {
        length: i64,
        min_period: i64,
        min_label: String,
    },

    #[error("Maximum time period to display is {max_label}")]
    RangeTooLong {
        length: i64,
        max_period: i64,
        max_label: String,
    },

    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Invalid value for field \"{field}\": {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Schedule must contain at least one period")]
    EmptySchedule,

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid profile index: {0}")]
    InvalidProfileIndex(String),

    #[error("Recurrence error: {0}")]
    Recurrence(String),
}

impl TimePeriodError {
    pub(crate) fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        TimePeriodError::InvalidFieldValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// The form field an error should be displayed against, when it has one.
    pub fn field(&self) -> Option<&str> {
        match self {
            TimePeriodError::MissingRequiredField(field) => Some(field),
            TimePeriodError::InvalidFieldValue { field, .. } => Some(field),
            TimePeriodError::RangeTooShort { .. } | TimePeriodError::RangeTooLong { .. } => {
                Some("from")
            }
            TimePeriodError::RangeInverted { .. } => Some("to"),
            TimePeriodError::EmptySchedule => Some("schedule"),
            TimePeriodError::UnknownMethod(_) => Some("method"),
            TimePeriodError::InvalidProfileIndex(_) => Some("idx"),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TimePeriodError>;
