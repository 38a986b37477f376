//! Record validation.
//!
//! Every candidate record passes through here before it can reach the WAL or a
//! snapshot. The checks are pure: nothing in this module touches the store or
//! the filesystem.
//!
//! Rules:
//! - Titles (and work item names) must be non-empty after trimming
//! - Tags must contain non-blank `category` and `priority` entries
//! - `priority` must be one of `low`, `medium`, `high`, `urgent` (case-sensitive)
//! - A todo's `due_date` must be a `YYYY-MM-DD` date or a full ISO-8601 datetime
//! - Work item dates are `YYYY-MM-DD`, and `end_date` may not precede `start_date`

use crate::model::{Priority, Tags};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

pub const REQUIRED_TAGS: [&str; 2] = ["category", "priority"];

/// Checks that a required text field is non-empty after trimming.
///
/// ```
/// use todostore::validation::{validate_required, ValidationError};
///
/// assert!(validate_required("title", "Buy milk").is_ok());
/// assert_eq!(
///     validate_required("title", "   "),
///     Err(ValidationError::Required("title"))
/// );
/// ```
pub fn validate_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

/// Validates the tag contract shared by todos and notes and returns the parsed priority.
pub fn validate_tags(tags: &Tags) -> Result<Priority, ValidationError> {
    for key in REQUIRED_TAGS {
        match tags.get(key) {
            Some(value) if !value.trim().is_empty() => {}
            _ => return Err(ValidationError::MissingTag(key)),
        }
    }

    let raw = &tags["priority"];
    raw.parse::<Priority>()
        .map_err(|_| ValidationError::InvalidPriority(raw.clone()))
}

/// Accepts `YYYY-MM-DD`, an RFC 3339 datetime, or a naive `YYYY-MM-DDTHH:MM:SS[.f]`.
pub fn validate_due_date(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    let ok = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(trimmed).is_ok()
        || NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").is_ok();
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidDueDate(value.to_string()))
    }
}

/// Parses a work item date. Only the leading `YYYY-MM-DD` is considered, so
/// `2030-01-01T09:00:00Z` is accepted as `2030-01-01`.
pub fn parse_day(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    value
        .get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .ok_or_else(|| ValidationError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

pub fn validate_work_dates(start: &str, end: Option<&str>) -> Result<(), ValidationError> {
    if start.trim().is_empty() {
        return Err(ValidationError::Required("start_date"));
    }
    let start_day = parse_day("start_date", start)?;
    if let Some(end) = end.filter(|e| !e.trim().is_empty()) {
        let end_day = parse_day("end_date", end)?;
        if end_day < start_day {
            return Err(ValidationError::EndBeforeStart {
                start: start_day,
                end: end_day,
            });
        }
    }
    Ok(())
}

/// Error type for record validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is missing or blank
    Required(&'static str),
    /// One of the required tags is missing or blank
    MissingTag(&'static str),
    /// `priority` is not one of the enumerated values
    InvalidPriority(String),
    /// `due_date` is neither a calendar date nor an ISO datetime
    InvalidDueDate(String),
    /// A work item date is not `YYYY-MM-DD`
    InvalidDate { field: &'static str, value: String },
    /// A work item ends before it starts
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Required(field) => field,
            ValidationError::MissingTag(_) | ValidationError::InvalidPriority(_) => "tags",
            ValidationError::InvalidDueDate(_) => "due_date",
            ValidationError::InvalidDate { field, .. } => field,
            ValidationError::EndBeforeStart { .. } => "end_date",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Required(field) => write!(f, "{} is required", field),
            ValidationError::MissingTag(tag) => write!(f, "missing required tag: {}", tag),
            ValidationError::InvalidPriority(value) => write!(
                f,
                "priority must be one of: low, medium, high, urgent (got '{}')",
                value
            ),
            ValidationError::InvalidDueDate(value) => write!(
                f,
                "due_date must be YYYY-MM-DD or an ISO datetime (got '{}')",
                value
            ),
            ValidationError::InvalidDate { field, value } => {
                write!(f, "{} must be YYYY-MM-DD (got '{}')", field, value)
            }
            ValidationError::EndBeforeStart { start, end } => write!(
                f,
                "end_date {} cannot be earlier than start_date {}",
                end, start
            ),
        }
    }
}

impl std::error::Error for ValidationError {}
