use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Date, Instant, ParseError};

/// A half-open range of instants, `[start, end)`.
/// Either bound may be unset, meaning the range is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct InstantRange {
    start: Option<Instant>,
    end:   Option<Instant>,
}

/// A closed range of UTC dates, `[start, end]`.
/// Either bound may be unset, meaning the range is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateRange {
    start: Option<Date>,
    end:   Option<Date>,
}

/// A date range exactly as a converter wrote it, before validation.
/// The empty string denotes an unset bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RawDateRange {
    pub start: String,
    pub end:   String,
}

/// Error type for range construction and parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// The start bound didn't parse.
    #[error("Invalid range start: {0}")]
    InvalidStart(#[source] ParseError),

    /// The end bound didn't parse.
    #[error("Invalid range end: {0}")]
    InvalidEnd(#[source] ParseError),
}

impl InstantRange {
    pub const fn new(start: Option<Instant>, end: Option<Instant>) -> Self {
        Self { start, end }
    }

    /// A range with neither bound set
    pub const fn unbounded() -> Self {
        Self { start: None, end: None }
    }

    /// Parses both bounds as RFC 3339, treating empty strings as unset.
    ///
    /// # Errors
    /// Returns `RangeError` naming the bound that failed to parse.
    pub fn parse(start: &str, end: &str) -> Result<Self, RangeError> {
        Ok(Self {
            start: parse_optional(start).map_err(RangeError::InvalidStart)?,
            end:   parse_optional(end).map_err(RangeError::InvalidEnd)?,
        })
    }

    pub const fn start(&self) -> Option<Instant> {
        self.start
    }

    pub const fn end(&self) -> Option<Instant> {
        self.end
    }

    /// Returns a copy with the start bound replaced
    #[must_use]
    pub const fn with_start(self, start: Option<Instant>) -> Self {
        Self { start, ..self }
    }

    /// Returns a copy with the end bound replaced
    #[must_use]
    pub const fn with_end(self, end: Option<Instant>) -> Self {
        Self { end, ..self }
    }

    /// Whether `value` falls in the range. The end is exclusive: time is
    /// continuous, so a closed end would double-cover the boundary instant
    /// shared with the next range.
    pub fn matches(&self, value: &Instant) -> bool {
        if self.start.is_some_and(|start| *value < start) {
            return false;
        }
        if self.end.is_some_and(|end| *value >= end) {
            return false;
        }
        true
    }

    /// Whether every set bound falls exactly on a UTC midnight
    pub fn is_day_aligned(&self) -> bool {
        self.start.is_none_or(|t| t.is_utc_midnight()) && self.end.is_none_or(|t| t.is_utc_midnight())
    }

    /// Whether both bounds are set and at least one full day apart
    pub fn spans_full_day(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => (end.to_utc() - start.to_utc()) >= chrono::TimeDelta::days(1),
            _ => false,
        }
    }

    /// Both bounds re-expressed in UTC
    #[must_use]
    pub fn to_utc(&self) -> Self {
        Self {
            start: self.start.map(|t| Instant::from_utc(t.to_utc())),
            end:   self.end.map(|t| Instant::from_utc(t.to_utc())),
        }
    }
}

impl DateRange {
    pub const fn new(start: Option<Date>, end: Option<Date>) -> Self {
        Self { start, end }
    }

    /// A range with neither bound set
    pub const fn unbounded() -> Self {
        Self { start: None, end: None }
    }

    /// Parses both bounds as `YYYY-MM-DD`, treating empty strings as unset.
    ///
    /// # Errors
    /// Returns `RangeError` naming the bound that failed to parse.
    pub fn parse(start: &str, end: &str) -> Result<Self, RangeError> {
        Ok(Self {
            start: parse_optional(start).map_err(RangeError::InvalidStart)?,
            end:   parse_optional(end).map_err(RangeError::InvalidEnd)?,
        })
    }

    /// Validates a converter's raw output.
    ///
    /// # Errors
    /// Returns `RangeError` if a non-empty bound isn't a canonical date.
    pub fn from_raw(raw: &RawDateRange) -> Result<Self, RangeError> {
        Self::parse(&raw.start, &raw.end)
    }

    /// Formats the range the way it travels on the wire
    pub fn to_raw(&self) -> RawDateRange {
        RawDateRange {
            start: self.start.map(|d| d.to_string()).unwrap_or_default(),
            end:   self.end.map(|d| d.to_string()).unwrap_or_default(),
        }
    }

    pub const fn start(&self) -> Option<Date> {
        self.start
    }

    pub const fn end(&self) -> Option<Date> {
        self.end
    }

    /// Returns a copy with the start bound replaced
    #[must_use]
    pub const fn with_start(self, start: Option<Date>) -> Self {
        Self { start, ..self }
    }

    /// Returns a copy with the end bound replaced
    #[must_use]
    pub const fn with_end(self, end: Option<Date>) -> Self {
        Self { end, ..self }
    }

    /// Whether `value` falls in the range. Both bounds are inclusive since
    /// dates are discrete.
    pub fn matches(&self, value: &Date) -> bool {
        if self.start.is_some_and(|start| *value < start) {
            return false;
        }
        if self.end.is_some_and(|end| *value > end) {
            return false;
        }
        true
    }

    /// Whether both bounds are set with the start after the end.
    ///
    /// Narrowing a range that covers no whole UTC day produces exactly this
    /// shape; it matches nothing.
    pub fn is_inverted(&self) -> bool {
        matches!((self.start, self.end), (Some(start), Some(end)) if start > end)
    }
}

fn parse_optional<T: std::str::FromStr<Err = ParseError>>(s: &str) -> Result<Option<T>, ParseError> {
    if s.is_empty() { Ok(None) } else { s.parse().map(Some) }
}

fn write_bound<T: fmt::Display>(f: &mut fmt::Formatter<'_>, bound: Option<&T>) -> fmt::Result {
    match bound {
        Some(value) => write!(f, "{value}"),
        None => Ok(()),
    }
}

impl fmt::Display for InstantRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        write_bound(f, self.start.as_ref())?;
        f.write_str(", ")?;
        write_bound(f, self.end.as_ref())?;
        f.write_str(")")
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        write_bound(f, self.start.as_ref())?;
        f.write_str(", ")?;
        write_bound(f, self.end.as_ref())?;
        f.write_str("]")
    }
}

impl fmt::Display for RawDateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
