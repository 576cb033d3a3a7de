use crate::consts::{DATE_FORMAT, MAX_OFFSET_SECONDS, NANOS_PER_SECOND, TIMESTAMP_SECONDS_FORMAT};
use crate::prelude::*;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ParseError {
    #[display(fmt = "Empty input")]
    EmptyInput,
    #[display(fmt = "Invalid timestamp {input:?}: {reason}")]
    InvalidTimestamp { input: String, reason: String },
    #[display(fmt = "Invalid date {input:?}: {reason}")]
    InvalidDate { input: String, reason: String },
    #[display(fmt = "Date {input:?} is not in YYYY-MM-DD form")]
    NonCanonicalDate { input: String },
    #[display(fmt = "Invalid UTC offset: {} seconds (must be within ±{})", "_0", MAX_OFFSET_SECONDS)]
    InvalidOffset(i32),
}

impl std::error::Error for ParseError {}

/// A point on the timeline with nanosecond precision.
///
/// The offset the instant was expressed in is retained so it can be
/// reproduced on the wire, but equality, ordering and every conversion use
/// the UTC-normalized value: `2024-07-15T10:00:00+10:00` equals
/// `2024-07-15T00:00:00Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(DateTime<FixedOffset>);

impl Instant {
    /// Creates an instant from nanoseconds since the Unix epoch, expressed in
    /// the given offset (seconds east of UTC).
    ///
    /// # Errors
    /// Returns `ParseError::InvalidOffset` if the offset is a day or more.
    pub fn from_unix_nanos(nanos: i64, offset_seconds: i32) -> Result<Self, ParseError> {
        let offset = fixed_offset(offset_seconds)?;
        Ok(Self(DateTime::from_timestamp_nanos(nanos).with_timezone(&offset)))
    }

    /// Creates a UTC instant.
    pub fn from_utc(value: DateTime<Utc>) -> Self {
        Self(value.fixed_offset())
    }

    /// Nanoseconds since the Unix epoch, if representable as `i64`
    /// (roughly the years 1677 through 2262).
    pub fn unix_nanos(&self) -> Option<i64> {
        self.0.timestamp_nanos_opt()
    }

    /// The offset this instant is expressed in, in seconds east of UTC
    pub fn offset_seconds(&self) -> i32 {
        self.0.offset().local_minus_utc()
    }

    /// The same instant, normalized to UTC
    pub fn to_utc(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }

    /// The same instant, expressed in another offset.
    ///
    /// # Errors
    /// Returns `ParseError::InvalidOffset` if the offset is a day or more.
    pub fn with_offset(&self, offset_seconds: i32) -> Result<Self, ParseError> {
        let offset = fixed_offset(offset_seconds)?;
        Ok(Self(self.0.with_timezone(&offset)))
    }

    /// The UTC calendar day containing this instant
    pub fn utc_date(&self) -> Date {
        Date(self.to_utc().date_naive())
    }

    /// Whether this instant is exactly midnight UTC
    pub fn is_utc_midnight(&self) -> bool {
        let utc = self.to_utc();
        utc.time() == NaiveTime::MIN
    }

    /// The underlying chrono value
    pub const fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }
}

fn fixed_offset(offset_seconds: i32) -> Result<FixedOffset, ParseError> {
    FixedOffset::east_opt(offset_seconds).ok_or(ParseError::InvalidOffset(offset_seconds))
}

impl From<DateTime<Utc>> for Instant {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_utc(value)
    }
}

impl From<DateTime<FixedOffset>> for Instant {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self(value)
    }
}

impl FromStr for Instant {
    type Err = ParseError;

    /// Parses an RFC 3339 timestamp, with or without fractional seconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        DateTime::parse_from_rfc3339(s)
            .map(Self)
            .map_err(|err| ParseError::InvalidTimestamp {
                input: s.to_owned(),
                reason: err.to_string(),
            })
    }
}

/// RFC 3339 with nanoseconds: trailing zeros of the fraction are trimmed
/// (and the fraction omitted when zero), a zero offset is written as `Z`.
impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_SECONDS_FORMAT))?;

        // leap-second representation folds into the fraction; keep it within a second
        let nanos = i64::from(self.0.nanosecond()) % NANOS_PER_SECOND;
        if nanos != 0 {
            let fraction = format!("{nanos:09}");
            write!(f, ".{}", fraction.trim_end_matches('0'))?;
        }

        if self.offset_seconds() == 0 {
            f.write_str("Z")
        } else {
            write!(f, "{}", self.0.format("%:z"))
        }
    }
}

impl Serialize for Instant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Instant {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A UTC calendar day, always meaning midnight UTC at its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display(fmt = "{}", "_0.format(DATE_FORMAT)")]
pub struct Date(NaiveDate);

impl Date {
    /// Creates a date from its components.
    ///
    /// # Errors
    /// Returns `ParseError::InvalidDate` if the components don't form a real
    /// Gregorian date.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, ParseError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| ParseError::InvalidDate {
                input: format!("{year:04}-{month:02}-{day:02}"),
                reason: "no such day".to_owned(),
            })
    }

    /// Midnight UTC at the start of this day
    pub fn start_instant(&self) -> Instant {
        Instant::from_utc(self.0.and_time(NaiveTime::MIN).and_utc())
    }

    /// The following day (saturates at the end of the supported calendar)
    pub fn next(&self) -> Self {
        Self(self.0.checked_add_days(Days::new(1)).unwrap_or(self.0))
    }

    /// The preceding day (saturates at the start of the supported calendar)
    pub fn previous(&self) -> Self {
        Self(self.0.checked_sub_days(Days::new(1)).unwrap_or(self.0))
    }
}

impl From<NaiveDate> for Date {
    fn from(value: NaiveDate) -> Self {
        Self(value)
    }
}

impl FromStr for Date {
    type Err = ParseError;

    /// Parses a `YYYY-MM-DD` date. Anything that doesn't format back to the
    /// exact input (e.g. `2024-7-4`) is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        let date = NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Self)
            .map_err(|err| ParseError::InvalidDate {
                input: s.to_owned(),
                reason: err.to_string(),
            })?;
        if date.to_string() != s {
            return Err(ParseError::NonCanonicalDate { input: s.to_owned() });
        }
        Ok(date)
    }
}

impl Serialize for Date {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
