//! The two conversion directions, as implemented by anything under test:
//! an external command behind a [`Bridge`], the reference [`Oracle`], or a
//! plain closure.
//!
//! [`Oracle`]: crate::oracle::Oracle

use crate::bridge::{Bridge, BridgeError};
use crate::codec::TimestampToDateCodec;
use crate::range::{DateRange, InstantRange, RawDateRange};

/// Converts an instant range to the date range it wholly covers.
pub trait TimestampToDate {
    /// # Errors
    /// Returns `BridgeError` when the converter itself fails. A wrong answer
    /// is not an error.
    fn timestamp_to_date(&mut self, range: &InstantRange) -> Result<RawDateRange, BridgeError>;
}

/// Converts a date range to the instant range it spans.
pub trait DateToTimestamp {
    /// # Errors
    /// Returns `BridgeError` when the converter itself fails.
    fn date_to_timestamp(&mut self, range: &DateRange) -> Result<InstantRange, BridgeError>;
}

impl<F> TimestampToDate for F
where
    F: FnMut(&InstantRange) -> Result<RawDateRange, BridgeError>,
{
    fn timestamp_to_date(&mut self, range: &InstantRange) -> Result<RawDateRange, BridgeError> {
        self(range)
    }
}

impl<F> DateToTimestamp for F
where
    F: FnMut(&DateRange) -> Result<InstantRange, BridgeError>,
{
    fn date_to_timestamp(&mut self, range: &DateRange) -> Result<InstantRange, BridgeError> {
        self(range)
    }
}

/// An external timestamp-to-date command reached through a bridge.
#[derive(Debug, Clone, Copy)]
pub struct ExternalConverter<'a> {
    bridge: &'a Bridge<TimestampToDateCodec>,
}

impl<'a> ExternalConverter<'a> {
    pub const fn new(bridge: &'a Bridge<TimestampToDateCodec>) -> Self {
        Self { bridge }
    }
}

impl TimestampToDate for ExternalConverter<'_> {
    fn timestamp_to_date(&mut self, range: &InstantRange) -> Result<RawDateRange, BridgeError> {
        self.bridge.call(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle;

    fn convert_twice<C: TimestampToDate>(converter: &mut C, range: &InstantRange) -> Vec<RawDateRange> {
        vec![
            converter.timestamp_to_date(range).unwrap(),
            converter.timestamp_to_date(range).unwrap(),
        ]
    }

    #[test]
    fn test_closure_converters() {
        let mut calls = 0;
        let mut counting = |range: &InstantRange| -> Result<RawDateRange, BridgeError> {
            calls += 1;
            Ok(oracle::timestamp_range_to_date_range(range).to_raw())
        };
        let range = InstantRange::parse("2024-07-15T00:00:00Z", "2024-07-17T00:00:00Z").unwrap();
        let out = convert_twice(&mut counting, &range);
        assert_eq!(calls, 2);
        assert_eq!(out[0].start, "2024-07-15");
        assert_eq!(out[0].end, "2024-07-16");

        let mut inverse = |range: &DateRange| -> Result<InstantRange, BridgeError> {
            Ok(oracle::date_range_to_timestamp_range(range))
        };
        let dates = DateRange::parse("2024-07-15", "").unwrap();
        let instants = inverse.date_to_timestamp(&dates).unwrap();
        assert_eq!(instants.start().unwrap().to_string(), "2024-07-15T00:00:00Z");
        assert!(instants.end().is_none());
    }

    #[test]
    fn test_closure_errors_propagate() {
        let mut failing = |_: &InstantRange| -> Result<RawDateRange, BridgeError> { Err(BridgeError::Closed) };
        let err = failing.timestamp_to_date(&InstantRange::unbounded()).unwrap_err();
        assert!(matches!(err, BridgeError::Closed));
    }
}
