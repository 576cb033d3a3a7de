//! Reference semantics for converting between instant ranges and date ranges.
//!
//! Instant ranges are half-open, `[start, end)`. Date ranges are closed,
//! `[start, end]`, with every date meaning the whole UTC day it names.
//! Converting instants to dates *narrows*: the result holds only the days the
//! instant range covers entirely. Converting dates to instants is lossless.
//!
//! All functions here are pure. The [`Oracle`] type exposes them through the
//! converter traits so the conformance runners can exercise the reference the
//! same way they exercise an external command.

use chrono::{DateTime, Days, NaiveTime, Utc};

use crate::bridge::BridgeError;
use crate::convert::{DateToTimestamp, TimestampToDate};
use crate::range::{DateRange, InstantRange, RawDateRange};
use crate::types::Instant;

/// Midnight UTC at the start of the day containing `t`
fn utc_day_start(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn next_utc_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.checked_add_days(Days::new(1)).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Re-expresses a UTC value in the offset `like` was written in
fn in_offset_of(t: DateTime<Utc>, like: &Instant) -> Instant {
    Instant::from(t.with_timezone(like.as_datetime().offset()))
}

/// Truncates `t` to the start of its UTC day.
/// The result keeps `t`'s offset.
pub fn widen_start(t: &Instant) -> Instant {
    in_offset_of(utc_day_start(t.to_utc()), t)
}

/// Returns the first UTC midnight at or after `t`: the instant by which the
/// day containing `t` is complete. A `t` that is already midnight UTC is
/// returned as is.
pub fn widen_end(t: &Instant) -> Instant {
    if t.is_utc_midnight() {
        return *t;
    }
    in_offset_of(next_utc_day(utc_day_start(t.to_utc())), t)
}

/// Moves each set bound outward to the enclosing UTC day boundary, so the
/// range includes every day it overlaps. Idempotent.
pub fn widen_range(range: &InstantRange) -> InstantRange {
    InstantRange::new(
        range.start().map(|t| widen_start(&t)),
        range.end().map(|t| widen_end(&t)),
    )
}

/// Whether both bounds are set and at least one whole UTC day lies between
/// them. Exactly the ranges whose narrowed date range is not inverted.
pub fn covers_whole_utc_day(range: &InstantRange) -> bool {
    match (range.start(), range.end()) {
        (Some(start), Some(end)) => next_utc_day(widen_end(&start).to_utc()) <= end.to_utc(),
        _ => false,
    }
}

/// Converts `[start, end)` instants to the `[start, end]` dates wholly inside it.
///
/// A start that isn't midnight UTC rounds up to the next day, since the
/// partial day isn't covered. The exclusive end becomes the inclusive day
/// before it. A range covering no whole day comes out inverted (start after
/// end), which matches no date.
pub fn timestamp_range_to_date_range(range: &InstantRange) -> DateRange {
    let start = range.start().map(|t| {
        let date = t.utc_date();
        if t.is_utc_midnight() { date } else { date.next() }
    });
    let end = range.end().map(|t| t.utc_date().previous());
    DateRange::new(start, end)
}

/// Converts `[start, end]` dates to the `[start, end)` instants they cover:
/// midnight UTC of the start date through midnight UTC after the end date.
pub fn date_range_to_timestamp_range(range: &DateRange) -> InstantRange {
    InstantRange::new(
        range.start().map(|d| d.start_instant()),
        range.end().map(|d| d.next().start_instant()),
    )
}

/// The reference implementation of both conversion directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Oracle;

impl TimestampToDate for Oracle {
    fn timestamp_to_date(&mut self, range: &InstantRange) -> Result<RawDateRange, BridgeError> {
        Ok(timestamp_range_to_date_range(range).to_raw())
    }
}

impl DateToTimestamp for Oracle {
    fn date_to_timestamp(&mut self, range: &DateRange) -> Result<InstantRange, BridgeError> {
        Ok(date_range_to_timestamp_range(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Date;
    use proptest::prelude::*;

    fn instant(s: &str) -> Instant {
        s.parse().unwrap()
    }

    fn instant_range(start: &str, end: &str) -> InstantRange {
        InstantRange::parse(start, end).unwrap()
    }

    #[test]
    fn test_utc_day_converts_to_single_date() {
        let range = instant_range("2024-07-15T00:00:00Z", "2024-07-16T00:00:00Z");
        let dates = timestamp_range_to_date_range(&range);
        assert_eq!(dates.to_raw().start, "2024-07-15");
        assert_eq!(dates.to_raw().end, "2024-07-15");
        assert!(!dates.is_inverted());
    }

    #[test]
    fn test_offset_day_narrows_to_inverted_range() {
        // [2024-07-14T14:00Z, 2024-07-15T14:00Z) covers no whole UTC day
        let range = instant_range("2024-07-15T00:00:00+10:00", "2024-07-16T00:00:00+10:00");
        let dates = timestamp_range_to_date_range(&range);
        assert_eq!(dates.to_string(), "[2024-07-15, 2024-07-14]");
        assert!(dates.is_inverted());

        // the inverted range converts back to an empty instant range
        let back = date_range_to_timestamp_range(&dates);
        assert_eq!(back.start(), back.end());
        assert_eq!(back.to_string(), "[2024-07-15T00:00:00Z, 2024-07-15T00:00:00Z)");
    }

    #[test]
    fn test_unset_bounds_round_trip() {
        let dates = timestamp_range_to_date_range(&InstantRange::unbounded());
        assert_eq!(dates, DateRange::unbounded());
        assert_eq!(dates.to_raw(), RawDateRange::default());
        assert_eq!(date_range_to_timestamp_range(&DateRange::unbounded()), InstantRange::unbounded());

        let half = instant_range("", "2024-07-16T00:00:00Z");
        let dates = timestamp_range_to_date_range(&half);
        assert_eq!(dates.to_raw().start, "");
        assert_eq!(dates.to_raw().end, "2024-07-15");
    }

    #[test]
    fn test_timestamp_to_date_round_trip_examples() {
        struct TestCase {
            name:       &'static str,
            start:      &'static str,
            end:        &'static str,
            dates:      &'static str,
            timestamps: &'static str,
        }

        let cases = [
            TestCase {
                name:       "utc-1",
                start:      "2024-07-15T00:00:00Z",
                end:        "2024-07-16T00:00:00Z",
                dates:      "[2024-07-15, 2024-07-15]",
                timestamps: "[2024-07-15T00:00:00Z, 2024-07-16T00:00:00Z)",
            },
            TestCase {
                name:       "utc-2",
                start:      "2024-07-16T00:00:00Z",
                end:        "2024-07-17T00:00:00Z",
                dates:      "[2024-07-16, 2024-07-16]",
                timestamps: "[2024-07-16T00:00:00Z, 2024-07-17T00:00:00Z)",
            },
            TestCase {
                name:       "aest-2",
                start:      "2024-07-16T00:00:00+10:00",
                end:        "2024-07-17T00:00:00+10:00",
                dates:      "[2024-07-16, 2024-07-15]",
                timestamps: "[2024-07-16T00:00:00Z, 2024-07-16T00:00:00Z)",
            },
            TestCase {
                name:       "morning-1",
                start:      "2024-07-15T09:00:00+10:00",
                end:        "2024-07-16T09:00:00+10:00",
                dates:      "[2024-07-15, 2024-07-14]",
                timestamps: "[2024-07-15T00:00:00Z, 2024-07-15T00:00:00Z)",
            },
            TestCase {
                name:       "afternoon-1",
                start:      "2024-07-15T15:00:00+10:00",
                end:        "2024-07-16T15:00:00+10:00",
                dates:      "[2024-07-16, 2024-07-15]",
                timestamps: "[2024-07-16T00:00:00Z, 2024-07-16T00:00:00Z)",
            },
            TestCase {
                name:       "afternoon-2",
                start:      "2024-07-16T15:00:00+10:00",
                end:        "2024-07-17T15:00:00+10:00",
                dates:      "[2024-07-17, 2024-07-16]",
                timestamps: "[2024-07-17T00:00:00Z, 2024-07-17T00:00:00Z)",
            },
            TestCase {
                name:       "afternoon-3-days-negative-offset",
                start:      "2024-07-16T15:00:00-11:35",
                end:        "2024-07-19T15:00:00-11:35",
                dates:      "[2024-07-18, 2024-07-19]",
                timestamps: "[2024-07-18T00:00:00Z, 2024-07-20T00:00:00Z)",
            },
        ];

        for case in &cases {
            let dates = timestamp_range_to_date_range(&instant_range(case.start, case.end));
            assert_eq!(dates.to_string(), case.dates, "{}", case.name);
            let back = date_range_to_timestamp_range(&dates);
            assert_eq!(back.to_string(), case.timestamps, "{}", case.name);
        }
    }

    #[test]
    fn test_widen_then_narrow_days_before_examples() {
        struct TestCase {
            name:    &'static str,
            now:     &'static str,
            days:    u64,
            widened: &'static str,
            dates:   &'static str,
        }

        let cases = [
            TestCase {
                name:    "utc-1",
                now:     "2024-07-15T00:00:00Z",
                days:    1,
                widened: "[2024-07-14T00:00:00Z, 2024-07-15T00:00:00Z)",
                dates:   "[2024-07-14, 2024-07-14]",
            },
            TestCase {
                name:    "aest-1",
                now:     "2024-07-15T00:00:00+10:00",
                days:    1,
                widened: "[2024-07-13T10:00:00+10:00, 2024-07-15T10:00:00+10:00)",
                dates:   "[2024-07-13, 2024-07-14]",
            },
            TestCase {
                name:    "aest-2",
                now:     "2024-07-16T00:00:00+10:00",
                days:    1,
                widened: "[2024-07-14T10:00:00+10:00, 2024-07-16T10:00:00+10:00)",
                dates:   "[2024-07-14, 2024-07-15]",
            },
            TestCase {
                name:    "morning-2",
                now:     "2024-07-16T09:00:00+10:00",
                days:    1,
                widened: "[2024-07-14T10:00:00+10:00, 2024-07-16T10:00:00+10:00)",
                dates:   "[2024-07-14, 2024-07-15]",
            },
            TestCase {
                name:    "afternoon-1",
                now:     "2024-07-15T15:00:00+10:00",
                days:    1,
                widened: "[2024-07-14T10:00:00+10:00, 2024-07-16T10:00:00+10:00)",
                dates:   "[2024-07-14, 2024-07-15]",
            },
            TestCase {
                name:    "afternoon-3-days-negative-offset",
                now:     "2024-07-16T15:00:00-11:35",
                days:    3,
                widened: "[2024-07-13T12:25:00-11:35, 2024-07-17T12:25:00-11:35)",
                dates:   "[2024-07-14, 2024-07-17]",
            },
        ];

        for case in &cases {
            let now = instant(case.now);
            let days_before = now.as_datetime().checked_sub_days(Days::new(case.days)).unwrap();
            let range = InstantRange::new(Some(Instant::from(days_before)), Some(now));
            let widened = widen_range(&range);
            assert_eq!(widened.to_string(), case.widened, "{}", case.name);
            let dates = timestamp_range_to_date_range(&widened);
            assert_eq!(dates.to_string(), case.dates, "{}", case.name);
        }
    }

    #[test]
    fn test_one_day_span_can_cover_no_whole_day() {
        let range = instant_range("2024-07-15T12:00:00Z", "2024-07-16T12:00:00Z");
        assert!(range.spans_full_day());
        assert!(!covers_whole_utc_day(&range));
        assert!(timestamp_range_to_date_range(&range).is_inverted());

        let longer = instant_range("2024-07-15T12:00:00Z", "2024-07-17T00:00:00Z");
        assert!(covers_whole_utc_day(&longer));
        assert_eq!(timestamp_range_to_date_range(&longer).to_string(), "[2024-07-16, 2024-07-16]");
        assert!(!covers_whole_utc_day(&longer.with_end(None)));
    }

    #[test]
    fn test_widen_end_keeps_midnight() {
        let midnight = instant("2024-07-15T00:00:00Z");
        assert_eq!(widen_end(&midnight), midnight);
        let just_after = instant("2024-07-15T00:00:00.000000001Z");
        assert_eq!(widen_end(&just_after), instant("2024-07-16T00:00:00Z"));
        assert_eq!(widen_start(&just_after), midnight);
    }

    #[test]
    fn test_widen_before_epoch() {
        let t = Instant::from_unix_nanos(-1, 0).unwrap();
        assert_eq!(widen_start(&t).to_string(), "1969-12-31T00:00:00Z");
        assert_eq!(widen_end(&t).to_string(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_oracle_converters() {
        let mut oracle = Oracle;
        let raw = oracle
            .timestamp_to_date(&instant_range("2024-01-01T00:00:00Z", "2024-01-31T23:59:59Z"))
            .unwrap();
        assert_eq!(raw.start, "2024-01-01");
        assert_eq!(raw.end, "2024-01-30");

        let instants = oracle
            .date_to_timestamp(&DateRange::parse("2024-02-01", "2024-02-29").unwrap())
            .unwrap();
        assert_eq!(instants.to_string(), "[2024-02-01T00:00:00Z, 2024-03-01T00:00:00Z)");
    }

    const DAY_SPAN: i64 = 100_000;

    fn aligned_instant() -> impl Strategy<Value = Instant> {
        (-DAY_SPAN..DAY_SPAN).prop_map(|day| Instant::from_unix_nanos(day * crate::consts::NANOS_PER_DAY, 0).unwrap())
    }

    fn any_instant() -> impl Strategy<Value = Instant> {
        (any::<i64>(), proptest::sample::select(crate::consts::FUZZ_OFFSETS_SECONDS.to_vec()))
            .prop_map(|(nanos, offset)| Instant::from_unix_nanos(nanos, offset).unwrap())
    }

    fn any_date() -> impl Strategy<Value = Date> {
        aligned_instant().prop_map(|t| t.utc_date())
    }

    proptest! {
        #[test]
        fn widen_range_is_idempotent(start in any_instant(), end in any_instant()) {
            let once = widen_range(&InstantRange::new(Some(start), Some(end)));
            prop_assert_eq!(widen_range(&once), once);
            prop_assert!(once.is_day_aligned());
        }

        #[test]
        fn widen_range_fixes_aligned_ranges(start in aligned_instant(), end in aligned_instant()) {
            let range = InstantRange::new(Some(start), Some(end));
            prop_assert_eq!(widen_range(&range), range);
        }

        #[test]
        fn date_round_trip_is_lossless(start in any_date(), end in any_date(), drop_start: bool, drop_end: bool) {
            let dates = DateRange::new((!drop_start).then_some(start), (!drop_end).then_some(end));
            prop_assert_eq!(timestamp_range_to_date_range(&date_range_to_timestamp_range(&dates)), dates);
        }

        #[test]
        fn aligned_instant_round_trip_is_lossless(start in aligned_instant(), days in 1_i64..400) {
            let end = Instant::from_unix_nanos(start.unix_nanos().unwrap() + days * crate::consts::NANOS_PER_DAY, 0).unwrap();
            let range = InstantRange::new(Some(start), Some(end));
            prop_assert_eq!(date_range_to_timestamp_range(&timestamp_range_to_date_range(&range)), range);
        }

        #[test]
        fn date_and_instant_matching_agree_when_aligned(start in aligned_instant(), end in aligned_instant(), value in any_date()) {
            let range = InstantRange::new(Some(start), Some(end));
            let dates = timestamp_range_to_date_range(&range);
            prop_assert_eq!(dates.matches(&value), range.matches(&value.start_instant()));
        }

        #[test]
        fn inverted_exactly_when_no_whole_day(start in any_instant(), end in any_instant()) {
            let range = InstantRange::new(Some(start), Some(end));
            let dates = timestamp_range_to_date_range(&range);
            prop_assert_eq!(dates.is_inverted(), !covers_whole_utc_day(&range));
        }

        #[test]
        fn narrowed_dates_are_wholly_covered(start in any_instant(), end in any_instant(), value in any_date()) {
            let range = InstantRange::new(Some(start), Some(end));
            prop_assume!(range.spans_full_day());
            let dates = timestamp_range_to_date_range(&range);
            let lower = value.start_instant();
            let upper = Instant::from_unix_nanos(value.next().start_instant().unix_nanos().unwrap() - 1, 0).unwrap();
            prop_assert_eq!(dates.matches(&value), range.matches(&lower) && range.matches(&upper));
        }
    }
}
