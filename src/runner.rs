//! Fixture-driven conformance runs for both conversion directions.
//!
//! Every enumerated case is converted with the converter under test, and the
//! converted range is matched against the case's value with the reference
//! matching rules. Divergences from the expectation table are collected as
//! [`Mismatch`]es; a converter failure aborts the run.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{info, trace, warn};

use crate::bridge::{self, CommandSpec};
use crate::cancel::CancelToken;
use crate::codec::TimestampToDateCodec;
use crate::convert::{DateToTimestamp, ExternalConverter, TimestampToDate};
use crate::fixtures::{Corpus, RangeCase};
use crate::prelude::*;
use crate::range::{DateRange, InstantRange};
use crate::types::{Date, Instant};
use crate::Error;

/// Which conversion a run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum Direction {
    #[display(fmt = "timestamp-to-date")]
    TimestampToDate,
    #[display(fmt = "date-to-timestamp")]
    DateToTimestamp,
}

/// A range bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum Bound {
    #[display(fmt = "start")]
    Start,
    #[display(fmt = "end")]
    End,
}

/// How a converter's answer diverged for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MismatchKind {
    /// The converted range matched the value when it shouldn't have, or
    /// the reverse. `converted` holds the converted bounds as written.
    WrongMatch {
        expected:  bool,
        actual:    bool,
        converted: [String; 2],
    },
    /// A set input bound came back as something other than a canonical date.
    NonCanonicalDate { bound: Bound, output: String },
    /// A bound was unset on one side of the conversion but not the other.
    UnsetAsymmetry { bound: Bound, output: String },
}

/// One case where the converter under test diverged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub case: RangeCase,
    pub kind: MismatchKind,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.case)?;
        match &self.kind {
            MismatchKind::WrongMatch {
                expected,
                actual,
                converted: [start, end],
            } => write!(
                f,
                "expected {expected}, got {actual}: [{start}, {end}] matching {}",
                self.case.value
            ),
            MismatchKind::NonCanonicalDate { bound, output } => {
                write!(f, "{bound} date {output:?} is not in YYYY-MM-DD form")
            }
            MismatchKind::UnsetAsymmetry { bound, output } if output.is_empty() => {
                write!(f, "{bound} was set but came back unset")
            }
            MismatchKind::UnsetAsymmetry { bound, output } => {
                write!(f, "{bound} was unset but came back as {output:?}")
            }
        }
    }
}

/// The outcome of a fixture run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub direction:      Direction,
    pub cases:          usize,
    pub mismatches:     Vec<Mismatch>,
    /// Every case the converter actually matched, in the same triple form
    /// as the expectation table.
    pub actual_matches: BTreeSet<RangeCase>,
}

impl Report {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            cases: 0,
            mismatches: Vec::new(),
            actual_matches: BTreeSet::new(),
        }
    }

    pub fn is_conformant(&self) -> bool {
        self.mismatches.is_empty()
    }

    fn record(&mut self, case: &RangeCase, kind: MismatchKind) {
        let mismatch = Mismatch {
            case: case.clone(),
            kind,
        };
        warn!(direction = %self.direction, %mismatch, "mismatch");
        self.mismatches.push(mismatch);
    }

    /// Logs the summary and the actual-match table.
    pub fn log(&self) {
        info!(
            direction = %self.direction,
            cases = self.cases,
            mismatches = self.mismatches.len(),
            matched = self.actual_matches.len(),
            "conformance run finished"
        );
        match serde_json::to_string(&self.actual_matches) {
            Ok(table) => info!(direction = %self.direction, %table, "actual matches"),
            Err(err) => warn!(error = %err, "failed to render actual matches"),
        }
    }

    /// Converts a run with any mismatch into [`Error::Nonconformant`].
    ///
    /// # Errors
    /// Returns `Error::Nonconformant` unless every case conformed.
    pub fn into_result(self) -> Result<Self, Error> {
        if self.is_conformant() {
            return Ok(self);
        }
        Err(Error::Nonconformant {
            direction:  self.direction,
            mismatches: self.mismatches.len(),
            cases:      self.cases,
            first:      self.mismatches.first().map(ToString::to_string).unwrap_or_default(),
        })
    }
}

/// Parses a converted date bound, recording a mismatch if it's malformed
/// or its presence doesn't mirror the input bound.
fn converted_date(report: &mut Report, case: &RangeCase, bound: Bound, input: &str, output: &str) -> Option<Option<Date>> {
    match (input.is_empty(), output.is_empty()) {
        (true, true) => Some(None),
        (true, false) | (false, true) => {
            report.record(case, MismatchKind::UnsetAsymmetry {
                bound,
                output: output.to_owned(),
            });
            None
        }
        (false, false) => match output.parse::<Date>() {
            Ok(date) => Some(Some(date)),
            Err(_) => {
                report.record(case, MismatchKind::NonCanonicalDate {
                    bound,
                    output: output.to_owned(),
                });
                None
            }
        },
    }
}

/// Runs every timestamp-range/date-value fixture through `converter`.
///
/// # Errors
/// Returns an error if a fixture doesn't parse or the converter fails.
/// Wrong answers are reported in the returned [`Report`].
pub fn verify_timestamp_to_date<C>(corpus: &Corpus, converter: &mut C) -> Result<Report, Error>
where
    C: TimestampToDate + ?Sized,
{
    let mut report = Report::new(Direction::TimestampToDate);
    for case in corpus.timestamp_to_date_cases() {
        let range = InstantRange::parse(&case.start, &case.end)?;
        let value: Date = case.value.parse()?;
        report.cases += 1;

        let raw = converter.timestamp_to_date(&range)?;
        trace!(%case, start = %raw.start, end = %raw.end, "converted");

        let start = converted_date(&mut report, &case, Bound::Start, &case.start, &raw.start);
        let end = converted_date(&mut report, &case, Bound::End, &case.end, &raw.end);
        let (Some(start), Some(end)) = (start, end) else {
            continue;
        };

        let actual = DateRange::new(start, end).matches(&value);
        if actual {
            report.actual_matches.insert(case.clone());
        }
        let expected = corpus.expects_match(&case);
        if actual != expected {
            report.record(&case, MismatchKind::WrongMatch {
                expected,
                actual,
                converted: [raw.start, raw.end],
            });
        }
    }
    report.log();
    Ok(report)
}

/// Runs every date-range/timestamp-value fixture through `converter`.
///
/// # Errors
/// Returns an error if a fixture doesn't parse or the converter fails.
pub fn verify_date_to_timestamp<C>(corpus: &Corpus, converter: &mut C) -> Result<Report, Error>
where
    C: DateToTimestamp + ?Sized,
{
    let mut report = Report::new(Direction::DateToTimestamp);
    for case in corpus.date_to_timestamp_cases() {
        let range = DateRange::parse(&case.start, &case.end)?;
        let value: Instant = case.value.parse()?;
        report.cases += 1;

        let converted = converter.date_to_timestamp(&range)?;
        let bounds = [
            (Bound::Start, &case.start, converted.start()),
            (Bound::End, &case.end, converted.end()),
        ];
        let mut symmetric = true;
        for (bound, input, output) in bounds {
            if input.is_empty() != output.is_none() {
                symmetric = false;
                report.record(&case, MismatchKind::UnsetAsymmetry {
                    bound,
                    output: output.map(|t| t.to_string()).unwrap_or_default(),
                });
            }
        }
        if !symmetric {
            continue;
        }

        let actual = converted.matches(&value);
        if actual {
            report.actual_matches.insert(case.clone());
        }
        let expected = corpus.expects_match(&case);
        if actual != expected {
            let render = |t: Option<Instant>| t.map(|t| t.to_string()).unwrap_or_default();
            report.record(&case, MismatchKind::WrongMatch {
                expected,
                actual,
                converted: [render(converted.start()), render(converted.end())],
            });
        }
    }
    report.log();
    Ok(report)
}

/// Starts `spec` as a timestamp-to-date command and runs the fixtures
/// against it. The command is torn down before this returns.
///
/// # Errors
/// Returns an error if the command can't be started or fails mid-run.
pub fn verify_external(spec: &CommandSpec, corpus: &Corpus, token: &CancelToken) -> Result<Report, Error> {
    bridge::run(spec, TimestampToDateCodec, token, |bridge| {
        verify_timestamp_to_date(corpus, &mut ExternalConverter::new(bridge))
    })
}
