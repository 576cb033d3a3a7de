//! Property-based fuzzing of a timestamp-to-date converter.
//!
//! The driver first replays a seed corpus built from the fixtures (every
//! fixture range re-expressed in each of [`FUZZ_OFFSETS_SECONDS`]), then
//! draws random cases with `proptest`. Every case checks that:
//!
//! * an unset input bound comes back empty, and a set one doesn't;
//! * every produced date is canonical `YYYY-MM-DD`;
//! * the produced dates aren't inverted when the input covers a whole UTC day;
//! * a date matches the produced range exactly when both its first instant
//!   (midnight UTC) and its last (the next midnight less 1ns) fall in the
//!   input range.

use std::cell::{Cell, RefCell};
use std::fmt;

use chrono::TimeDelta;
use proptest::prelude::*;
use proptest::test_runner::{Config, TestCaseError, TestError, TestRunner};
use tracing::{debug, info};

use crate::bridge::{self, BridgeError, CommandSpec};
use crate::cancel::CancelToken;
use crate::codec::TimestampToDateCodec;
use crate::consts::{FUZZ_OFFSETS_SECONDS, NANOS_PER_DAY, NANOS_PER_SECOND};
use crate::convert::{ExternalConverter, TimestampToDate};
use crate::fixtures::Corpus;
use crate::oracle::covers_whole_utc_day;
use crate::prelude::*;
use crate::range::{DateRange, InstantRange, RawDateRange};
use crate::runner::Bound;
use crate::types::{Date, Instant};
use crate::Error;

/// Days from 1970-01-01 to 2100-01-01
const CALENDAR_DAYS: i64 = 47_482;

/// How far from a bound a "nearby" value may fall
const NEAR_BOUND_NANOS: i64 = 3 * NANOS_PER_DAY;

/// One fuzz input: an instant range and a date to match against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzCase {
    pub range: InstantRange,
    pub value: Date,
}

impl fmt::Display for FuzzCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} matching {}", self.range, self.value)
    }
}

/// Why a case was not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SkipReason {
    #[display(fmt = "both bounds are unset")]
    Unbounded,
    #[display(fmt = "end is not at least one full day after start")]
    ShorterThanDay,
}

impl FuzzCase {
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match (self.range.start(), self.range.end()) {
            (None, None) => Some(SkipReason::Unbounded),
            (Some(_), Some(_)) if !self.range.spans_full_day() => Some(SkipReason::ShorterThanDay),
            _ => None,
        }
    }
}

/// An invariant the converter broke for one case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FuzzFailure {
    /// `set` says whether the input bound was set.
    #[error("{bound} set={set} but came back as {output:?}")]
    UnsetMismatch { bound: Bound, set: bool, output: String },

    #[error("{bound} date {output:?} is not in YYYY-MM-DD form")]
    NonCanonicalDate { bound: Bound, output: String },

    #[error("start date is after end date: [{start}, {end}]")]
    Inverted { start: String, end: String },

    /// `lower` and `upper` say whether the value's first and last instants
    /// fall in the input range.
    #[error("date range [{start}, {end}] matched={matched}, but first instant matched={lower} and last instant matched={upper}")]
    WrongMatch {
        start:   String,
        end:     String,
        matched: bool,
        lower:   bool,
        upper:   bool,
    },
}

/// The result of checking one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Skipped(SkipReason),
    Passed,
    Failed(FuzzFailure),
}

fn produced_date(bound: Bound, output: &str) -> Result<Option<Date>, FuzzFailure> {
    if output.is_empty() {
        return Ok(None);
    }
    output.parse().map(Some).map_err(|_| FuzzFailure::NonCanonicalDate {
        bound,
        output: output.to_owned(),
    })
}

fn judge(case: &FuzzCase, dates: &RawDateRange) -> Result<(), FuzzFailure> {
    let bounds = [
        (Bound::Start, case.range.start().is_some(), &dates.start),
        (Bound::End, case.range.end().is_some(), &dates.end),
    ];
    for (bound, set, output) in bounds {
        if set == output.is_empty() {
            return Err(FuzzFailure::UnsetMismatch {
                bound,
                set,
                output: output.clone(),
            });
        }
    }

    let produced = DateRange::new(
        produced_date(Bound::Start, &dates.start)?,
        produced_date(Bound::End, &dates.end)?,
    );
    if produced.is_inverted() && covers_whole_utc_day(&case.range) {
        return Err(FuzzFailure::Inverted {
            start: dates.start.clone(),
            end:   dates.end.clone(),
        });
    }

    let first = case.value.start_instant();
    let last = Instant::from_utc(case.value.next().start_instant().to_utc() - TimeDelta::nanoseconds(1));
    let lower = case.range.matches(&first);
    let upper = case.range.matches(&last);
    let matched = produced.matches(&case.value);
    if matched != (lower && upper) {
        return Err(FuzzFailure::WrongMatch {
            start: dates.start.clone(),
            end: dates.end.clone(),
            matched,
            lower,
            upper,
        });
    }
    Ok(())
}

/// Converts `case.range` with `converter` and checks the result.
///
/// # Errors
/// Returns the converter's error. Broken invariants are reported as
/// [`Verdict::Failed`].
pub fn check_case<C>(converter: &mut C, case: &FuzzCase) -> Result<Verdict, BridgeError>
where
    C: TimestampToDate + ?Sized,
{
    if let Some(reason) = case.skip_reason() {
        return Ok(Verdict::Skipped(reason));
    }
    let dates = converter.timestamp_to_date(&case.range)?;
    Ok(match judge(case, &dates) {
        Ok(()) => Verdict::Passed,
        Err(failure) => Verdict::Failed(failure),
    })
}

/// Nanoseconds since the epoch: anywhere in range, or close to a UTC
/// midnight between 1970 and 2100.
fn epoch_nanos() -> impl Strategy<Value = i64> {
    prop_oneof![
        any::<i64>(),
        (0..CALENDAR_DAYS, -NANOS_PER_SECOND..=NANOS_PER_SECOND)
            .prop_map(|(day, jitter)| day * NANOS_PER_DAY + jitter),
    ]
}

fn bound() -> impl Strategy<Value = Option<Instant>> {
    (epoch_nanos(), prop::sample::select(FUZZ_OFFSETS_SECONDS.to_vec()), any::<bool>()).prop_filter_map(
        "offset out of range",
        |(nanos, offset, ignore)| {
            if ignore {
                return Some(None);
            }
            Instant::from_unix_nanos(nanos, offset).ok().map(Some)
        },
    )
}

/// Random fuzz cases. Unset bounds are as likely as set ones, and half the
/// values land within a few days of a set bound.
pub fn fuzz_case() -> impl Strategy<Value = FuzzCase> {
    let value = (epoch_nanos(), -NEAR_BOUND_NANOS..=NEAR_BOUND_NANOS, any::<bool>());
    (bound(), bound(), value).prop_filter_map("value out of range", |(start, end, (epoch, delta, near))| {
        let anchor = if near { end.or(start) } else { None };
        let nanos = match anchor {
            Some(t) => t.unix_nanos()?.checked_add(delta)?,
            None => epoch,
        };
        Some(FuzzCase {
            range: InstantRange::new(start, end),
            value: Instant::from_unix_nanos(nanos, 0).ok()?.utc_date(),
        })
    })
}

/// Driver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzConfig {
    /// Random cases to run after the seeds. Defaults to proptest's case
    /// count, which honours `PROPTEST_CASES`.
    pub cases:       u32,
    /// Whether to replay the fixture-derived seed corpus first.
    pub seed_corpus: bool,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            cases:       Config::default().cases,
            seed_corpus: true,
        }
    }
}

/// Counts from a completed fuzz run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuzzSummary {
    pub seeds_checked: usize,
    pub seeds_skipped: usize,
    pub random_cases:  usize,
}

/// Runs the seed corpus and random cases against a converter.
#[derive(Debug, Clone)]
pub struct FuzzDriver<'a> {
    corpus: &'a Corpus,
    config: FuzzConfig,
}

impl<'a> FuzzDriver<'a> {
    pub const fn new(corpus: &'a Corpus, config: FuzzConfig) -> Self {
        Self { corpus, config }
    }

    /// Every timestamp-to-date fixture case with each set bound re-expressed
    /// in its own offset and then in each fuzz offset. The instants
    /// themselves never change.
    ///
    /// # Errors
    /// Returns an error if a fixture doesn't parse.
    pub fn seed_cases(&self) -> Result<Vec<FuzzCase>, Error> {
        let mut seeds = Vec::new();
        for case in self.corpus.timestamp_to_date_cases() {
            let range = InstantRange::parse(&case.start, &case.end)?;
            let value: Date = case.value.parse()?;
            let starts = offset_variants(range.start())?;
            let ends = offset_variants(range.end())?;
            for start in &starts {
                for end in &ends {
                    seeds.push(FuzzCase {
                        range: InstantRange::new(*start, *end),
                        value,
                    });
                }
            }
        }
        Ok(seeds)
    }

    /// Runs the seeds (if enabled), then the random cases, stopping at the
    /// first broken invariant. Random failures are shrunk first.
    ///
    /// # Errors
    /// Returns [`Error::Falsified`] for a broken invariant, or the
    /// converter's error if it fails.
    pub fn run<C>(&self, converter: &mut C) -> Result<FuzzSummary, Error>
    where
        C: TimestampToDate + ?Sized,
    {
        let mut summary = FuzzSummary::default();

        if self.config.seed_corpus {
            let seeds = self.seed_cases()?;
            info!(seeds = seeds.len(), "replaying seed corpus");
            for case in &seeds {
                match check_case(converter, case)? {
                    Verdict::Passed => summary.seeds_checked += 1,
                    Verdict::Skipped(_) => summary.seeds_skipped += 1,
                    Verdict::Failed(failure) => return Err(Error::Falsified { case: *case, failure }),
                }
            }
        }

        summary.random_cases = self.run_random(converter)?;
        info!(
            seeds_checked = summary.seeds_checked,
            seeds_skipped = summary.seeds_skipped,
            random_cases = summary.random_cases,
            "fuzz run finished"
        );
        Ok(summary)
    }

    fn run_random<C>(&self, converter: &mut C) -> Result<usize, Error>
    where
        C: TimestampToDate + ?Sized,
    {
        if self.config.cases == 0 {
            return Ok(0);
        }

        let config = Config {
            cases: self.config.cases,
            // roughly a third of random cases are skipped
            max_global_rejects: self.config.cases.saturating_mul(4).max(1024),
            failure_persistence: None,
            ..Config::default()
        };
        let mut runner = TestRunner::new(config);

        let converter = RefCell::new(converter);
        let broken: RefCell<Option<BridgeError>> = RefCell::new(None);
        let last_failure: RefCell<Option<(FuzzCase, FuzzFailure)>> = RefCell::new(None);
        let checked = Cell::new(0_usize);

        let result = runner.run(&fuzz_case(), |case| {
            if broken.borrow().is_some() {
                return Ok(());
            }
            match check_case(&mut **converter.borrow_mut(), &case) {
                Ok(Verdict::Passed) => {
                    checked.set(checked.get() + 1);
                    Ok(())
                }
                Ok(Verdict::Skipped(reason)) => Err(TestCaseError::reject(reason.to_string())),
                Ok(Verdict::Failed(failure)) => {
                    debug!(%case, %failure, "fuzz case failed");
                    let message = failure.to_string();
                    *last_failure.borrow_mut() = Some((case, failure));
                    Err(TestCaseError::fail(message))
                }
                Err(err) => {
                    let message = err.to_string();
                    *broken.borrow_mut() = Some(err);
                    Err(TestCaseError::fail(message))
                }
            }
        });

        if let Some(err) = broken.into_inner() {
            return Err(err.into());
        }
        match result {
            Ok(()) => Ok(checked.get()),
            Err(TestError::Fail(reason, case)) => match last_failure.into_inner() {
                Some((_, failure)) => Err(Error::Falsified { case, failure }),
                None => Err(Error::FuzzAborted(reason.to_string())),
            },
            Err(TestError::Abort(reason)) => Err(Error::FuzzAborted(reason.to_string())),
        }
    }
}

fn offset_variants(bound: Option<Instant>) -> Result<Vec<Option<Instant>>, Error> {
    let Some(instant) = bound else {
        return Ok(vec![None]);
    };
    let mut variants = Vec::with_capacity(FUZZ_OFFSETS_SECONDS.len() + 1);
    variants.push(Some(instant));
    for offset in FUZZ_OFFSETS_SECONDS {
        variants.push(Some(instant.with_offset(offset)?));
    }
    Ok(variants)
}

/// Starts `spec` as a timestamp-to-date command and fuzzes it. The command
/// is torn down before this returns.
///
/// # Errors
/// Returns an error if the command can't be started, fails mid-run, or
/// breaks an invariant.
pub fn fuzz_external(
    spec: &CommandSpec,
    corpus: &Corpus,
    config: FuzzConfig,
    token: &CancelToken,
) -> Result<FuzzSummary, Error> {
    bridge::run(spec, TimestampToDateCodec, token, |bridge| {
        FuzzDriver::new(corpus, config).run(&mut ExternalConverter::new(bridge))
    })
}
