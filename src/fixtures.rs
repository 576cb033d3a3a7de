//! The built-in conformance fixtures: range and value lists for both
//! conversion directions, plus the table of `(start, end, value)` triples
//! that are expected to match. Any enumerated triple absent from the table
//! is expected not to match.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Date, Instant, ParseError};

const BUILTIN_CORPUS: &str = include_str!("../fixtures/corpus.json");

/// Error type for loading and validating a fixture corpus.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("Invalid fixture corpus: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid fixture timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value:  String,
        #[source]
        source: ParseError,
    },

    #[error("Invalid fixture date {value:?}: {source}")]
    InvalidDate {
        value:  String,
        #[source]
        source: ParseError,
    },
}

/// One enumerated test case: a range given as its two raw bounds (empty for
/// unset) and a value, all exactly as they appear in the fixtures.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "[String; 3]", into = "[String; 3]")]
pub struct RangeCase {
    pub start: String,
    pub end:   String,
    pub value: String,
}

impl From<[String; 3]> for RangeCase {
    fn from([start, end, value]: [String; 3]) -> Self {
        Self { start, end, value }
    }
}

impl From<RangeCase> for [String; 3] {
    fn from(case: RangeCase) -> Self {
        [case.start, case.end, case.value]
    }
}

impl fmt::Display for RangeCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.start, self.end, self.value)
    }
}

/// Fixture lists and the expectation table shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    pub date_values:            Vec<String>,
    pub date_range_values:      Vec<[String; 2]>,
    pub timestamp_values:       Vec<String>,
    pub timestamp_range_values: Vec<[String; 2]>,
    pub matches:                BTreeSet<RangeCase>,
}

impl Corpus {
    /// The corpus compiled into the crate.
    ///
    /// # Errors
    /// Returns `FixtureError` if the embedded corpus is malformed.
    pub fn builtin() -> Result<Self, FixtureError> {
        Self::from_json(BUILTIN_CORPUS)
    }

    /// Parses and validates a corpus.
    ///
    /// # Errors
    /// Returns `FixtureError` if the JSON is malformed, or any timestamp
    /// isn't RFC 3339, or any date isn't canonical `YYYY-MM-DD`.
    pub fn from_json(json: &str) -> Result<Self, FixtureError> {
        let corpus: Self = serde_json::from_str(json)?;
        corpus.validate()?;
        Ok(corpus)
    }

    fn validate(&self) -> Result<(), FixtureError> {
        let timestamps = self
            .timestamp_values
            .iter()
            .chain(self.timestamp_range_values.iter().flatten());
        for value in timestamps.filter(|v| !v.is_empty()) {
            value.parse::<Instant>().map_err(|source| FixtureError::InvalidTimestamp {
                value: value.clone(),
                source,
            })?;
        }

        let dates = self.date_values.iter().chain(self.date_range_values.iter().flatten());
        for value in dates.filter(|v| !v.is_empty()) {
            value.parse::<Date>().map_err(|source| FixtureError::InvalidDate {
                value: value.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Whether `case` is in the expectation table.
    pub fn expects_match(&self, case: &RangeCase) -> bool {
        self.matches.contains(case)
    }

    /// Timestamp ranges crossed with date values.
    pub fn timestamp_to_date_cases(&self) -> Vec<RangeCase> {
        range_test_cases(&self.timestamp_range_values, &self.date_values)
    }

    /// Date ranges crossed with timestamp values.
    pub fn date_to_timestamp_cases(&self) -> Vec<RangeCase> {
        range_test_cases(&self.date_range_values, &self.timestamp_values)
    }
}

/// Enumerates every range, then the same range with its start cleared, then
/// with its end cleared, each crossed with every value. Repeated triples are
/// yielded once, in first-seen order.
pub fn range_test_cases(ranges: &[[String; 2]], values: &[String]) -> Vec<RangeCase> {
    let mut seen = HashSet::new();
    let mut cases = Vec::new();
    for [start, end] in ranges {
        let variants = [
            (start.as_str(), end.as_str()),
            ("", end.as_str()),
            (start.as_str(), ""),
        ];
        for (start, end) in variants {
            for value in values {
                let case = RangeCase {
                    start: start.to_owned(),
                    end:   end.to_owned(),
                    value: value.clone(),
                };
                if seen.insert(case.clone()) {
                    cases.push(case);
                }
            }
        }
    }
    cases
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_owned()).collect()
    }

    fn pair(start: &str, end: &str) -> [String; 2] {
        [start.to_owned(), end.to_owned()]
    }

    #[test]
    fn test_builtin_corpus_loads() {
        let corpus = Corpus::builtin().unwrap();
        assert_eq!(corpus.date_values.len(), 18);
        assert_eq!(corpus.date_range_values.len(), 18);
        assert_eq!(corpus.timestamp_values.len(), 19);
        assert_eq!(corpus.timestamp_range_values.len(), 20);
        assert_eq!(corpus.matches.len(), 719);
    }

    #[test]
    fn test_builtin_case_counts() {
        let corpus = Corpus::builtin().unwrap();
        assert_eq!(corpus.timestamp_to_date_cases().len(), 1020);
        assert_eq!(corpus.date_to_timestamp_cases().len(), 969);
    }

    #[test]
    fn test_every_expected_match_is_enumerated() {
        let corpus = Corpus::builtin().unwrap();
        let enumerated: HashSet<_> = corpus
            .timestamp_to_date_cases()
            .into_iter()
            .chain(corpus.date_to_timestamp_cases())
            .collect();
        for case in &corpus.matches {
            assert!(enumerated.contains(case), "{case} is never enumerated");
        }
    }

    #[test]
    fn test_range_test_cases_order_and_dedupe() {
        let ranges = [pair("a", "b"), pair("", "b")];
        let values = strings(&["x", "y", "x"]);
        let cases = range_test_cases(&ranges, &values);
        let rendered: Vec<String> = cases.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, [
            "a-b-x", "a-b-y", // as given
            "-b-x", "-b-y", // start cleared
            "a--x", "a--y", // end cleared
            "--x", "--y", // second range, end cleared
        ]);
    }

    #[test]
    fn test_range_case_serde_as_triple() {
        let case = RangeCase {
            start: "2024-01-01".to_owned(),
            end:   String::new(),
            value: "2024-01-15T00:00:00Z".to_owned(),
        };
        let json = serde_json::to_string(&case).unwrap();
        assert_eq!(json, r#"["2024-01-01","","2024-01-15T00:00:00Z"]"#);
        assert_eq!(serde_json::from_str::<RangeCase>(&json).unwrap(), case);
    }

    #[test]
    fn test_rejects_invalid_values() {
        struct TestCase {
            json:      &'static str,
            timestamp: bool,
        }

        let cases = [
            TestCase {
                json:      r#"{"date_values":["2024-1-01"],"date_range_values":[],"timestamp_values":[],"timestamp_range_values":[],"matches":[]}"#,
                timestamp: false,
            },
            TestCase {
                json:      r#"{"date_values":[],"date_range_values":[],"timestamp_values":[],"timestamp_range_values":[["2024-01-01","noon"]],"matches":[]}"#,
                timestamp: true,
            },
        ];

        for case in &cases {
            match Corpus::from_json(case.json) {
                Err(FixtureError::InvalidTimestamp { .. }) => assert!(case.timestamp),
                Err(FixtureError::InvalidDate { .. }) => assert!(!case.timestamp),
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(Corpus::from_json("{"), Err(FixtureError::Json(_))));
    }
}
