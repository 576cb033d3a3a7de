//! Conformance and fuzz harness for external timestamp-to-date converters.
//!
//! A converter turns a half-open range of instants into the closed range of
//! UTC dates it wholly covers. The harness runs an arbitrary external command
//! as a converter over a line protocol, replays a fixture table against it,
//! and fuzzes it against the reference semantics in [`oracle`].

mod consts;
mod prelude;
mod range;
mod types;

pub mod bridge;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod convert;
pub mod fixtures;
pub mod fuzz;
pub mod logging;
pub mod oracle;
pub mod runner;

pub use bridge::{Bridge, BridgeError, BridgeState, CommandSpec};
pub use cancel::CancelToken;
pub use config::{ConfigError, FuzzOptions};
pub use consts::*;
pub use fixtures::{Corpus, FixtureError};
pub use range::{DateRange, InstantRange, RangeError, RawDateRange};
pub use types::{Date, Instant, ParseError};

use crate::fuzz::{FuzzCase, FuzzFailure};
use crate::runner::Direction;

/// Run-level errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A fixture run finished with divergent cases.
    #[error("{direction}: {mismatches} of {cases} cases diverged, first: {first}")]
    Nonconformant {
        direction:  Direction,
        mismatches: usize,
        cases:      usize,
        first:      String,
    },

    /// A fuzz case broke an invariant.
    #[error("{failure}: {case}")]
    Falsified { case: FuzzCase, failure: FuzzFailure },

    /// The fuzzer gave up before running enough cases.
    #[error("Fuzzing aborted: {0}")]
    FuzzAborted(String),
}
