//! Fuzzes an external timestamp-to-date command against the reference
//! semantics.
//!
//! ```text
//! fuzz-timestamp-to-date [-v] <external-command> [args...]
//! ```
//!
//! The fixture-derived seed corpus runs first, then `PROPTEST_CASES` random
//! cases (256 by default).

use std::process::ExitCode;

use tracing::{info, warn};
use tsdate_verify::fuzz::{self, FuzzConfig};
use tsdate_verify::{CancelToken, CommandSpec, Corpus, Error, FUZZ_OPTIONS_ENV, FuzzOptions, logging};

const USAGE: &str = "usage: fuzz-timestamp-to-date [-v] <external-command> [args...]";

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1).peekable();
    let verbose = args.next_if(|arg| arg == "-v" || arg == "--verbose").is_some();
    logging::init(verbose);

    let Some(program) = args.next() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let mut spec = CommandSpec::new(program).args(args);
    if let Ok(dir) = std::env::current_dir() {
        spec = spec.current_dir(dir);
    }

    match run(&spec) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(spec: &CommandSpec) -> Result<(), Error> {
    match FuzzOptions::from(spec).encode() {
        Ok(encoded) => info!("to fuzz from the test suite, set {FUZZ_OPTIONS_ENV}={encoded}"),
        Err(err) => warn!(error = %err, "cannot encode fuzz options"),
    }

    let corpus = Corpus::builtin()?;
    let summary = fuzz::fuzz_external(spec, &corpus, FuzzConfig::default(), &CancelToken::new())?;
    info!(?summary, "no invariant broken");
    Ok(())
}
