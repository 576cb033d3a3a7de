//! Runs the fixture table against an external timestamp-to-date command.
//!
//! ```text
//! verify-timestamp-to-date [-v] <external-command> [args...]
//! ```
//!
//! The command reads tab-separated RFC 3339 timestamp pairs from stdin and
//! writes tab-separated date pairs to stdout, one pair per line.

use std::process::ExitCode;

use tsdate_verify::{CancelToken, CommandSpec, Corpus, Error, logging, runner};

const USAGE: &str = "usage: verify-timestamp-to-date [-v] <external-command> [args...]";

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1).peekable();
    let verbose = args.next_if(|arg| arg == "-v" || arg == "--verbose").is_some();
    logging::init(verbose);

    let Some(program) = args.next() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let spec = CommandSpec::new(program).args(args);

    match run(&spec) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(spec: &CommandSpec) -> Result<(), Error> {
    let corpus = Corpus::builtin()?;
    let report = runner::verify_external(spec, &corpus, &CancelToken::new())?;
    report.into_result().map(drop)
}
