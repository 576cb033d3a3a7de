//! A timestamp-to-date command speaking the line protocol, backed by the
//! reference oracle.
//!
//! ```text
//! reference-timestamp-to-date [--fault <kind>] [--after <n>]
//! ```
//!
//! With `--fault`, the first `n` requests (default 0) are answered correctly
//! and every later one triggers the fault:
//!
//! * `malformed`: answers without a field delimiter;
//! * `exit`: exits with status 3 without answering;
//! * `truncate`: exits cleanly without answering;
//! * `hang`: keeps reading but never answers;
//! * `swap-offset`: converts the local wall-clock time as if it were UTC.

use std::io::{self, BufWriter, Write as _};
use std::process::ExitCode;
use std::str::FromStr;

use tracing::debug;
use tsdate_verify::codec::{CodecError, Framer, LineFramer, TimestampToDateCodec};
use tsdate_verify::{Instant, InstantRange, logging, oracle};

const USAGE: &str = "usage: reference-timestamp-to-date [--fault malformed|exit|truncate|hang|swap-offset] [--after <n>]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Fault {
    #[default]
    None,
    Malformed,
    Exit,
    Truncate,
    Hang,
    SwapOffset,
}

impl FromStr for Fault {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "malformed" => Ok(Self::Malformed),
            "exit" => Ok(Self::Exit),
            "truncate" => Ok(Self::Truncate),
            "hang" => Ok(Self::Hang),
            "swap-offset" => Ok(Self::SwapOffset),
            other => Err(format!("unknown fault {other:?}")),
        }
    }
}

#[derive(Debug, Default)]
struct Options {
    fault: Fault,
    after: usize,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut options = Self::default();
        while let Some(arg) = args.next() {
            let value = args.next().ok_or_else(|| format!("{arg} needs a value"))?;
            match arg.as_str() {
                "--fault" => options.fault = value.parse()?,
                "--after" => options.after = value.parse().map_err(|err| format!("--after {value:?}: {err}"))?,
                other => return Err(format!("unknown argument {other:?}")),
            }
        }
        Ok(options)
    }
}

#[derive(Debug, thiserror::Error)]
enum ServeError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Re-reads each bound's wall-clock time as UTC, dropping its offset.
fn ignore_offsets(range: &InstantRange) -> InstantRange {
    let local = |t: Instant| Instant::from_utc(t.as_datetime().naive_local().and_utc());
    InstantRange::new(range.start().map(local), range.end().map(local))
}

fn serve(options: &Options) -> Result<ExitCode, ServeError> {
    let codec = TimestampToDateCodec;
    let mut framer = LineFramer;
    let mut input = io::stdin().lock();
    let mut output = BufWriter::new(io::stdout().lock());
    let mut record = Vec::new();
    let mut response = Vec::new();
    let mut served = 0_usize;

    while framer.next_record(&mut input, &mut record)? {
        let range = codec.decode_request(&record)?;
        let fault = if served < options.after { Fault::None } else { options.fault };
        served += 1;
        debug!(%range, ?fault, "request");

        let dates = match fault {
            Fault::Exit => return Ok(ExitCode::from(3)),
            Fault::Truncate => return Ok(ExitCode::SUCCESS),
            Fault::Hang => continue,
            Fault::SwapOffset => oracle::timestamp_range_to_date_range(&ignore_offsets(&range)),
            Fault::None | Fault::Malformed => oracle::timestamp_range_to_date_range(&range),
        };

        response.clear();
        if fault == Fault::Malformed {
            writeln!(response, "{dates}")?;
        } else {
            codec.encode_response(&mut response, &dates.to_raw());
        }
        output.write_all(&response)?;
        output.flush()?;
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    logging::init(false);

    let options = match Options::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("ERROR: {err}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match serve(&options) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}
