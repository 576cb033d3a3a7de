//! Wire formats for talking to an external converter over byte streams.
//!
//! A [`Codec`] turns call inputs into request records and response records
//! into call outputs; its [`Framer`] splits the child's output stream into
//! records. [`TimestampToDateCodec`] speaks the default protocol:
//!
//! ```text
//! request:  <RFC 3339 start or empty> TAB <RFC 3339 end or empty> NEWLINE
//! response: <YYYY-MM-DD start or empty> TAB <YYYY-MM-DD end or empty> NEWLINE
//! ```

use std::io::{self, BufRead, Read as _, Write as _};

use crate::consts::{CARRIAGE_RETURN, FIELD_DELIMITER, MAX_RECORD_BYTES, RECORD_TERMINATOR};
use crate::range::{InstantRange, RawDateRange, RangeError};

/// Errors produced while encoding requests or decoding records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The record has no field delimiter.
    #[error("malformed output: no field delimiter in {record:?}")]
    MissingDelimiter { record: String },

    /// A field isn't valid UTF-8.
    #[error("malformed output: {record:?} is not valid UTF-8")]
    InvalidUtf8 { record: String },

    /// The stream ran past the record length limit without a terminator.
    #[error("malformed output: record exceeds {limit} bytes without a newline")]
    RecordTooLong { limit: usize },

    /// A field didn't parse (server side only).
    #[error("malformed request: {0}")]
    InvalidField(#[from] RangeError),

    /// The input can't be written in this wire format.
    #[error("cannot encode request: {0}")]
    Unencodable(String),
}

/// Splits a byte stream into records.
pub trait Framer: Send + 'static {
    /// Reads the next record into `record`, replacing its contents.
    /// Returns `Ok(false)` once the stream is exhausted.
    ///
    /// # Errors
    /// Returns any I/O error from the underlying reader. A framing violation
    /// is an `InvalidData` error wrapping a [`CodecError`]; see
    /// [`framing_error`].
    fn next_record<R: BufRead>(&mut self, reader: &mut R, record: &mut Vec<u8>) -> io::Result<bool>;
}

/// The [`CodecError`] carried by an error from [`Framer::next_record`], if
/// the error is a framing violation rather than a failed read.
pub fn framing_error(err: &io::Error) -> Option<&CodecError> {
    err.get_ref()?.downcast_ref::<CodecError>()
}

/// Newline-delimited records of at most [`MAX_RECORD_BYTES`]. A trailing
/// `\r` is dropped, and a final unterminated record is still yielded at end
/// of stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFramer;

impl Framer for LineFramer {
    fn next_record<R: BufRead>(&mut self, reader: &mut R, record: &mut Vec<u8>) -> io::Result<bool> {
        record.clear();
        let limit = u64::try_from(MAX_RECORD_BYTES + 1).unwrap_or(u64::MAX);
        if reader.by_ref().take(limit).read_until(RECORD_TERMINATOR, record)? == 0 {
            return Ok(false);
        }
        if record.last() == Some(&RECORD_TERMINATOR) {
            record.pop();
        } else if record.len() > MAX_RECORD_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, CodecError::RecordTooLong {
                limit: MAX_RECORD_BYTES,
            }));
        }
        if record.last() == Some(&CARRIAGE_RETURN) {
            record.pop();
        }
        Ok(true)
    }
}

/// Translates between call values and the bytes exchanged with a child process.
pub trait Codec: Send + Sync + 'static {
    type Input;
    type Output: Send + 'static;
    type Framer: Framer;

    /// Appends one request record for `input` to `buf`. The caller truncates
    /// and reuses `buf` between calls.
    ///
    /// # Errors
    /// Returns `CodecError` if `input` can't be represented on the wire.
    fn encode(&self, buf: &mut Vec<u8>, input: &Self::Input) -> Result<(), CodecError>;

    /// Parses one response record (without its terminator).
    ///
    /// # Errors
    /// Returns `CodecError` if the record is malformed.
    fn decode(&self, record: &[u8]) -> Result<Self::Output, CodecError>;

    /// A fresh framer for splitting the child's output stream
    fn framer(&self) -> Self::Framer;
}

/// The default protocol: instant ranges out, raw date ranges back.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampToDateCodec;

fn split_fields(record: &[u8]) -> Result<(&str, &str), CodecError> {
    let text = std::str::from_utf8(record).map_err(|_| CodecError::InvalidUtf8 {
        record: String::from_utf8_lossy(record).into_owned(),
    })?;
    text.split_once(char::from(FIELD_DELIMITER))
        .ok_or_else(|| CodecError::MissingDelimiter { record: text.to_owned() })
}

fn unencodable(err: &io::Error) -> CodecError {
    CodecError::Unencodable(err.to_string())
}

impl TimestampToDateCodec {
    /// Parses a request record, as the external command would.
    ///
    /// # Errors
    /// Returns `CodecError` if the record is malformed or a bound isn't RFC 3339.
    pub fn decode_request(&self, record: &[u8]) -> Result<InstantRange, CodecError> {
        let (start, end) = split_fields(record)?;
        Ok(InstantRange::parse(start, end)?)
    }

    /// Appends a response record, as the external command would.
    pub fn encode_response(&self, buf: &mut Vec<u8>, output: &RawDateRange) {
        buf.extend_from_slice(output.start.as_bytes());
        buf.push(FIELD_DELIMITER);
        buf.extend_from_slice(output.end.as_bytes());
        buf.push(RECORD_TERMINATOR);
    }
}

impl Codec for TimestampToDateCodec {
    type Input = InstantRange;
    type Output = RawDateRange;
    type Framer = LineFramer;

    fn encode(&self, buf: &mut Vec<u8>, input: &InstantRange) -> Result<(), CodecError> {
        if let Some(start) = input.start() {
            write!(buf, "{start}").map_err(|err| unencodable(&err))?;
        }
        buf.push(FIELD_DELIMITER);
        if let Some(end) = input.end() {
            write!(buf, "{end}").map_err(|err| unencodable(&err))?;
        }
        buf.push(RECORD_TERMINATOR);
        Ok(())
    }

    fn decode(&self, record: &[u8]) -> Result<RawDateRange, CodecError> {
        let (start, end) = split_fields(record)?;
        Ok(RawDateRange {
            start: start.to_owned(),
            end:   end.to_owned(),
        })
    }

    fn framer(&self) -> LineFramer {
        LineFramer
    }
}
