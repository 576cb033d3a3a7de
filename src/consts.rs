/// Calendar date format used on the wire and in fixtures (`YYYY-MM-DD`)
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Date/time portion of an RFC 3339 timestamp, before fractional seconds and offset
pub(crate) const TIMESTAMP_SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Seconds in one UTC day (no leap seconds)
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Nanoseconds in one second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Nanoseconds in one UTC day
pub const NANOS_PER_DAY: i64 = SECONDS_PER_DAY * NANOS_PER_SECOND;

/// Largest UTC offset accepted for an instant, in seconds (exclusive, per chrono)
pub const MAX_OFFSET_SECONDS: i32 = 86_400;

/// Separates the start and end fields of a request or response record
pub const FIELD_DELIMITER: u8 = b'\t';

/// Terminates a request or response record
pub const RECORD_TERMINATOR: u8 = b'\n';

/// Longest record a line framer accepts, excluding its terminator
pub const MAX_RECORD_BYTES: usize = 64 * 1024;

/// Stripped from the end of a line-framed record, if present
pub(crate) const CARRIAGE_RETURN: u8 = b'\r';

/// Representative fixed offsets (seconds east of UTC) used by the fuzz driver.
/// Seed cases additionally keep each fixture's own offset.
pub const FUZZ_OFFSETS_SECONDS: [i32; 15] = [
    -43_200, // UTC-12
    -36_000, // UTC-10
    -32_400, // UTC-9
    -25_200, // UTC-7
    -18_000, // UTC-5
    -14_400, // UTC-4
    -7_200,  // UTC-2
    0,       // UTC
    3_600,   // UTC+1
    7_200,   // UTC+2
    14_400,  // UTC+4
    18_000,  // UTC+5
    25_200,  // UTC+7
    32_400,  // UTC+9
    43_200,  // UTC+12
];

/// Environment variable carrying the base64 encoded fuzz options
pub const FUZZ_OPTIONS_ENV: &str = "TSDATE_FUZZ_OPTIONS";
