//! `tracing` subscriber setup.
//!
//! Events go to stderr: an external command speaks its protocol on stdout,
//! and the harness binaries keep stdout free for the same reason.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global subscriber for a binary.
///
/// The default level is `info`, or `trace` when `verbose`. `RUST_LOG`
/// overrides both. Does nothing if a subscriber is already installed.
pub fn init(verbose: bool) {
    let default = if verbose { "trace" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let terminal = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let _ = tracing_subscriber::registry().with(filter).with(terminal).try_init();
}

/// Installs a subscriber that writes through the test harness's capture.
/// Safe to call from every test.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
