//! Structured logging setup
//!
//! The engine and host emit `tracing` events; nothing is printed unless a subscriber is installed. [`init`] installs
//! the usual `fmt` subscriber for test binaries.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn";

/// Install a `fmt` subscriber with an env-based filter, defaulting to `warn`.
///
/// Output goes through the libtest-aware test writer so it is captured per test. Calling this more than once (for
/// example from several tests in one binary) is harmless: later calls keep the first subscriber.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with_test_writer()
        .try_init();
}
