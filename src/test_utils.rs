//! Test logging helpers shared by the unit and integration suites.
//!
//! Tests initialize a process-wide tracing subscriber once via
//! [`init_test_logging`] and narrate themselves with the `test_phase!`,
//! `assert_with_log!`, and `test_complete!` macros, so a failing
//! multi-threaded run leaves a readable trail instead of a bare panic.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a tracing subscriber for the current test binary.
///
/// Idempotent; every test calls it first. Honors `RUST_LOG`, defaulting
/// to `info`. Output goes through the libtest capture writer so it only
/// shows for failing tests (or with `--nocapture`).
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Marks the start of a named test or test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = $name, "test phase");
    };
}

/// Marks a test as having run to completion.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "test complete");
    };
}

/// Asserts `$cond`, logging the expectation and the observed value
/// through tracing before panicking.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $what:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            tracing::error!(
                check = $what,
                expected = ?$expected,
                actual = ?$actual,
                "assertion failed"
            );
            panic!("{}: expected {:?}, got {:?}", $what, $expected, $actual);
        }
    };
}
