//! Latch tuning configuration.
//!
//! These knobs drive the contended paths of every latch in the process:
//! how long a thread spins before yielding or parking, how much random
//! delay separates consecutive probes, and when the wait-array starts
//! warning about suspiciously long waits.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `spin_wait_rounds` | 30 |
//! | `spin_wait_delay` | 6 |
//! | `long_wait_warn` | 30 s |
//!
//! The installed values are process-global and may be retuned at runtime;
//! latches pick them up on their next acquisition. The explicit
//! `enter(max_spins, max_delay, ..)` entry points bypass the globals
//! entirely for call sites that want per-latch tuning.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

/// Default number of spin rounds before the first yield or park.
pub const DEFAULT_SPIN_ROUNDS: u32 = 30;

/// Default upper bound on the random inter-probe delay, in delay units.
pub const DEFAULT_SPIN_DELAY: u32 = 6;

/// Default threshold after which a parked thread is reported as a long
/// latch wait.
pub const DEFAULT_LONG_WAIT_WARN: Duration = Duration::from_secs(30);

/// Upper bound accepted for `spin_wait_delay`. Larger values burn whole
/// scheduler quanta inside the pause loop.
pub const MAX_SPIN_DELAY: u32 = 1_000;

/// Errors produced while validating or loading latch configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `spin_wait_delay` exceeds [`MAX_SPIN_DELAY`].
    #[error("spin_wait_delay {0} exceeds the maximum of {MAX_SPIN_DELAY}")]
    SpinDelayTooLarge(u32),

    /// `long_wait_warn` was zero; the wait-array needs a nonzero horizon.
    #[error("long_wait_warn must be nonzero")]
    ZeroLongWaitWarn,

    /// An environment override held an unparsable value.
    #[error("invalid value for {var}: {value:?}")]
    InvalidOverride {
        /// The environment variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Tuning knobs for the spin/yield/park escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinConfig {
    /// Spin rounds before the first yield (spin variants) or park
    /// (futex and event variants).
    pub spin_wait_rounds: u32,
    /// Upper bound on the random delay between probes, in delay units.
    pub spin_wait_delay: u32,
    /// Park duration after which the wait-array logs a warning.
    pub long_wait_warn: Duration,
}

impl Default for SpinConfig {
    fn default() -> Self {
        Self {
            spin_wait_rounds: DEFAULT_SPIN_ROUNDS,
            spin_wait_delay: DEFAULT_SPIN_DELAY,
            long_wait_warn: DEFAULT_LONG_WAIT_WARN,
        }
    }
}

impl SpinConfig {
    /// Validates the configuration for basic sanity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spin_wait_delay > MAX_SPIN_DELAY {
            return Err(ConfigError::SpinDelayTooLarge(self.spin_wait_delay));
        }
        if self.long_wait_warn.is_zero() {
            return Err(ConfigError::ZeroLongWaitWarn);
        }
        Ok(())
    }

    /// Builds a configuration from the defaults plus `LATCHSYNC_*`
    /// environment overrides.
    ///
    /// Recognized variables: `LATCHSYNC_SPIN_ROUNDS`,
    /// `LATCHSYNC_SPIN_DELAY`, `LATCHSYNC_LONG_WAIT_WARN_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(rounds) = parse_env_u32("LATCHSYNC_SPIN_ROUNDS")? {
            config.spin_wait_rounds = rounds;
        }
        if let Some(delay) = parse_env_u32("LATCHSYNC_SPIN_DELAY")? {
            config.spin_wait_delay = delay;
        }
        if let Some(secs) = parse_env_u64("LATCHSYNC_LONG_WAIT_WARN_SECS")? {
            config.long_wait_warn = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Validates and installs this configuration as the process-global
    /// tuning read by [`current`] and the convenience `lock()` paths.
    pub fn install(self) -> Result<(), ConfigError> {
        self.validate()?;
        SPIN_ROUNDS.store(self.spin_wait_rounds, Ordering::Relaxed);
        SPIN_DELAY.store(self.spin_wait_delay, Ordering::Relaxed);
        LONG_WAIT_WARN_MS.store(self.long_wait_warn.as_millis() as u64, Ordering::Relaxed);
        Ok(())
    }
}

static SPIN_ROUNDS: AtomicU32 = AtomicU32::new(DEFAULT_SPIN_ROUNDS);
static SPIN_DELAY: AtomicU32 = AtomicU32::new(DEFAULT_SPIN_DELAY);
static LONG_WAIT_WARN_MS: AtomicU64 = AtomicU64::new(DEFAULT_LONG_WAIT_WARN.as_millis() as u64);

/// Returns a snapshot of the process-global tuning.
#[must_use]
pub fn current() -> SpinConfig {
    SpinConfig {
        spin_wait_rounds: SPIN_ROUNDS.load(Ordering::Relaxed),
        spin_wait_delay: SPIN_DELAY.load(Ordering::Relaxed),
        long_wait_warn: Duration::from_millis(LONG_WAIT_WARN_MS.load(Ordering::Relaxed)),
    }
}

fn parse_env_u32(var: &'static str) -> Result<Option<u32>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidOverride { var, value }),
        Err(_) => Ok(None),
    }
}

fn parse_env_u64(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidOverride { var, value }),
        Err(_) => Ok(None),
    }
}
