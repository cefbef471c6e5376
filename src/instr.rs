//! Pluggable wait instrumentation.
//!
//! The facade reports lock lifecycle events (registration, wait spans,
//! releases) to a process-global [`MutexProbe`]. Nothing is installed by
//! default and every call site tolerates the missing probe, so the hot
//! paths cost a single load when instrumentation is off. An engine embeds
//! its performance-schema bridge by calling [`install`] once at startup.
//!
//! [`CountingProbe`] is a trivial recording implementation used by the
//! test suites.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::latch::PfsKey;

/// Handle identifying a registered mutex inside the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeId(pub u64);

/// Handle identifying one in-flight wait span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitToken(pub u64);

/// Which acquisition operation a wait span covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOp {
    /// A blocking acquisition.
    Lock,
    /// A non-blocking attempt.
    TryLock,
}

/// Sink for latch instrumentation events.
///
/// Implementations must be cheap and lock-free on the span paths; they are
/// invoked inside latch acquisition.
pub trait MutexProbe: Send + Sync {
    /// Registers a mutex, returning a handle or `None` if this mutex is
    /// not interesting to the probe.
    fn init_mutex(&self, key: PfsKey, name: &'static str) -> Option<ProbeId>;

    /// Deregisters a mutex previously returned by `init_mutex`.
    fn destroy_mutex(&self, probe: ProbeId);

    /// Opens a wait span. `None` suppresses the matching `end_wait`.
    fn start_wait(
        &self,
        probe: ProbeId,
        op: LockOp,
        file: &'static str,
        line: u32,
    ) -> Option<WaitToken>;

    /// Closes a wait span. `rc` is 0 for success, 1 for a failed trylock.
    fn end_wait(&self, token: WaitToken, rc: i32);

    /// Records a release of a registered mutex.
    fn unlock(&self, probe: ProbeId);
}

static PROBE: OnceLock<&'static dyn MutexProbe> = OnceLock::new();

/// Installs the process-global probe. Returns `false` if one was already
/// installed (the first install wins).
pub fn install(probe: &'static dyn MutexProbe) -> bool {
    PROBE.set(probe).is_ok()
}

/// Returns the installed probe, if any.
#[must_use]
pub fn probe() -> Option<&'static dyn MutexProbe> {
    PROBE.get().copied()
}

/// A probe that counts events, for tests and smoke diagnostics.
#[derive(Debug, Default)]
pub struct CountingProbe {
    next_id: AtomicU64,
    inits: AtomicU64,
    destroys: AtomicU64,
    lock_waits: AtomicU64,
    trylock_waits: AtomicU64,
    ended: AtomicU64,
    failed: AtomicU64,
    unlocks: AtomicU64,
}

/// Snapshot of a [`CountingProbe`]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeStats {
    /// Mutexes registered.
    pub inits: u64,
    /// Mutexes deregistered.
    pub destroys: u64,
    /// Wait spans opened for blocking locks.
    pub lock_waits: u64,
    /// Wait spans opened for trylocks.
    pub trylock_waits: u64,
    /// Wait spans closed.
    pub ended: u64,
    /// Wait spans closed with a failure code.
    pub failed: u64,
    /// Releases recorded.
    pub unlocks: u64,
}

impl CountingProbe {
    /// Creates a probe with all counters at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inits: AtomicU64::new(0),
            destroys: AtomicU64::new(0),
            lock_waits: AtomicU64::new(0),
            trylock_waits: AtomicU64::new(0),
            ended: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            unlocks: AtomicU64::new(0),
        }
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn stats(&self) -> ProbeStats {
        ProbeStats {
            inits: self.inits.load(Ordering::Relaxed),
            destroys: self.destroys.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
            trylock_waits: self.trylock_waits.load(Ordering::Relaxed),
            ended: self.ended.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unlocks: self.unlocks.load(Ordering::Relaxed),
        }
    }
}

impl MutexProbe for CountingProbe {
    fn init_mutex(&self, _key: PfsKey, _name: &'static str) -> Option<ProbeId> {
        self.inits.fetch_add(1, Ordering::Relaxed);
        Some(ProbeId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    fn destroy_mutex(&self, _probe: ProbeId) {
        self.destroys.fetch_add(1, Ordering::Relaxed);
    }

    fn start_wait(
        &self,
        probe: ProbeId,
        op: LockOp,
        _file: &'static str,
        _line: u32,
    ) -> Option<WaitToken> {
        match op {
            LockOp::Lock => self.lock_waits.fetch_add(1, Ordering::Relaxed),
            LockOp::TryLock => self.trylock_waits.fetch_add(1, Ordering::Relaxed),
        };
        Some(WaitToken(probe.0))
    }

    fn end_wait(&self, _token: WaitToken, rc: i32) {
        self.ended.fetch_add(1, Ordering::Relaxed);
        if rc != 0 {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn unlock(&self, _probe: ProbeId) {
        self.unlocks.fetch_add(1, Ordering::Relaxed);
    }
}
