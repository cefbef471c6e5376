//! Provided mutex policies.
//!
//! [`NoPolicy`] is the zero-cost choice for latches nobody monitors.
//! [`TrackPolicy`] records contention counters and the owning thread,
//! which is what backs `is_owned` debug assertions and the contention
//! reports the engine exports.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::latch::LatchId;
use crate::mutex::MutexPolicy;
use crate::util::current_thread_id;

/// A policy that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPolicy;

impl MutexPolicy for NoPolicy {
    fn init(&mut self, _id: LatchId, _file: &'static str, _line: u32) {}

    fn destroy(&mut self) {}

    fn enter(&self, _file: &'static str, _line: u32) {}

    fn locked(&self, _file: &'static str, _line: u32) {}

    fn release(&self) {}

    fn add(&self, _n_spins: u32, _n_waits: u32) {}

    /// Ownership is not tracked; always `true` so that
    /// `debug_assert!(latch.is_owned())` call sites stay vacuous.
    fn is_owned(&self) -> bool {
        true
    }
}

/// Snapshot of a [`TrackPolicy`]'s contention counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatchStats {
    /// Contended acquisitions recorded via `add`.
    pub calls: u64,
    /// Total spin rounds across those acquisitions.
    pub spins: u64,
    /// Total yields/parks across those acquisitions.
    pub waits: u64,
}

/// A policy that tracks contention cost and the owning thread.
///
/// Counters are relaxed atomics: `add` runs on the acquiring thread right
/// after the acquisition it describes, so the numbers are exact per
/// acquisition and merely unordered across threads, which is all a
/// monitoring report needs.
#[derive(Debug, Default)]
pub struct TrackPolicy {
    id: LatchId,
    file: &'static str,
    line: u32,
    calls: AtomicU64,
    spins: AtomicU64,
    waits: AtomicU64,
    /// Thread id of the current holder, 0 when unheld.
    owner: AtomicU64,
}

impl TrackPolicy {
    /// Returns the latch id this policy was bound to at `init`.
    #[must_use]
    pub fn id(&self) -> LatchId {
        self.id
    }

    /// Returns the source location the mutex was initialized from.
    #[must_use]
    pub fn created_at(&self) -> (&'static str, u32) {
        (self.file, self.line)
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn stats(&self) -> LatchStats {
        LatchStats {
            calls: self.calls.load(Ordering::Relaxed),
            spins: self.spins.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
        }
    }
}

impl MutexPolicy for TrackPolicy {
    fn init(&mut self, id: LatchId, file: &'static str, line: u32) {
        self.id = id;
        self.file = file;
        self.line = line;
    }

    fn destroy(&mut self) {
        // Counters are left readable; the owner word must be clear.
        debug_assert_eq!(self.owner.load(Ordering::Relaxed), 0);
    }

    fn enter(&self, file: &'static str, line: u32) {
        // The one ordering check this policy affords: recursion.
        debug_assert!(
            self.owner.load(Ordering::Relaxed) != current_thread_id(),
            "recursive acquisition of latch {} at {}:{}",
            crate::latch::name(self.id),
            file,
            line,
        );
    }

    fn locked(&self, _file: &'static str, _line: u32) {
        self.owner.store(current_thread_id(), Ordering::Relaxed);
    }

    fn release(&self) {
        debug_assert!(
            self.owner.load(Ordering::Relaxed) == current_thread_id(),
            "latch {} released by a thread that does not hold it",
            crate::latch::name(self.id),
        );
        self.owner.store(0, Ordering::Relaxed);
    }

    fn add(&self, n_spins: u32, n_waits: u32) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.spins.fetch_add(u64::from(n_spins), Ordering::Relaxed);
        self.waits.fetch_add(u64::from(n_waits), Ordering::Relaxed);
    }

    fn is_owned(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == current_thread_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_policy_records_init_site() {
        let mut policy = TrackPolicy::default();
        policy.init(LatchId::new(7), "policy.rs", 42);
        assert_eq!(policy.id(), LatchId::new(7));
        assert_eq!(policy.created_at(), ("policy.rs", 42));
    }

    #[test]
    fn add_accumulates_counters() {
        let policy = TrackPolicy::default();
        policy.add(10, 1);
        policy.add(5, 0);
        assert_eq!(
            policy.stats(),
            LatchStats {
                calls: 2,
                spins: 15,
                waits: 1,
            }
        );
    }

    #[test]
    fn ownership_follows_locked_and_release() {
        let policy = TrackPolicy::default();
        assert!(!policy.is_owned());

        policy.enter("policy.rs", 1);
        policy.locked("policy.rs", 1);
        assert!(policy.is_owned());

        policy.release();
        assert!(!policy.is_owned());
    }

    #[test]
    fn ownership_is_per_thread() {
        let policy = std::sync::Arc::new(TrackPolicy::default());
        policy.locked("policy.rs", 1);

        let other = {
            let policy = std::sync::Arc::clone(&policy);
            std::thread::spawn(move || policy.is_owned())
        };
        assert!(!other.join().expect("thread panicked"));
        assert!(policy.is_owned());

        policy.release();
    }

    #[test]
    fn no_policy_is_vacuously_owned() {
        assert!(NoPolicy.is_owned());
    }
}
