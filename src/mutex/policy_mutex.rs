//! The instrumented facade every engine latch goes through.
//!
//! [`PolicyMutex`] is generic over the implementation, fixed at
//! construction; there is no runtime dispatch on the lock path. Each
//! operation weaves three layers in a fixed order: the instrumentation
//! probe span, the policy hooks, and the implementation itself. The
//! facade adds no synchronization of its own; all happens-before is
//! carried by the implementation.

use std::panic::Location;

use crate::config;
use crate::instr::{self, LockOp, ProbeId, WaitToken};
use crate::latch::{self, LatchId};
use crate::mutex::{MutexImpl, MutexPolicy};

/// Policy-threading, probe-reporting wrapper around a mutex
/// implementation.
#[derive(Debug, Default)]
pub struct PolicyMutex<M: MutexImpl> {
    imp: M,
    probe: Option<ProbeId>,
}

impl<M: MutexImpl> PolicyMutex<M> {
    /// Registers with the instrumentation probe, initializes the
    /// implementation, then the policy.
    pub fn init(&mut self, id: LatchId, file: &'static str, line: u32) {
        debug_assert!(self.probe.is_none(), "latch initialized twice");

        self.probe = instr::probe()
            .and_then(|probe| probe.init_mutex(latch::pfs_key(id), latch::name(id)));
        self.imp.init(id, file, line);
        self.imp.policy_mut().init(id, file, line);
    }

    /// Deregisters instrumentation, destroys the implementation, then the
    /// policy.
    pub fn destroy(&mut self) {
        if let (Some(probe), Some(id)) = (instr::probe(), self.probe.take()) {
            probe.destroy_mutex(id);
        }
        self.imp.destroy();
        self.imp.policy_mut().destroy();
    }

    /// Acquires the mutex, blocking if necessary.
    pub fn enter(&self, max_spins: u32, max_delay: u32, file: &'static str, line: u32) {
        let token = self.begin_wait(LockOp::Lock, file, line);

        self.imp.policy().enter(file, line);
        self.imp.enter(max_spins, max_delay, file, line);
        self.imp.policy().locked(file, line);

        self.end_wait(token, 0);
    }

    /// Attempts to acquire without blocking. Returns `true` on success.
    ///
    /// The policy hooks run only after the lock is held: a failed trylock
    /// must not be recorded as an ordering event.
    pub fn try_lock(&self, file: &'static str, line: u32) -> bool {
        let token = self.begin_wait(LockOp::TryLock, file, line);

        let locked = self.imp.try_lock();
        if locked {
            self.imp.policy().enter(file, line);
            self.imp.policy().locked(file, line);
        }

        self.end_wait(token, i32::from(!locked));
        locked
    }

    /// Releases the mutex. The caller must hold it.
    pub fn exit(&self) {
        if let (Some(probe), Some(id)) = (instr::probe(), self.probe) {
            probe.unlock(id);
        }
        self.imp.policy().release();
        self.imp.exit();
    }

    /// Acquires using the process-global spin tuning and the caller's
    /// source location.
    #[track_caller]
    pub fn lock(&self) {
        let caller = Location::caller();
        let tuning = config::current();
        self.enter(
            tuning.spin_wait_rounds,
            tuning.spin_wait_delay,
            caller.file(),
            caller.line(),
        );
    }

    /// [`Self::try_lock`] with the caller's source location.
    #[track_caller]
    pub fn try_lock_here(&self) -> bool {
        let caller = Location::caller();
        self.try_lock(caller.file(), caller.line())
    }

    /// Acquires and returns a guard that releases on drop.
    #[track_caller]
    pub fn lock_guard(&self) -> LatchGuard<'_, M> {
        self.lock();
        LatchGuard { latch: self }
    }

    /// Whether the calling thread holds the mutex, as far as the policy
    /// can tell. Intended for debug assertions.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.imp.policy().is_owned()
    }

    /// Read-only view of the policy.
    pub fn policy(&self) -> &M::Policy {
        self.imp.policy()
    }

    /// Exclusive view of the policy.
    pub fn policy_mut(&mut self) -> &mut M::Policy {
        self.imp.policy_mut()
    }

    fn begin_wait(&self, op: LockOp, file: &'static str, line: u32) -> Option<WaitToken> {
        let probe = instr::probe()?;
        let id = self.probe?;
        probe.start_wait(id, op, file, line)
    }

    fn end_wait(&self, token: Option<WaitToken>, rc: i32) {
        if let (Some(probe), Some(token)) = (instr::probe(), token) {
            probe.end_wait(token, rc);
        }
    }
}

/// RAII guard returned by [`PolicyMutex::lock_guard`].
#[derive(Debug)]
pub struct LatchGuard<'a, M: MutexImpl> {
    latch: &'a PolicyMutex<M>,
}

impl<M: MutexImpl> Drop for LatchGuard<'_, M> {
    fn drop(&mut self) {
        self.latch.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::CountingProbe;
    use crate::mutex::{EventLatch, SpinLatch};
    use std::sync::Arc;

    // The process-global probe can only be installed once per test
    // binary; this module owns that install.
    static PROBE: CountingProbe = CountingProbe::new();

    fn install_probe() -> &'static CountingProbe {
        instr::install(&PROBE);
        &PROBE
    }

    #[test]
    fn facade_reports_probe_spans() {
        let probe = install_probe();
        let before = probe.stats();

        let mut latch = SpinLatch::default();
        latch.init(LatchId::new(11), file!(), line!());

        latch.enter(4, 2, file!(), line!());
        assert!(!latch.try_lock(file!(), line!()));
        latch.exit();
        assert!(latch.try_lock(file!(), line!()));
        latch.exit();
        latch.destroy();

        let after = probe.stats();
        assert!(after.inits > before.inits);
        assert!(after.destroys > before.destroys);
        assert!(after.lock_waits > before.lock_waits);
        assert!(after.trylock_waits >= before.trylock_waits + 2);
        assert!(after.failed > before.failed);
        assert!(after.unlocks >= before.unlocks + 2);
    }

    #[test]
    fn trylock_failure_skips_policy_hooks() {
        let mut latch = SpinLatch::default();
        latch.init(LatchId::new(12), file!(), line!());

        latch.enter(4, 2, file!(), line!());
        assert!(latch.is_owned());

        // A failed trylock from another thread must leave its ownership
        // view untouched.
        std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    assert!(!latch.try_lock(file!(), line!()));
                    assert!(!latch.is_owned());
                })
                .join()
                .expect("thread panicked");
        });

        latch.exit();
        assert!(!latch.is_owned());
        latch.destroy();
    }

    #[test]
    fn guard_releases_on_drop() {
        let mut latch = EventLatch::default();
        latch.init(LatchId::new(13), file!(), line!());

        {
            let _guard = latch.lock_guard();
            assert!(latch.is_owned());
        }
        assert!(!latch.is_owned());
        assert!(latch.try_lock_here());
        latch.exit();

        latch.destroy();
    }

    #[test]
    fn lock_uses_global_tuning() {
        let latch = Arc::new({
            let mut latch = SpinLatch::default();
            latch.init(LatchId::new(14), file!(), line!());
            latch
        });

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let latch = Arc::clone(&latch);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        latch.lock();
                        latch.exit();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }

        // 4 threads x 1000 acquisitions, all released.
        assert!(!latch.is_owned());
    }
}
