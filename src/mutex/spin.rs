//! Pure spin-yield TTAS mutex.
//!
//! Acquisition never parks and never issues a syscall beyond the
//! scheduler yield: under short contention the lock changes hands in a
//! handful of pause cycles, under long contention the spinner keeps
//! handing its quantum back. The spin budget grows by its initial value
//! after every yield, so a thread that keeps losing spins longer and
//! longer between yields instead of hammering the scheduler.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::latch::LatchId;
use crate::mutex::{MutexImpl, MutexPolicy, LOCKED, UNLOCKED};
use crate::util::delay;

/// Test-and-test-and-set mutex with a growing spin budget.
#[derive(Debug, Default)]
pub struct TtasMutex<P: MutexPolicy> {
    lock_word: AtomicU32,
    policy: P,
}

impl<P: MutexPolicy> TtasMutex<P> {
    /// Whether some thread currently holds the mutex. Advisory only.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock_word.load(Ordering::Relaxed) != UNLOCKED
    }
}

impl<P: MutexPolicy> Drop for TtasMutex<P> {
    fn drop(&mut self) {
        assert_eq!(*self.lock_word.get_mut(), UNLOCKED);
    }
}

impl<P: MutexPolicy> MutexImpl for TtasMutex<P> {
    type Policy = P;

    fn init(&mut self, _id: LatchId, _file: &'static str, _line: u32) {
        assert_eq!(*self.lock_word.get_mut(), UNLOCKED);
    }

    fn destroy(&mut self) {
        // The destructor can run at shutdown; nothing to free here.
        assert_eq!(*self.lock_word.get_mut(), UNLOCKED);
    }

    fn enter(&self, max_spins: u32, max_delay: u32, _file: &'static str, _line: u32) {
        let step = max_spins;
        let mut max_spins = max_spins;
        let mut n_spins = 0;

        while !self.try_lock() {
            delay::random_delay(max_delay);
            n_spins += 1;
            if n_spins == max_spins {
                std::thread::yield_now();
                max_spins += step;
            }
        }

        self.policy.add(n_spins, 0);
    }

    fn try_lock(&self) -> bool {
        self.lock_word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn exit(&self) {
        debug_assert_eq!(self.lock_word.load(Ordering::Relaxed), LOCKED);
        self.lock_word.store(UNLOCKED, Ordering::Release);
    }

    fn policy(&self) -> &P {
        &self.policy
    }

    fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }
}
