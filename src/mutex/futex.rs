//! TTAS mutex that parks on a Linux futex under contention.
//!
//! The lock word carries three states: `UNLOCKED`, `LOCKED`, and
//! `WAITERS` (held, with possibly-parked threads). The contended path
//! swaps the word to `WAITERS` before parking; observing `UNLOCKED` in
//! that swap means the lock just changed hands to us. The release path
//! swaps rather than stores so a parking thread's transition can never be
//! missed: whoever sees `WAITERS` in the release swap owns the wake.
//!
//! The spin budget is deliberately fixed (it does not grow the way the
//! spin and event variants grow theirs): once the budget is spent a futex
//! wait is cheap enough that more spinning does not pay.
//!
//! The lock is unfair. A fresh spinner can grab the word before a woken
//! waiter gets scheduled; the waiter re-swaps to `WAITERS` and parks
//! again. That barging is what keeps throughput up.

use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::latch::LatchId;
use crate::mutex::{MutexImpl, MutexPolicy, LOCKED, UNLOCKED, WAITERS};
use crate::util::delay;

/// TTAS mutex with a futex-backed park path.
#[derive(Debug, Default)]
pub struct TtasFutexMutex<P: MutexPolicy> {
    lock_word: AtomicU32,
    policy: P,
}

impl<P: MutexPolicy> TtasFutexMutex<P> {
    /// Whether some thread currently holds the mutex. Advisory only.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock_word.load(Ordering::Relaxed) != UNLOCKED
    }

    /// Parks until the word leaves `WAITERS`. Spurious returns (EINTR,
    /// EAGAIN on a raced word change) are handled by the caller's loop.
    fn futex_wait(&self) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.lock_word.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                WAITERS,
                ptr::null::<libc::timespec>(),
                ptr::null::<u32>(),
                0u32,
            );
        }
    }

    /// Wakes at most one thread parked on the lock word.
    fn futex_wake_one(&self) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.lock_word.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1u32,
                ptr::null::<libc::timespec>(),
                ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl<P: MutexPolicy> Drop for TtasFutexMutex<P> {
    fn drop(&mut self) {
        assert_eq!(*self.lock_word.get_mut(), UNLOCKED);
    }
}

impl<P: MutexPolicy> MutexImpl for TtasFutexMutex<P> {
    type Policy = P;

    fn init(&mut self, _id: LatchId, _file: &'static str, _line: u32) {
        // The futex word must be naturally aligned.
        debug_assert_eq!(self.lock_word.as_ptr() as usize % 4, 0);
        assert_eq!(*self.lock_word.get_mut(), UNLOCKED);
    }

    fn destroy(&mut self) {
        // The destructor can run at shutdown; nothing to free here.
        assert_eq!(*self.lock_word.get_mut(), UNLOCKED);
    }

    fn enter(&self, max_spins: u32, max_delay: u32, _file: &'static str, _line: u32) {
        let mut n_spins = 0;
        while n_spins < max_spins {
            if self.try_lock() {
                self.policy.add(n_spins, 0);
                return;
            }
            delay::random_delay(max_delay);
            n_spins += 1;
        }

        let mut n_waits = 0;
        loop {
            // Announce (possible) waiters while probing. Seeing UNLOCKED
            // here means the swap itself acquired the lock; the word now
            // reads WAITERS, which at worst buys the next release a spare
            // wake.
            if self.lock_word.swap(WAITERS, Ordering::Acquire) == UNLOCKED {
                break;
            }
            self.futex_wait();
            n_waits += 1;
        }

        self.policy.add(n_spins, n_waits);
    }

    fn try_lock(&self) -> bool {
        self.lock_word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn exit(&self) {
        // A swap, not a store: a thread moving LOCKED to WAITERS right now
        // must either see our release or be seen by it.
        if self.lock_word.swap(UNLOCKED, Ordering::Release) == WAITERS {
            self.futex_wake_one();
        }
    }

    fn policy(&self) -> &P {
        &self.policy
    }

    fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::{NoPolicy, TrackPolicy};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn try_lock_then_exit() {
        let mut mutex = TtasFutexMutex::<NoPolicy>::default();
        mutex.init(LatchId::new(1), file!(), line!());

        assert!(mutex.try_lock());
        assert!(!mutex.try_lock());
        mutex.exit();
        assert!(mutex.try_lock());
        mutex.exit();

        mutex.destroy();
    }

    #[test]
    fn parked_waiter_is_woken_on_exit() {
        let mutex = Arc::new(TtasFutexMutex::<TrackPolicy>::default());
        assert!(mutex.try_lock());

        let waiter = {
            let mutex = Arc::clone(&mutex);
            std::thread::spawn(move || {
                let start = Instant::now();
                // Zero spin budget forces the park path immediately.
                mutex.enter(0, 0, file!(), line!());
                mutex.exit();
                start.elapsed()
            })
        };

        std::thread::sleep(Duration::from_millis(200));
        mutex.exit();
        let waited = waiter.join().expect("waiter panicked");

        assert!(
            waited < Duration::from_secs(2),
            "woken far too late: {waited:?}",
        );
        let stats = mutex.policy().stats();
        assert_eq!(stats.calls, 1);
        assert!(stats.waits >= 1, "waiter should have parked");
    }

    #[test]
    fn spin_phase_acquires_without_parking() {
        let mutex = Arc::new(TtasFutexMutex::<TrackPolicy>::default());
        assert!(mutex.try_lock());

        let contender = {
            let mutex = Arc::clone(&mutex);
            std::thread::spawn(move || mutex.enter(u32::MAX, 1, file!(), line!()))
        };

        std::thread::sleep(Duration::from_millis(10));
        mutex.exit();
        contender.join().expect("contender panicked");

        let stats = mutex.policy().stats();
        assert_eq!(stats.waits, 0, "generous spin budget should avoid the park");
        mutex.exit();
    }

    #[test]
    #[should_panic]
    fn destroy_while_held_trips() {
        let mutex: &mut TtasFutexMutex<NoPolicy> =
            Box::leak(Box::new(TtasFutexMutex::default()));
        assert!(mutex.try_lock());
        mutex.destroy();
    }
}
