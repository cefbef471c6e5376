//! TTAS mutex that parks on an event through the engine wait-array.
//!
//! The portable contended variant: used where futexes are unavailable, or
//! where the engine wants every parked thread visible in the wait-array
//! diagnostics. The lock word is binary and acquired with an atomic swap;
//! a separate waiter flag advises the release path that somebody may be
//! parked. The flag is advisory in one direction only: spurious wakes are
//! fine, missed wakes are not.
//!
//! # Ordering
//!
//! Two fences carry the wake handshake. On release, the store that frees
//! the lock word must be ordered before the waiter-flag read; on the park
//! side, the flag store must be ordered before the lock word re-read.
//! Both sides use a `SeqCst` fence between their store and their load, so
//! at least one of the two threads is guaranteed to see the other's
//! store. The wait-array's rescue sweep stays in place as a backstop and
//! bounds the damage of any wake that slips through anyway.

use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Arc;

use crate::event::Event;
use crate::latch::{self, LatchId};
use crate::mutex::{MutexImpl, MutexPolicy, LOCKED, UNLOCKED};
use crate::util::delay;
use crate::wait::wait_array;

/// Final blind retries granted to a thread that has already reserved a
/// wait-array cell before it commits to parking. A heuristic frozen long
/// ago; re-tune only with measurements.
const WAIT_RETRIES: u32 = 4;

/// Shared state of one event mutex: the lock word, the waiter flag, and
/// the event waiters park on.
///
/// Allocated at `init` (this is the variant's "OS resource") and shared
/// with the wait-array through the cells of parked threads, which is what
/// lets the rescue sweep examine the lock word of a latch it does not own.
#[derive(Debug)]
pub(crate) struct EventCore {
    lock_word: AtomicU32,
    /// 0 or 1. 1 if there are (or may be) threads parked in the
    /// wait-array for this mutex.
    waiters: AtomicU32,
    event: Event,
}

impl EventCore {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            lock_word: AtomicU32::new(UNLOCKED),
            waiters: AtomicU32::new(0),
            event: Event::new(name),
        }
    }

    /// Whether some thread currently holds the mutex. Advisory only.
    pub(crate) fn is_locked(&self) -> bool {
        self.lock_word.load(Ordering::Relaxed) != UNLOCKED
    }

    pub(crate) fn event(&self) -> &Event {
        &self.event
    }

    /// Acquire by test-and-set. The swap orders the critical section
    /// against the previous holder's release.
    pub(crate) fn tas_lock(&self) -> bool {
        self.lock_word.swap(LOCKED, Ordering::Acquire) == UNLOCKED
    }

    pub(crate) fn tas_unlock(&self) {
        let prev = self.lock_word.swap(UNLOCKED, Ordering::Release);
        debug_assert_eq!(prev, LOCKED);
    }

    /// Announces that the calling thread may park. The fence orders the
    /// flag store before the caller's subsequent lock-word re-read.
    fn set_waiters(&self) {
        self.waiters.store(1, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    fn clear_waiters(&self) {
        self.waiters.store(0, Ordering::Release);
    }

    fn waiters(&self) -> u32 {
        self.waiters.load(Ordering::Relaxed)
    }

    /// Wakes every thread parked on this mutex's event.
    fn signal(&self) {
        self.clear_waiters();
        self.event.set();
    }
}

/// TTAS mutex that parks on an [`Event`] via the wait-array.
#[derive(Debug, Default)]
pub struct TtasEventMutex<P: MutexPolicy> {
    /// `None` until `init`; instances may live in zeroed global storage.
    core: Option<Arc<EventCore>>,
    id: LatchId,
    policy: P,
}

impl<P: MutexPolicy> TtasEventMutex<P> {
    #[inline]
    fn core(&self) -> &Arc<EventCore> {
        self.core.as_ref().expect("latch used before init")
    }

    /// Whether some thread currently holds the mutex. Advisory only.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.core().is_locked()
    }

    /// The current value of the waiter flag, for diagnostics.
    #[must_use]
    pub fn waiters(&self) -> u32 {
        self.core().waiters()
    }

    /// Spins reading the lock word (no write traffic) until it looks free
    /// or the budget runs out. `n_spins` accumulates across calls within
    /// one acquisition.
    fn is_free(&self, max_spins: u32, max_delay: u32, n_spins: &mut u32) -> bool {
        debug_assert!(*n_spins <= max_spins);
        let core = self.core();

        loop {
            if !core.is_locked() {
                return true;
            }
            delay::random_delay(max_delay);
            *n_spins += 1;
            if *n_spins >= max_spins {
                return false;
            }
        }
    }

    /// Parks in the wait-array. Returns `true` if the latch was acquired
    /// during the pre-park retries, `false` after an actual park (the
    /// caller re-enters its outer loop).
    fn wait(&self, file: &'static str, line: u32, spin: u32) -> bool {
        let core = self.core();

        // Reserve first: the cell snapshots the event generation, so a
        // release that lands between here and the park is never lost.
        let slot = wait_array().reserve(core, self.id, file, line);
        core.set_waiters();

        for _ in 0..spin {
            if core.tas_lock() {
                wait_array().free(slot);
                return true;
            }
        }

        wait_array().wait(slot);
        false
    }

    /// The contended path: spin, then yield, then park, growing the spin
    /// budget each round.
    fn spin_and_try_lock(&self, max_spins: u32, max_delay: u32, file: &'static str, line: u32) {
        let step = max_spins;
        let mut max_spins = max_spins;
        let mut n_spins = 0;
        let mut n_waits = 0;

        fence(Ordering::Acquire);

        loop {
            // If the lock looks free, race for it with a real swap.
            if self.is_free(max_spins, max_delay, &mut n_spins) {
                if self.core().tas_lock() {
                    break;
                }
                // Lost the race; the word just changed, spin again.
                continue;
            }
            max_spins = n_spins + step;

            n_waits += 1;
            std::thread::yield_now();

            if self.wait(file, line, WAIT_RETRIES) {
                n_spins += WAIT_RETRIES;
                break;
            }
        }

        self.policy.add(n_spins, n_waits);
    }
}

impl<P: MutexPolicy> Drop for TtasEventMutex<P> {
    fn drop(&mut self) {
        // The event itself must have been freed by an explicit destroy
        // before the owning subsystem shut down; the destructor only
        // checks the latch is not held.
        if let Some(core) = &self.core {
            assert!(!core.is_locked());
        }
    }
}

impl<P: MutexPolicy> MutexImpl for TtasEventMutex<P> {
    type Policy = P;

    fn init(&mut self, id: LatchId, _file: &'static str, _line: u32) {
        assert!(self.core.is_none(), "event latch initialized twice");
        self.id = id;
        self.core = Some(Arc::new(EventCore::new(latch::name(id))));
    }

    fn destroy(&mut self) {
        let core = self.core.take().expect("event latch destroyed before init");
        assert!(!core.is_locked());
        debug_assert_eq!(core.waiters(), 0, "latch destroyed with parked waiters");
    }

    fn enter(&self, max_spins: u32, max_delay: u32, file: &'static str, line: u32) {
        if !self.try_lock() {
            self.spin_and_try_lock(max_spins, max_delay, file, line);
        }
    }

    fn try_lock(&self) -> bool {
        self.core().tas_lock()
    }

    fn exit(&self) {
        let core = self.core();
        core.tas_unlock();

        // The release store must be ordered before the waiter-flag read;
        // without this fence a speculative early read could strand a
        // parked thread until the rescue sweep finds it.
        fence(Ordering::SeqCst);

        if core.waiters() != 0 {
            core.signal();
        }
    }

    fn policy(&self) -> &P {
        &self.policy
    }

    fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }
}
