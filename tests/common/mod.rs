//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU16, Ordering};

use latchsync::latch::{self, LatchId, PfsKey};
use latchsync::mutex::{MutexImpl, PolicyMutex};

/// Initializes test logging. Call first in every test.
pub fn init() {
    latchsync::test_utils::init_test_logging();
}

/// Hands out process-unique latch ids for tests, registered with a
/// recognizable name.
pub fn next_latch_id() -> LatchId {
    static NEXT: AtomicU16 = AtomicU16::new(1_000);
    let raw = NEXT.fetch_add(1, Ordering::Relaxed);
    let id = LatchId::new(raw);
    latch::register(id, "test_latch", PfsKey(u32::from(raw)));
    id
}

/// Builds an initialized facade over the given implementation.
pub fn new_latch<M: MutexImpl>() -> PolicyMutex<M> {
    let mut latch = PolicyMutex::default();
    latch.init(next_latch_id(), file!(), line!());
    latch
}

/// A value that is only touched while its owner holds a latch.
///
/// Deliberately non-atomic: if mutual exclusion is broken, the data race
/// shows up as lost updates or a tripped section flag rather than being
/// papered over by atomic accesses.
pub struct SharedCell<T> {
    value: UnsafeCell<T>,
}

// Safety: exclusion is provided by the latch the tests pair this with.
unsafe impl<T: Send> Sync for SharedCell<T> {}

impl<T> SharedCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    /// Runs `f` with a mutable view of the value.
    ///
    /// # Safety
    ///
    /// The caller must hold the latch guarding this cell.
    pub unsafe fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.value.get())
    }
}
