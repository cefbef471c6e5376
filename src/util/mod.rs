//! Small utilities shared across the latch core.

pub mod delay;
pub mod det_rng;

use std::sync::atomic::{AtomicU64, Ordering};

/// Next value handed out by [`current_thread_id`]. Id 0 is reserved for
/// "no thread" so owner words can be zero-initialized.
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Returns a small, process-unique id for the calling thread.
///
/// Ids are dense, start at 1, and never repeat within a process. They are
/// cheaper to store in an atomic owner word than `std::thread::ThreadId`.
#[must_use]
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}
