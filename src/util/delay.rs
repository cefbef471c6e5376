//! Bounded, randomized busy-wait used between lock attempts.
//!
//! The delay primitive pauses the CPU for a uniformly-chosen number of
//! delay units in `[0, max_delay]`. Each unit is a short burst of the
//! architecture's pause hint. There is no suspension and no syscall, so
//! it is safe to call from the hottest spin loops.

use std::cell::RefCell;

use crate::util::det_rng::DetRng;

/// Pause-hint iterations per delay unit. Chosen so that one unit is long
/// enough to let a sibling hyperthread make progress but far shorter than
/// a scheduler quantum.
const PAUSE_ROUNDS: u32 = 50;

/// Seed mix for the per-thread jitter generator.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

thread_local! {
    static DELAY_RNG: RefCell<DetRng> =
        RefCell::new(DetRng::new(SEED_MIX ^ crate::util::current_thread_id()));
}

/// Returns a pseudo-random value in `[low, high]` from the calling
/// thread's jitter generator.
#[inline]
pub fn rand_interval(low: u32, high: u32) -> u32 {
    DELAY_RNG.with(|rng| rng.borrow_mut().next_interval(low, high))
}

/// Busy-waits for a uniformly-chosen number of delay units in
/// `[0, max_delay]`.
#[inline]
pub fn random_delay(max_delay: u32) {
    busy_pause(rand_interval(0, max_delay));
}

/// Busy-waits for exactly `units` delay units.
#[inline]
pub fn busy_pause(units: u32) {
    for _ in 0..units.saturating_mul(PAUSE_ROUNDS) {
        std::hint::spin_loop();
    }
}
