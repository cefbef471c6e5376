//! One-shot wakeable event used to park and wake latch waiters.
//!
//! An [`Event`] is a boolean flag plus a signal-generation counter behind
//! an internal lock. The generation counter is what makes the park
//! protocol lose-proof: a waiter captures the generation with [`Event::reset`]
//! *before* publishing itself as a waiter, and [`Event::wait`] returns
//! immediately if any [`Event::set`] happened since that capture, even if
//! the set raced ahead of the actual park.
//!
//! `set` wakes every parked thread. Waking more threads than strictly
//! necessary is fine; the losers re-run their acquisition loop.

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct EventState {
    is_set: bool,
    sig_count: u64,
}

/// A one-shot wakeable event with a signal-generation counter.
#[derive(Debug)]
pub struct Event {
    name: &'static str,
    state: Mutex<EventState>,
    cond: Condvar,
}

impl Event {
    /// Creates an event in the unset state. `name` is the owning latch's
    /// display name, carried for diagnostics only.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(EventState {
                is_set: false,
                sig_count: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Returns the diagnostics name this event was created with.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Sets the event and wakes every thread parked in [`Event::wait`].
    ///
    /// The generation advances only on the unset-to-set edge, so repeated
    /// sets coalesce.
    pub fn set(&self) {
        let mut state = self.state.lock();
        if !state.is_set {
            state.is_set = true;
            state.sig_count += 1;
        }
        drop(state);
        self.cond.notify_all();
    }

    /// Clears the event and returns the current signal generation.
    ///
    /// The returned generation must be captured before the caller
    /// advertises itself as a waiter; passing it to [`Event::wait`] closes
    /// the reset-to-park race window.
    pub fn reset(&self) -> u64 {
        let mut state = self.state.lock();
        state.is_set = false;
        state.sig_count
    }

    /// Blocks the calling thread until the event is set or the signal
    /// generation has advanced past `sig_gen`.
    pub fn wait(&self, sig_gen: u64) {
        let mut state = self.state.lock();
        while !state.is_set && state.sig_count == sig_gen {
            self.cond.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn wait_returns_after_set() {
        let event = Arc::new(Event::new("test_event"));
        let gen = event.reset();

        let waiter = {
            let event = Arc::clone(&event);
            std::thread::spawn(move || event.wait(gen))
        };

        std::thread::sleep(Duration::from_millis(20));
        event.set();
        waiter.join().expect("waiter panicked");
    }

    #[test]
    fn set_before_park_is_not_lost() {
        let event = Event::new("test_event");
        let gen = event.reset();
        // The set lands between reset and wait; the generation bump makes
        // the wait a no-op instead of a hang.
        event.set();
        event.wait(gen);
    }

    #[test]
    fn stale_generation_returns_immediately() {
        let event = Event::new("test_event");
        let gen = event.reset();
        event.set();
        let _ = event.reset();
        // Even though the event is unset again, `gen` is stale.
        event.wait(gen);
    }

    #[test]
    fn repeated_sets_coalesce() {
        let event = Event::new("test_event");
        let before = event.reset();
        event.set();
        event.set();
        event.set();
        assert_eq!(event.reset(), before + 1);
    }

    #[test]
    fn wakes_all_parked_threads() {
        let event = Arc::new(Event::new("test_event"));
        let gen = event.reset();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let event = Arc::clone(&event);
                std::thread::spawn(move || event.wait(gen))
            })
            .collect();

        std::thread::sleep(Duration::from_millis(20));
        event.set();
        for waiter in waiters {
            waiter.join().expect("waiter panicked");
        }
    }
}
