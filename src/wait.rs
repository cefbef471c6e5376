//! Engine-global wait-array for event-backed latches.
//!
//! Threads that give up spinning on a [`crate::mutex::TtasEventMutex`]
//! park here: they reserve a cell (which snapshots the latch event's
//! signal generation), advertise themselves through the latch's waiter
//! flag, and finally block on the event. The array exists for two
//! reasons beyond the park itself:
//!
//! - **Rescue sweeps.** On weakly-ordered hardware the unlock path of an
//!   event latch can in principle miss a freshly-arrived waiter. The
//!   engine's master timer periodically calls [`WaitArray::wake_if_free`],
//!   which wakes every cell whose latch is currently unlocked. This bounds
//!   the worst-case wake latency to the sweep interval.
//! - **Diagnostics.** Each cell records which latch is being waited on and
//!   from where; a cell that stays parked past the configured horizon is
//!   reported once as a long latch wait.
//!
//! Cells are slab-allocated with a free-list so churn from short parks
//! never grows the table.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::config;
use crate::latch::{self, LatchId};
use crate::mutex::event_mutex::EventCore;

/// Handle to a reserved wait cell. Consumed by [`WaitArray::wait`] or
/// [`WaitArray::free`], whichever ends the reservation.
#[derive(Debug)]
pub struct SlotId(usize);

#[derive(Debug)]
struct WaitCell {
    core: Arc<EventCore>,
    latch: LatchId,
    file: &'static str,
    line: u32,
    sig_gen: u64,
    reserved_at: Instant,
    warned: bool,
}

/// Slab-like storage for wait cells that reuses freed slots so short
/// parks never grow the table.
#[derive(Debug)]
struct CellSlab {
    entries: Vec<Option<WaitCell>>,
    /// Free-slot indices for reuse. SmallVec<4> avoids heap allocation for
    /// the common case of few concurrent waiters.
    free_slots: SmallVec<[usize; 4]>,
    reserved: usize,
}

impl CellSlab {
    const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_slots: SmallVec::new_const(),
            reserved: 0,
        }
    }

    fn insert(&mut self, cell: WaitCell) -> usize {
        self.reserved += 1;
        if let Some(index) = self.free_slots.pop() {
            self.entries[index] = Some(cell);
            index
        } else {
            let index = self.entries.len();
            self.entries.push(Some(cell));
            index
        }
    }

    fn remove(&mut self, index: usize) -> WaitCell {
        let cell = self.entries[index]
            .take()
            .expect("wait cell freed twice or never reserved");
        self.free_slots.push(index);
        self.reserved -= 1;
        cell
    }
}

/// The process-wide table of parked latch waiters.
#[derive(Debug)]
pub struct WaitArray {
    cells: Mutex<CellSlab>,
}

static WAIT_ARRAY: WaitArray = WaitArray::new();

/// Returns the process-wide wait-array.
#[must_use]
pub fn wait_array() -> &'static WaitArray {
    &WAIT_ARRAY
}

impl WaitArray {
    const fn new() -> Self {
        Self {
            cells: Mutex::new(CellSlab::new()),
        }
    }

    /// Reserves a cell for a thread about to park on `core`.
    ///
    /// Captures the event's signal generation via `reset`; the caller must
    /// reserve *before* setting the latch's waiter flag so that a wake
    /// issued between the two advances the generation and turns the park
    /// into a no-op.
    pub(crate) fn reserve(
        &self,
        core: &Arc<EventCore>,
        latch: LatchId,
        file: &'static str,
        line: u32,
    ) -> SlotId {
        let sig_gen = core.event().reset();
        let mut cells = self.cells.lock();
        let index = cells.insert(WaitCell {
            core: Arc::clone(core),
            latch,
            file,
            line,
            sig_gen,
            reserved_at: Instant::now(),
            warned: false,
        });
        SlotId(index)
    }

    /// Releases a reservation without parking (the waiter acquired the
    /// latch during its final retries).
    pub(crate) fn free(&self, slot: SlotId) {
        let _ = self.cells.lock().remove(slot.0);
    }

    /// Parks the calling thread on the reserved cell's event and releases
    /// the cell once woken.
    pub(crate) fn wait(&self, slot: SlotId) {
        let (core, sig_gen) = {
            let cells = self.cells.lock();
            let cell = cells.entries[slot.0]
                .as_ref()
                .expect("wait on a freed cell");
            (Arc::clone(&cell.core), cell.sig_gen)
        };

        core.event().wait(sig_gen);
        self.free(slot);
    }

    /// Number of currently reserved cells.
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.cells.lock().reserved
    }

    /// Rescue sweep: wakes every cell whose latch is currently unlocked
    /// and reports cells that have waited past the configured horizon.
    ///
    /// Called periodically by the engine's master timer. Returns the
    /// number of cells woken.
    pub fn wake_if_free(&self) -> usize {
        let long_wait_warn = config::current().long_wait_warn;
        let mut woken = 0;

        let mut cells = self.cells.lock();
        for cell in cells.entries.iter_mut().flatten() {
            if !cell.core.is_locked() {
                cell.core.event().set();
                woken += 1;
            } else if !cell.warned && cell.reserved_at.elapsed() >= long_wait_warn {
                cell.warned = true;
                tracing::warn!(
                    latch = latch::name(cell.latch),
                    file = cell.file,
                    line = cell.line,
                    waited_ms = cell.reserved_at.elapsed().as_millis() as u64,
                    "long latch wait detected"
                );
            }
        }
        drop(cells);

        if woken > 0 {
            tracing::debug!(woken, "rescue sweep woke stranded latch waiters");
        }
        woken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_core() -> Arc<EventCore> {
        Arc::new(EventCore::new("wait_array_test"))
    }

    #[test]
    fn reserve_and_free_recycle_slots() {
        let array = WaitArray::new();
        let core = test_core();

        let a = array.reserve(&core, LatchId::new(1), file!(), line!());
        let b = array.reserve(&core, LatchId::new(1), file!(), line!());
        assert_eq!(array.reserved(), 2);

        let freed_index = a.0;
        array.free(a);
        let c = array.reserve(&core, LatchId::new(1), file!(), line!());
        assert_eq!(c.0, freed_index, "freed slot should be reused");

        array.free(b);
        array.free(c);
        assert_eq!(array.reserved(), 0);
    }

    #[test]
    fn sweep_wakes_cell_of_unlocked_latch() {
        let array = WaitArray::new();
        let core = test_core();

        let slot = array.reserve(&core, LatchId::new(2), file!(), line!());
        // The latch is unlocked, so the sweep must wake this cell.
        assert_eq!(array.wake_if_free(), 1);

        // The set advanced the generation, so the park returns at once.
        array.wait(slot);
        assert_eq!(array.reserved(), 0);
    }

    #[test]
    fn sweep_skips_cell_of_held_latch() {
        let array = WaitArray::new();
        let core = test_core();
        assert!(core.tas_lock());

        let slot = array.reserve(&core, LatchId::new(3), file!(), line!());
        assert_eq!(array.wake_if_free(), 0);

        array.free(slot);
        core.tas_unlock();
    }

    #[test]
    fn parked_thread_wakes_on_event_set() {
        let core = test_core();

        let slot = wait_array().reserve(&core, LatchId::new(4), file!(), line!());
        let parked = std::thread::spawn(move || wait_array().wait(slot));

        std::thread::sleep(std::time::Duration::from_millis(20));
        core.event().set();
        parked.join().expect("parked thread panicked");
    }
}
