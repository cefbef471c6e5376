//! Policy based mutexes.
//!
//! The engine never locks a raw mutex directly. Every latch is a
//! [`PolicyMutex`] wrapping one of four interchangeable implementations,
//! so a hot path can be re-tuned per latch without touching call sites:
//!
//! - [`OsTrackMutex`]: the platform mutex, plus debug state tracking.
//! - [`TtasMutex`]: pure test-and-test-and-set spin with scheduler yields;
//!   never parks.
//! - [`TtasFutexMutex`] (Linux): TTAS fast path, futex park on contention.
//! - [`TtasEventMutex`]: TTAS fast path, parks on an [`crate::event::Event`]
//!   through the engine-global wait-array.
//!
//! The facade threads a [`MutexPolicy`] through every acquire and release;
//! the policy observes, it never synchronizes. All happens-before is
//! carried by the implementation: an unlocker's writes are visible to the
//! next acquirer, and nothing more is promised. No fairness, no
//! reentrancy, no cancellation.
//!
//! # Lifecycle
//!
//! Instances are inert after `Default` construction; `init` allocates
//! whatever OS resources the variant needs and `destroy` releases them.
//! Destructors only assert the latch is unheld, because instances may
//! outlive the subsystems that own the OS primitives.

pub(crate) mod event_mutex;
#[cfg(target_os = "linux")]
mod futex;
mod os;
mod policy;
mod policy_mutex;
mod spin;

pub use event_mutex::TtasEventMutex;
#[cfg(target_os = "linux")]
pub use futex::TtasFutexMutex;
pub use os::{OsTrackMutex, SysMutex};
pub use policy::{LatchStats, NoPolicy, TrackPolicy};
pub use policy_mutex::{LatchGuard, PolicyMutex};
pub use spin::TtasMutex;

use crate::latch::LatchId;

/// Lock word value of a free mutex.
pub(crate) const UNLOCKED: u32 = 0;
/// Lock word value of a held mutex.
pub(crate) const LOCKED: u32 = 1;
/// Lock word value of a held futex mutex with (possible) parked waiters.
pub(crate) const WAITERS: u32 = 2;

/// Per-mutex bookkeeping threaded through every acquire and release.
///
/// The mutex core calls the hooks at fixed points and never inspects the
/// policy's contents. `enter` and `locked` bracket a blocking acquire;
/// for a trylock both fire only after the lock is already held, so a
/// failed attempt is never recorded as an ordering event. `add` is called
/// by the acquiring thread with the contention cost of the acquisition it
/// just completed.
pub trait MutexPolicy: Default + Send + Sync {
    /// Binds the policy to its mutex at `init` time.
    fn init(&mut self, id: LatchId, file: &'static str, line: u32);

    /// Releases policy resources at `destroy` time.
    fn destroy(&mut self);

    /// Pre-acquire hook.
    fn enter(&self, file: &'static str, line: u32);

    /// Post-acquire hook.
    fn locked(&self, file: &'static str, line: u32);

    /// Pre-release hook.
    fn release(&self);

    /// Records the contention cost of one completed acquisition.
    fn add(&self, n_spins: u32, n_waits: u32);

    /// Whether the calling thread holds the mutex. Only meaningful for
    /// policies that track ownership; see the implementors.
    fn is_owned(&self) -> bool;
}

/// One concrete mutex implementation usable behind [`PolicyMutex`].
///
/// `init` and `destroy` take `&mut self`: they belong to single-threaded
/// setup and teardown phases, and exclusive access is what makes the
/// "init exactly once, before any sharing" rule hold by construction.
pub trait MutexImpl: Default + Send + Sync {
    /// The policy type threaded through this implementation.
    type Policy: MutexPolicy;

    /// Allocates OS resources and makes the mutex acquirable.
    fn init(&mut self, id: LatchId, file: &'static str, line: u32);

    /// Releases OS resources. The mutex must be unheld.
    fn destroy(&mut self);

    /// Blocks until the mutex is acquired. `max_spins` and `max_delay`
    /// tune the contended path; implementations without a spin phase
    /// ignore them.
    fn enter(&self, max_spins: u32, max_delay: u32, file: &'static str, line: u32);

    /// Attempts to acquire without blocking. Returns `true` on success.
    fn try_lock(&self) -> bool;

    /// Releases the mutex. The caller must hold it.
    fn exit(&self);

    /// Read-only view of the policy.
    fn policy(&self) -> &Self::Policy;

    /// Exclusive view of the policy, for `init`/`destroy`.
    fn policy_mut(&mut self) -> &mut Self::Policy;
}

/// Spin latch: TTAS with yields, never parks.
pub type SpinLatch = PolicyMutex<TtasMutex<TrackPolicy>>;

/// Futex latch: TTAS fast path, futex park on contention (Linux only).
#[cfg(target_os = "linux")]
pub type FutexLatch = PolicyMutex<TtasFutexMutex<TrackPolicy>>;

/// Event latch: TTAS fast path, event park through the wait-array.
pub type EventLatch = PolicyMutex<TtasEventMutex<TrackPolicy>>;

/// OS latch: the platform mutex with debug tracking.
pub type SysLatch = PolicyMutex<OsTrackMutex<TrackPolicy>>;

/// The engine's default latch type.
#[cfg(target_os = "linux")]
pub type LatchMutex = FutexLatch;

/// The engine's default latch type.
#[cfg(not(target_os = "linux"))]
pub type LatchMutex = EventLatch;
