//! Policy-parameterized latch mutexes for the storage engine.
//!
//! Every latch in the engine is a [`PolicyMutex`] over one of four
//! interchangeable implementations, so each hot path can be re-tuned per
//! latch (spin, futex park, event park, or plain OS mutex) without
//! touching call sites. The facade threads a [`MutexPolicy`] through
//! every acquire and release for contention accounting and ownership
//! checks, and reports wait spans to an optional process-global
//! [`instr::MutexProbe`].
//!
//! The supporting cast: [`wait`] is the engine-global wait-array that
//! parks event-latch waiters and runs the rescue sweep, [`event`] is the
//! primitive they park on, [`config`] holds the process-wide spin tuning,
//! and [`latch`] resolves latch ids to names and performance-schema keys.
//! [`rng`] is an ABI-frozen compatibility generator bundled with the
//! source tree but independent of the latch core.
//!
//! # Example
//!
//! ```
//! use latchsync::latch::{self, LatchId, PfsKey};
//! use latchsync::mutex::EventLatch;
//!
//! const BUF_POOL_LATCH: LatchId = LatchId::new(1);
//! latch::register(BUF_POOL_LATCH, "buf_pool", PfsKey(1));
//!
//! let mut latch = EventLatch::default();
//! latch.init(BUF_POOL_LATCH, file!(), line!());
//!
//! latch.lock();
//! // critical section
//! latch.exit();
//!
//! latch.destroy();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod event;
pub mod instr;
pub mod latch;
pub mod mutex;
pub mod rng;
pub mod test_utils;
pub mod util;
pub mod wait;

pub use mutex::{
    EventLatch, LatchGuard, LatchMutex, LatchStats, MutexImpl, MutexPolicy, NoPolicy,
    OsTrackMutex, PolicyMutex, SpinLatch, SysLatch, SysMutex, TrackPolicy, TtasEventMutex,
    TtasMutex,
};

#[cfg(target_os = "linux")]
pub use mutex::{FutexLatch, TtasFutexMutex};
