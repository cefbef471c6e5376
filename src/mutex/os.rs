//! The platform mutex adapter and its debug-tracked wrapper.
//!
//! [`SysMutex`] is the thinnest possible shim over `pthread_mutex_t`:
//! no instrumentation, no spinning, block-on-contention semantics decided
//! entirely by the kernel. [`OsTrackMutex`] layers the debug state machine
//! `{freed, locked}` on top so misuse (use before init, double lock,
//! release-when-free, destroy-while-held) trips immediately in debug
//! builds while release builds keep the bare OS semantics.

use std::cell::UnsafeCell;
use std::ptr;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::latch::LatchId;
use crate::mutex::{MutexImpl, MutexPolicy};

/// Thin adapter over the platform's native mutex.
///
/// The pthread object lives behind a `Box` so its address stays stable,
/// as POSIX requires, and so `Default` construction stays allocation-free
/// for instances in process-wide storage.
#[derive(Default)]
pub struct SysMutex {
    sys: Option<Box<UnsafeCell<libc::pthread_mutex_t>>>,
}

impl std::fmt::Debug for SysMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysMutex")
            .field("initialized", &self.sys.is_some())
            .finish()
    }
}

// The pthread mutex is the synchronization; the UnsafeCell only hides
// the &self-to-*mut cast the libc API needs.
unsafe impl Send for SysMutex {}
unsafe impl Sync for SysMutex {}

impl SysMutex {
    /// Allocates and initializes the OS mutex. Fatal on failure; an
    /// engine that cannot create a mutex cannot start.
    pub fn init(&mut self) {
        assert!(self.sys.is_none(), "OS mutex initialized twice");
        let sys = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        let rc = unsafe { libc::pthread_mutex_init(sys.get(), ptr::null()) };
        assert_eq!(rc, 0, "pthread_mutex_init failed: {rc}");
        self.sys = Some(sys);
    }

    /// Destroys the OS mutex. The mutex must be unheld.
    pub fn destroy(&mut self) {
        let sys = self.sys.take().expect("OS mutex destroyed before init");
        let rc = unsafe { libc::pthread_mutex_destroy(sys.get()) };
        assert_eq!(rc, 0, "pthread_mutex_destroy failed: {rc}");
    }

    /// Blocks until the mutex is acquired.
    pub fn enter(&self) {
        let rc = unsafe { libc::pthread_mutex_lock(self.raw()) };
        debug_assert_eq!(rc, 0, "pthread_mutex_lock failed: {rc}");
    }

    /// Attempts to acquire without blocking. Returns `true` on success.
    pub fn try_lock(&self) -> bool {
        unsafe { libc::pthread_mutex_trylock(self.raw()) == 0 }
    }

    /// Releases the mutex. The caller must hold it.
    pub fn exit(&self) {
        let rc = unsafe { libc::pthread_mutex_unlock(self.raw()) };
        debug_assert_eq!(rc, 0, "pthread_mutex_unlock failed: {rc}");
    }

    fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.sys.as_ref().expect("OS mutex used before init").get()
    }
}

/// OS mutex wrapped with debug state tracking.
pub struct OsTrackMutex<P: MutexPolicy> {
    inner: SysMutex,
    policy: P,
    #[cfg(debug_assertions)]
    freed: AtomicBool,
    #[cfg(debug_assertions)]
    locked: AtomicBool,
    #[cfg(debug_assertions)]
    destroy_at_exit: bool,
}

impl<P: MutexPolicy> Default for OsTrackMutex<P> {
    fn default() -> Self {
        Self {
            inner: SysMutex::default(),
            policy: P::default(),
            #[cfg(debug_assertions)]
            freed: AtomicBool::new(true),
            #[cfg(debug_assertions)]
            locked: AtomicBool::new(false),
            #[cfg(debug_assertions)]
            destroy_at_exit: true,
        }
    }
}

impl<P: MutexPolicy> OsTrackMutex<P> {
    /// Opts this instance out of the destructor's unheld check.
    ///
    /// Intended for instances in process-wide storage that are destroyed
    /// by the language runtime after the engine already shut down.
    pub fn set_destroy_at_exit(&mut self, value: bool) {
        #[cfg(debug_assertions)]
        {
            self.destroy_at_exit = value;
        }
        #[cfg(not(debug_assertions))]
        let _ = value;
    }
}

impl<P: MutexPolicy> std::fmt::Debug for OsTrackMutex<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsTrackMutex").finish_non_exhaustive()
    }
}

impl<P: MutexPolicy> Drop for OsTrackMutex<P> {
    fn drop(&mut self) {
        // The OS resource is deliberately NOT released here; instances may
        // outlive the runtime that owns the OS primitives.
        #[cfg(debug_assertions)]
        assert!(!self.destroy_at_exit || !self.locked.load(Ordering::Relaxed));
    }
}

impl<P: MutexPolicy> MutexImpl for OsTrackMutex<P> {
    type Policy = P;

    fn init(&mut self, _id: LatchId, _file: &'static str, _line: u32) {
        #[cfg(debug_assertions)]
        {
            assert!(self.freed.load(Ordering::Relaxed));
            assert!(!self.locked.load(Ordering::Relaxed));
        }

        self.inner.init();

        #[cfg(debug_assertions)]
        self.freed.store(false, Ordering::Relaxed);
    }

    fn destroy(&mut self) {
        #[cfg(debug_assertions)]
        {
            assert!(!self.freed.load(Ordering::Relaxed));
            assert!(!self.locked.load(Ordering::Relaxed));
        }

        self.inner.destroy();

        #[cfg(debug_assertions)]
        self.freed.store(true, Ordering::Relaxed);
    }

    fn enter(&self, _max_spins: u32, _max_delay: u32, _file: &'static str, _line: u32) {
        #[cfg(debug_assertions)]
        debug_assert!(!self.freed.load(Ordering::Relaxed));

        self.inner.enter();

        #[cfg(debug_assertions)]
        {
            debug_assert!(!self.locked.swap(true, Ordering::Relaxed));
        }
    }

    fn try_lock(&self) -> bool {
        #[cfg(debug_assertions)]
        debug_assert!(!self.freed.load(Ordering::Relaxed));

        let locked = self.inner.try_lock();

        #[cfg(debug_assertions)]
        if locked {
            debug_assert!(!self.locked.swap(true, Ordering::Relaxed));
        }

        locked
    }

    fn exit(&self) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(!self.freed.load(Ordering::Relaxed));
            debug_assert!(self.locked.swap(false, Ordering::Relaxed));
        }

        self.inner.exit();
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
    use crate::mutex::NoPolicy;

    fn initialized() -> OsTrackMutex<NoPolicy> {
        let mut mutex = OsTrackMutex::default();
        mutex.init(LatchId::new(1), file!(), line!());
        mutex
    }

    #[test]
    fn lock_unlock_cycle() {
        let mut mutex = initialized();
        mutex.enter(0, 0, file!(), line!());
        mutex.exit();
        mutex.destroy();
    }

    #[test]
    fn try_lock_fails_while_held() {
        let mut mutex = initialized();
        mutex.enter(0, 0, file!(), line!());
        assert!(!mutex.try_lock());
        mutex.exit();
        assert!(mutex.try_lock());
        mutex.exit();
        mutex.destroy();
    }

    #[test]
    fn contended_enter_blocks_until_release() {
        let mut mutex = OsTrackMutex::<NoPolicy>::default();
        mutex.init(LatchId::new(1), file!(), line!());
        let mutex: &'static OsTrackMutex<NoPolicy> = Box::leak(Box::new(mutex));

        mutex.enter(0, 0, file!(), line!());
        let waiter = std::thread::spawn(move || {
            mutex.enter(0, 0, file!(), line!());
            mutex.exit();
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        mutex.exit();
        waiter.join().expect("waiter panicked");
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn destroy_before_init_trips() {
        let mutex: &mut OsTrackMutex<NoPolicy> =
            Box::leak(Box::new(OsTrackMutex::default()));
        mutex.destroy();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn exit_without_enter_trips() {
        let mutex: &mut OsTrackMutex<NoPolicy> = Box::leak(Box::new(OsTrackMutex::default()));
        mutex.init(LatchId::new(1), file!(), line!());
        mutex.exit();
    }
}
