//! Busy-wait table lock + RAII guard.
//!
//! Every bulk operation acquires a guard once and holds it for its whole body,
//! including the parallel phase. Pooled tasks never acquire it. The lock is
//! not reentrant: acquiring it twice from the same thread spins forever.

use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared inner state for the lock.
struct LockInner {
    locked: AtomicBool,
}

impl LockInner {
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// Handle to a spin lock. Cloning shares the same lock, which is how several
/// tables coordinate through one externally supplied instance.
#[derive(Clone)]
pub struct SpinLock {
    inner: Arc<LockInner>,
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl SpinLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockInner {
                locked: AtomicBool::new(false),
            }),
        }
    }

    /// Spin until the lock is free, then hold it until the guard drops.
    pub fn acquire(&self) -> SpinGuard {
        loop {
            if self.inner.try_acquire() {
                return SpinGuard {
                    inner: Arc::clone(&self.inner),
                };
            }
            while self.inner.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    pub fn try_acquire(&self) -> Option<SpinGuard> {
        if self.inner.try_acquire() {
            Some(SpinGuard {
                inner: Arc::clone(&self.inner),
            })
        } else {
            None
        }
    }

    /// Advisory; the answer may be stale by the time it is read.
    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Relaxed)
    }

    /// True when both handles refer to the same lock.
    pub fn same_as(&self, other: &SpinLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Exclusive-access token. Dropping it releases the lock (panic-safe).
pub struct SpinGuard {
    inner: Arc<LockInner>,
}

impl Drop for SpinGuard {
    fn drop(&mut self) {
        self.inner.release();
    }
}
