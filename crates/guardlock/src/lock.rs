use std::error::Error;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::guard::{ContextGuard, OperationSite};

/// A reentrant lock whose entry points report calls from a forbidden context.
///
/// The lock supports two styles that may be mixed on one thread:
///
/// - explicit [`acquire`](Self::acquire) / [`release`](Self::release) pairs,
/// - scoped [`lock`](Self::lock) / [`try_lock`](Self::try_lock) returning a
///   guard that releases on drop, including during unwinding.
///
/// Ownership and the hold count live in the underlying
/// [`parking_lot::ReentrantMutex`].
pub struct GuardedReentrantLock<T = ()> {
    name: &'static str,
    inner: ReentrantMutex<T>,
    // Holds taken through `acquire` and not yet released. Only the owning
    // thread touches this, and only while it holds `inner`.
    explicit_holds: AtomicUsize,
    guard: ContextGuard,
}

impl GuardedReentrantLock<()> {
    pub fn unit(name: &'static str, guard: ContextGuard) -> Self {
        Self::new(name, (), guard)
    }
}

impl<T> GuardedReentrantLock<T> {
    pub fn new(name: &'static str, value: T, guard: ContextGuard) -> Self {
        Self {
            name,
            inner: ReentrantMutex::new(value),
            explicit_holds: AtomicUsize::new(0),
            guard,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn guard(&self) -> &ContextGuard {
        &self.guard
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn is_owned_by_current_thread(&self) -> bool {
        self.inner.is_owned_by_current_thread()
    }

    /// Takes one hold on the lock.
    ///
    /// Re-acquiring on the owning thread never blocks. With `blocking == false`
    /// a lock owned by another thread yields `false` immediately; otherwise the
    /// call waits until that thread has released every hold.
    #[track_caller]
    pub fn acquire(&self, blocking: bool) -> bool {
        const SITE: OperationSite = OperationSite::new("acquire", file!(), line!());
        self.guard.invoke(&SITE, Location::caller(), Some(self.name), || {
            self.acquire_unguarded(blocking)
        })
    }

    /// Gives back one hold taken with [`acquire`](Self::acquire).
    #[track_caller]
    pub fn release(&self) -> Result<(), LockError> {
        const SITE: OperationSite = OperationSite::new("release", file!(), line!());
        self.guard.invoke(&SITE, Location::caller(), Some(self.name), || {
            self.release_unguarded()
        })
    }

    #[track_caller]
    pub fn lock(&self) -> ReentrantMutexGuard<'_, T> {
        const SITE: OperationSite = OperationSite::new("lock", file!(), line!());
        self.guard
            .invoke(&SITE, Location::caller(), Some(self.name), || self.inner.lock())
    }

    #[track_caller]
    pub fn try_lock(&self) -> Option<ReentrantMutexGuard<'_, T>> {
        const SITE: OperationSite = OperationSite::new("try_lock", file!(), line!());
        self.guard
            .invoke(&SITE, Location::caller(), Some(self.name), || self.inner.try_lock())
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    fn acquire_unguarded(&self, blocking: bool) -> bool {
        let held = if blocking {
            Some(self.inner.lock())
        } else {
            self.inner.try_lock()
        };
        match held {
            Some(guard) => {
                std::mem::forget(guard);
                self.explicit_holds.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn release_unguarded(&self) -> Result<(), LockError> {
        if !self.inner.is_owned_by_current_thread() {
            return Err(if self.inner.is_locked() {
                LockError::NotOwner { lock: self.name }
            } else {
                LockError::NotHeld { lock: self.name }
            });
        }
        if self.explicit_holds.load(Ordering::Relaxed) == 0 {
            return Err(LockError::NotHeld { lock: self.name });
        }
        self.explicit_holds.fetch_sub(1, Ordering::Relaxed);
        // SAFETY: this thread owns the lock and the hold being released came
        // from a guard that `acquire_unguarded` forgot.
        unsafe { self.inner.force_unlock() };
        Ok(())
    }
}

impl<T> fmt::Debug for GuardedReentrantLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedReentrantLock")
            .field("name", &self.name)
            .field("locked", &self.inner.is_locked())
            .finish_non_exhaustive()
    }
}

/// Ownership violations surfaced by [`GuardedReentrantLock::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// The calling thread holds no explicit acquisition of the lock.
    NotHeld { lock: &'static str },
    /// The lock is held by a different thread.
    NotOwner { lock: &'static str },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotHeld { lock } => write!(f, "cannot release un-acquired lock {lock:?}"),
            Self::NotOwner { lock } => {
                write!(f, "cannot release lock {lock:?}: it is owned by another thread")
            }
        }
    }
}

impl Error for LockError {}
