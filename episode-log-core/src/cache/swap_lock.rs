//! Reader/writer lock guarding the active buffer.
use crate::EpisodeLogError;
use std::{
    cell::RefCell,
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicUsize, Ordering},
        PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

static NEXT_LOCK_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Ids of the locks on which the current thread has shared holds, one entry per hold.
    static SHARED_HOLDS: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// A reader/writer lock with many shared holders or one exclusive holder.
///
/// Unlike a bare [`RwLock`], asking for the exclusive hold from a thread that already
/// has a shared hold on the same lock does not deadlock: [`SwapLock::write()`] returns
/// [`EpisodeLogError::ReentrantSwap`] instead.
///
/// Poisoning is ignored. Holders only swap whole values under the lock, so the data
/// is consistent whenever a holder panics.
#[derive(Debug)]
pub struct SwapLock<T> {
    id: usize,
    inner: RwLock<T>,
}

impl<T> SwapLock<T> {
    /// Creates a lock protecting `value`.
    pub fn new(value: T) -> Self {
        Self {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            inner: RwLock::new(value),
        }
    }

    /// Takes a shared hold, blocking while an exclusive holder is active.
    pub fn read(&self) -> SharedHold<'_, T> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        SHARED_HOLDS.with(|holds| holds.borrow_mut().push(self.id));
        SharedHold {
            lock_id: self.id,
            guard,
        }
    }

    /// Takes the exclusive hold, blocking until all shared holders are gone.
    ///
    /// Fails with [`EpisodeLogError::ReentrantSwap`] if the current thread has a shared
    /// hold on this lock.
    pub fn write(&self) -> Result<ExclusiveHold<'_, T>, EpisodeLogError> {
        if self.held_shared_by_current_thread() {
            return Err(EpisodeLogError::ReentrantSwap);
        }
        let guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Ok(ExclusiveHold { guard })
    }

    /// Returns `true` if the current thread has a shared hold on this lock.
    pub fn held_shared_by_current_thread(&self) -> bool {
        SHARED_HOLDS.with(|holds| holds.borrow().contains(&self.id))
    }
}

/// A shared hold of a [`SwapLock`], released on drop.
pub struct SharedHold<'a, T> {
    lock_id: usize,
    guard: RwLockReadGuard<'a, T>,
}

impl<T> Deref for SharedHold<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> Drop for SharedHold<'_, T> {
    fn drop(&mut self) {
        // The thread-local may already be gone while the thread is exiting
        let _ = SHARED_HOLDS.try_with(|holds| {
            let mut holds = holds.borrow_mut();
            if let Some(ix) = holds.iter().rposition(|&id| id == self.lock_id) {
                holds.swap_remove(ix);
            }
        });
    }
}

/// The exclusive hold of a [`SwapLock`], released on drop.
pub struct ExclusiveHold<'a, T> {
    guard: RwLockWriteGuard<'a, T>,
}

impl<T> Deref for ExclusiveHold<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for ExclusiveHold<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
