use std::{
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::{Mutex, MutexGuard};

use super::thread_id::ThreadId;

/// A blocking mutual exclusion lock that remembers which thread holds it.
///
/// Waiters are parked rather than spun, so the lock may be held across device
/// I/O. The recorded holder backs [SleepLock::holding], which callers use to
/// assert the locking protocol.
pub struct SleepLock<T> {
    name: &'static str,
    /// Id of the holding thread, or 0 when unlocked.
    holder: AtomicU64,
    data: Mutex<T>,
}

impl<T> SleepLock<T> {
    pub fn new(data: T, name: &'static str) -> Self {
        Self {
            name,
            holder: AtomicU64::new(0),
            data: Mutex::new(data),
        }
    }

    /// Block until the lock is acquired.
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let guard = self.data.lock();
        self.holder
            .store(ThreadId::current().as_u64().get(), Ordering::Release);
        SleepLockGuard {
            lock: self,
            guard,
            _not_send: PhantomData,
        }
    }

    /// Whether the calling thread holds this lock.
    pub fn holding(&self) -> bool {
        self.holder.load(Ordering::Acquire) == ThreadId::current().as_u64().get()
    }

    pub fn is_locked(&self) -> bool {
        self.data.is_locked()
    }
}

impl<T> fmt::Debug for SleepLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
    guard: MutexGuard<'a, T>,
    // The holder is tracked per thread, so the guard must stay on it.
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> SleepLockGuard<'a, T> {
    pub fn lock(&self) -> &'a SleepLock<T> {
        self.lock
    }
}

impl<'a, T> Deref for SleepLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<'a, T> DerefMut for SleepLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<'a, T> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        // Clear the holder before `guard` unlocks the mutex.
        self.lock.holder.store(0, Ordering::Release);
    }
}
