//! # Binary-Semaphore Mutex
//!
//! A mutual-exclusion lock built on a one-permit [`Semaphore`], adding the
//! timed acquisition the semaphore supports to an RAII guard API.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use eyre::Result;

use super::semaphore::Semaphore;

pub struct Mutex<T> {
    semaphore: Semaphore,
    value: UnsafeCell<T>,
}

// SAFETY: the single permit guarantees at most one guard exists at a time,
// so all access to `value` is exclusive while the guard lives.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            semaphore: Semaphore::new(1),
            value: UnsafeCell::new(value),
        }
    }

    /// Blocks until the lock is held.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.semaphore.acquire();
        MutexGuard { mutex: self }
    }

    /// Takes the lock if it is free right now.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.semaphore.try_acquire() {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Blocks up to `timeout` for the lock.
    pub fn lock_timeout(&self, timeout: Duration) -> Result<MutexGuard<'_, T>> {
        self.semaphore.acquire_timeout(timeout)?;
        Ok(MutexGuard { mutex: self })
    }

    /// Consumes the mutex, returning the value it protected.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> std::fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutexGuard").finish_non_exhaustive()
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the mutex's single permit.
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the mutex's single permit.
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn guard_grants_exclusive_mutation() {
        let mutex = Mutex::new(0);
        {
            let mut guard = mutex.lock();
            *guard += 1;
        }
        assert_eq!(*mutex.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let mutex = Mutex::new(());
        let guard = mutex.lock();
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn lock_timeout_reports_contention() {
        let mutex = Mutex::new(());
        let guard = mutex.lock();

        let err = mutex.lock_timeout(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::Timeout));
        drop(guard);

        assert!(mutex.lock_timeout(Duration::from_millis(20)).is_ok());
    }

    #[test]
    fn contended_increments_are_not_lost() {
        let mutex = Arc::new(Mutex::new(0u64));
        let mut workers = Vec::new();
        for _ in 0..8 {
            let mutex = Arc::clone(&mutex);
            workers.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    *mutex.lock() += 1;
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        let mutex = match Arc::try_unwrap(mutex) {
            Ok(mutex) => mutex,
            Err(_) => panic!("mutex still has outstanding references"),
        };
        assert_eq!(mutex.into_inner(), 8000);
    }
}
