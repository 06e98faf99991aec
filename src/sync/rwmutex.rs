//! # Reader-Writer Mutex
//!
//! A reader-writer lock assembled from two binary semaphores and an atomic
//! reader count. Readers pass through the read semaphore to update the
//! count; the first reader in also takes the write semaphore and the last
//! reader out returns it, so writers wait for the whole reader group.
//! Writers take the write semaphore exclusively and flag themselves active.
//!
//! The database core uses `parking_lot::RwLock` directly; this primitive is
//! part of the host-facing toolkit.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::semaphore::Semaphore;

pub struct RwMutex<T> {
    read_semaphore: Semaphore,
    write_semaphore: Semaphore,
    readers: AtomicUsize,
    writer_active: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: the write semaphore is held either by the single writer or on
// behalf of the whole reader group, so `value` is never aliased mutably.
unsafe impl<T: Send> Send for RwMutex<T> {}
unsafe impl<T: Send + Sync> Sync for RwMutex<T> {}

impl<T> RwMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            read_semaphore: Semaphore::new(1),
            write_semaphore: Semaphore::new(1),
            readers: AtomicUsize::new(0),
            writer_active: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires shared access; blocks while a writer is active.
    pub fn read(&self) -> RwMutexReadGuard<'_, T> {
        self.read_semaphore.acquire();
        if self.readers.fetch_add(1, Ordering::AcqRel) == 0 {
            self.write_semaphore.acquire();
        }
        self.read_semaphore.release();
        RwMutexReadGuard { lock: self }
    }

    /// Acquires exclusive access; blocks while readers or a writer hold the
    /// lock.
    pub fn write(&self) -> RwMutexWriteGuard<'_, T> {
        self.write_semaphore.acquire();
        self.writer_active.store(true, Ordering::Release);
        RwMutexWriteGuard { lock: self }
    }

    /// Whether a writer currently holds the lock.
    pub fn writer_active(&self) -> bool {
        self.writer_active.load(Ordering::Acquire)
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

pub struct RwMutexReadGuard<'a, T> {
    lock: &'a RwMutex<T>,
}

impl<T> Deref for RwMutexReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the reader group holds the write semaphore, so no writer
        // can mutate `value` while this guard lives.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for RwMutexReadGuard<'_, T> {
    fn drop(&mut self) {
        if self.lock.readers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.lock.write_semaphore.release();
        }
    }
}

pub struct RwMutexWriteGuard<'a, T> {
    lock: &'a RwMutex<T>,
}

impl<T> Deref for RwMutexWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the write semaphore exclusively.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for RwMutexWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the write semaphore exclusively.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for RwMutexWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.writer_active.store(false, Ordering::Release);
        self.lock.write_semaphore.release();
    }
}
