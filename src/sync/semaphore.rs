//! # Counting Semaphore
//!
//! The building block of the host-facing synchronization primitives: a
//! permit counter guarded by a mutex, with a condvar for waiters. Supports
//! blocking, non-blocking, and timed acquisition.

use std::time::Duration;

use eyre::Result;
use parking_lot::{Condvar, Mutex};

use crate::error::Error;

pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then takes it.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Takes a permit if one is available right now.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Blocks up to `timeout` for a permit; [`Error::Timeout`] on expiry.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = std::time::Instant::now() + timeout;
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.available.wait_until(&mut permits, deadline).timed_out() {
                return Err(Error::Timeout.into());
            }
        }
        *permits -= 1;
        Ok(())
    }

    /// Returns a permit and wakes one waiter.
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        drop(permits);
        self.available.notify_one();
    }
}
