//! # Bounded Channel
//!
//! A multi-producer multi-consumer channel with a fixed capacity. `send`
//! blocks while the buffer is full, `recv` blocks while it is empty, and the
//! `try_*` variants fail fast instead. Closing the channel, from any handle
//! or by dropping the last sender, wakes every waiter; receivers drain the
//! remaining buffered values before seeing [`Error::ChannelClosed`].

use std::collections::VecDeque;
use std::sync::Arc;

use eyre::Result;
use parking_lot::{Condvar, Mutex};

use crate::error::Error;

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
    senders: usize,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> Shared<T> {
    fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Creates a bounded channel with room for `capacity` values.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        inner: Mutex::new(Inner {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            closed: false,
            senders: 1,
        }),
        not_empty: Condvar::new(),
        not_full: Condvar::new(),
    });
    (
        Sender {
            shared: Arc::clone(&shared),
        },
        Receiver { shared },
    )
}

pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Blocks until the value is buffered; [`Error::ChannelClosed`] if the
    /// channel closes first.
    pub fn send(&self, value: T) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        loop {
            if inner.closed {
                return Err(Error::ChannelClosed.into());
            }
            if inner.queue.len() < inner.capacity {
                inner.queue.push_back(value);
                drop(inner);
                self.shared.not_empty.notify_one();
                return Ok(());
            }
            self.shared.not_full.wait(&mut inner);
        }
    }

    /// Buffers the value only if there is room right now.
    pub fn try_send(&self, value: T) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return Err(Error::ChannelClosed.into());
        }
        if inner.queue.len() == inner.capacity {
            return Err(Error::ChannelFull.into());
        }
        inner.queue.push_back(value);
        drop(inner);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Closes the channel and wakes all waiters.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.inner.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let last = {
            let mut inner = self.shared.inner.lock();
            inner.senders -= 1;
            inner.senders == 0
        };
        if last {
            self.shared.close();
        }
    }
}

pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Blocks for the next value. Buffered values survive a close; only an
    /// empty closed channel yields [`Error::ChannelClosed`].
    pub fn recv(&self) -> Result<T> {
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(value) = inner.queue.pop_front() {
                drop(inner);
                self.shared.not_full.notify_one();
                return Ok(value);
            }
            if inner.closed {
                return Err(Error::ChannelClosed.into());
            }
            self.shared.not_empty.wait(&mut inner);
        }
    }

    /// Takes a buffered value if any is present right now.
    pub fn try_recv(&self) -> Result<T> {
        let mut inner = self.shared.inner.lock();
        if let Some(value) = inner.queue.pop_front() {
            drop(inner);
            self.shared.not_full.notify_one();
            return Ok(value);
        }
        if inner.closed {
            return Err(Error::ChannelClosed.into());
        }
        Err(Error::ChannelEmpty.into())
    }

    /// Closes the channel and wakes all waiters.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
