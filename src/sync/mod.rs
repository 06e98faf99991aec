//! # Synchronization Primitives
//!
//! Generic primitives for host processes embedding the database: a counting
//! semaphore with timed acquisition, a binary-semaphore mutex, a
//! reader-writer mutex built from two semaphores and an atomic reader
//! count, and a bounded MPMC channel with close-broadcast.
//!
//! The database core does not use these; its transactions synchronize on a
//! `parking_lot::RwLock` held by [`crate::Db`].

pub mod channel;
mod mutex;
mod rwmutex;
mod semaphore;

pub use channel::{bounded, Receiver, Sender};
pub use mutex::{Mutex, MutexGuard};
pub use rwmutex::{RwMutex, RwMutexReadGuard, RwMutexWriteGuard};
pub use semaphore::Semaphore;
