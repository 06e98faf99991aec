//! # AcornDB - Embedded Transactional Key-Value Store
//!
//! AcornDB is an embedded, single-file, transactional key-value store: a
//! disk-backed B-tree of fixed-size pages with named collections sharing one
//! underlying page space. It is meant to be linked into a host process that
//! needs durable ordered storage. It is a library, not a server.
//!
//! ## Quick Start
//!
//! ```ignore
//! use acorndb::Db;
//!
//! let db = Db::builder().path("./app.db").open()?;
//!
//! let mut tx = db.write_tx();
//! let mut users = tx.create_collection(b"users")?;
//! users.put(b"alice", b"admin")?;
//! drop(users);
//! tx.commit()?;
//!
//! let mut tx = db.read_tx();
//! let role = tx.get_collection(b"users")?.find(b"alice")?;
//! assert_eq!(role.value(), b"admin");
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Public API (Db / Tx)         │
//! ├─────────────────────────────────────┤
//! │   Collections (named B-trees over   │
//! │     the collections-tree catalog)   │
//! ├─────────────────────────────────────┤
//! │   B-Tree Nodes (slotted pages,      │
//! │     split / rotate / merge)         │
//! ├─────────────────────────────────────┤
//! │   Transaction (dirty-node buffer,   │
//! │     commit / rollback protocol)     │
//! ├─────────────────────────────────────┤
//! │   Data Access Layer (pages, free    │
//! │     list, meta, positional I/O)     │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! One reader-writer lock at database granularity: any number of read
//! transactions, or exactly one write transaction. Readers observe the
//! committed state as of their start; a writer's mutations are buffered in
//! its dirty-node map and reach disk only at commit. There is no
//! write-ahead log: the last successfully written meta page determines the
//! state a reopen observes.
//!
//! ## File Layout
//!
//! A single regular file of `page_size`-byte pages. Page 0 holds the meta
//! record (magic number, collections-tree root, free-list page); every
//! other page is assigned by the free list to tree nodes or the free list
//! itself.
//!
//! ## Module Overview
//!
//! - `storage`: pages, free list, meta record, data access layer
//! - `btree`: items, slotted-page nodes, collections
//! - `tx`: read/write transactions and the commit protocol
//! - `db`: the database handle and configuration
//! - [`sync`]: host-facing semaphore, mutex, reader-writer mutex, channel

mod btree;
mod db;
mod error;
mod storage;
pub mod sync;
mod tx;

pub use btree::{Collection, Item};
pub use db::{Db, DbBuilder, Options, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
pub use error::{Error, MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub use tx::Tx;
