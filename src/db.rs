//! # Database Handle
//!
//! `Db` owns the data access layer behind a reader-writer lock and hands out
//! transactions: any number of concurrent readers, or exactly one writer.
//! The lock is acquired when a transaction starts and released when the
//! transaction is committed, rolled back, or dropped. Readers therefore
//! observe the committed state as of their start, and a writer's buffered
//! mutations are invisible until its commit completes.
//!
//! ## Configuration
//!
//! | Option             | Effect                          | Default      |
//! |--------------------|---------------------------------|--------------|
//! | `page_size`        | Fixed size of every page        | OS page size |
//! | `min_fill_percent` | Under-population threshold      | 0.5          |
//! | `max_fill_percent` | Over-population threshold       | 0.9          |
//!
//! The page size is fixed at creation and is part of the on-disk format: a
//! database must be reopened with the page size it was created with. Cell
//! offsets within a page are 16-bit, so the page size tops out at 65536.
//!
//! ## Usage
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
//! ```

use std::path::{Path, PathBuf};

use eyre::{ensure, Result};
use parking_lot::RwLock;

use crate::storage::Dal;
use crate::tx::Tx;

/// Smallest supported page: the meta record plus a little headroom.
pub const MIN_PAGE_SIZE: usize = 128;

/// Largest supported page: cell offsets are 16-bit.
pub const MAX_PAGE_SIZE: usize = 65536;

const FALLBACK_PAGE_SIZE: usize = 4096;

/// Tuning knobs fixed at database creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    pub page_size: usize,
    pub min_fill_percent: f32,
    pub max_fill_percent: f32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            page_size: os_page_size(),
            min_fill_percent: 0.5,
            max_fill_percent: 0.9,
        }
    }
}

impl Options {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.page_size.is_power_of_two()
                && (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size),
            "page size {} must be a power of two between {} and {}",
            self.page_size,
            MIN_PAGE_SIZE,
            MAX_PAGE_SIZE
        );
        ensure!(
            self.min_fill_percent > 0.0
                && self.min_fill_percent < self.max_fill_percent
                && self.max_fill_percent <= 1.0,
            "fill thresholds must satisfy 0 < min ({}) < max ({}) <= 1",
            self.min_fill_percent,
            self.max_fill_percent
        );
        Ok(())
    }
}

fn os_page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf reads a system constant and touches no memory.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 && (size as usize).is_power_of_two() && size as usize <= MAX_PAGE_SIZE {
            return size as usize;
        }
    }
    FALLBACK_PAGE_SIZE
}

/// An open database: transaction factory over a single backing file.
pub struct Db {
    dal: RwLock<Dal>,
}

impl Db {
    /// Opens the database at `path` with `options`, creating the file if it
    /// does not exist.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        options.validate()?;
        let dal = Dal::open(path.as_ref(), &options)?;
        Ok(Self {
            dal: RwLock::new(dal),
        })
    }

    pub fn builder() -> DbBuilder {
        DbBuilder::new()
    }

    /// Starts a read transaction, blocking while a writer is active.
    pub fn read_tx(&self) -> Tx<'_> {
        Tx::read(self.dal.read())
    }

    /// Starts the write transaction, blocking until it is the only
    /// transaction.
    pub fn write_tx(&self) -> Tx<'_> {
        Tx::write(self.dal.write())
    }
}

/// Fluent configuration for [`Db::open`].
///
/// ```ignore
/// let db = Db::builder()
///     .path("./app.db")
///     .page_size(8192)
///     .max_fill_percent(0.95)
///     .open()?;
/// ```
#[derive(Debug, Default)]
pub struct DbBuilder {
    path: Option<PathBuf>,
    options: Options,
}

impl DbBuilder {
    pub fn new() -> Self {
        Self {
            path: None,
            options: Options::default(),
        }
    }

    /// Path of the backing file. Created on open if absent.
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Fixed page size; a power of two between 128 and 65536.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.options.page_size = page_size;
        self
    }

    /// Fill fraction below which a node is rebalanced after a removal.
    pub fn min_fill_percent(mut self, percent: f32) -> Self {
        self.options.min_fill_percent = percent;
        self
    }

    /// Fill fraction above which a node is split after an insertion.
    pub fn max_fill_percent(mut self, percent: f32) -> Self {
        self.options.max_fill_percent = percent;
        self
    }

    pub fn open(self) -> Result<Db> {
        let path = self
            .path
            .ok_or_else(|| eyre::eyre!("no database path configured: call .path() first"))?;
        Db::open(path, self.options)
    }
}
