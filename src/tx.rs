//! # Transactions
//!
//! A transaction is a read or write view over the data access layer. It
//! holds the database lock (shared for readers, exclusive for the single
//! writer) for its whole lifetime, so readers observe the committed state
//! from the moment they started and never see a writer's half-applied
//! mutations.
//!
//! ## Write Buffering
//!
//! A write transaction never touches the file until commit. Mutated nodes
//! accumulate in a dirty map keyed by page number; [`Tx::get_node`] consults
//! the map first, which is how later reads inside the transaction observe
//! earlier writes. Pages allocated by the transaction are recorded so a
//! rollback can hand them back to the free list, and pages scheduled for
//! deletion are only released at commit.
//!
//! ## Commit Protocol
//!
//! Commit writes, in order: every dirty node, then the deleted-page
//! releases, then the free-list page, and finally the meta page (only when
//! the collections-tree root moved). The last successfully written meta
//! page determines the state a reopen observes.
//!
//! ## Lifecycle
//!
//! `commit` and `rollback` consume the transaction, so the lock is released
//! exactly once. Dropping an unfinished write transaction rolls it back in
//! memory: nothing was written, and its page allocations return to the free
//! list.

use eyre::{ensure, Result};
use hashbrown::HashMap;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::btree::collection::Collection;
use crate::btree::node::Node;
use crate::btree::item::Item;
use crate::error::Error;
use crate::storage::Dal;

enum Guard<'db> {
    Read(RwLockReadGuard<'db, Dal>),
    Write(RwLockWriteGuard<'db, Dal>),
}

/// A reader or writer view over the database.
pub struct Tx<'db> {
    guard: Guard<'db>,
    /// Root of the collections tree as this transaction sees it.
    root: u64,
    dirty_nodes: HashMap<u64, Node>,
    allocated_page_nums: Vec<u64>,
    pages_to_delete: Vec<u64>,
    finished: bool,
}

impl<'db> Tx<'db> {
    pub(crate) fn read(guard: RwLockReadGuard<'db, Dal>) -> Self {
        let root = guard.meta.root;
        Self {
            guard: Guard::Read(guard),
            root,
            dirty_nodes: HashMap::new(),
            allocated_page_nums: Vec::new(),
            pages_to_delete: Vec::new(),
            finished: false,
        }
    }

    pub(crate) fn write(guard: RwLockWriteGuard<'db, Dal>) -> Self {
        let root = guard.meta.root;
        Self {
            guard: Guard::Write(guard),
            root,
            dirty_nodes: HashMap::new(),
            allocated_page_nums: Vec::new(),
            pages_to_delete: Vec::new(),
            finished: false,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self.guard, Guard::Write(_))
    }

    pub(crate) fn ensure_write(&self) -> Result<()> {
        if self.is_write() {
            Ok(())
        } else {
            Err(Error::WriteInsideReadTx.into())
        }
    }

    fn dal(&self) -> &Dal {
        match &self.guard {
            Guard::Read(g) => g,
            Guard::Write(g) => g,
        }
    }

    fn dal_mut(&mut self) -> Result<&mut Dal> {
        match &mut self.guard {
            Guard::Write(g) => Ok(g),
            Guard::Read(_) => Err(Error::WriteInsideReadTx.into()),
        }
    }

    // ---- node cache ----

    /// Fetches a node, preferring this transaction's dirty copy over disk.
    pub(crate) fn get_node(&self, page_num: u64) -> Result<Node> {
        if let Some(node) = self.dirty_nodes.get(&page_num) {
            return Ok(node.clone());
        }
        self.dal().read_node(page_num)
    }

    /// Builds a node on a freshly allocated page. The page is recorded so a
    /// rollback returns it to the free list.
    pub(crate) fn new_node(&mut self, items: Vec<Item>, children: Vec<u64>) -> Result<Node> {
        self.ensure_write()?;
        let page_num = self.dal_mut()?.freelist.get_next_page();
        self.allocated_page_nums.push(page_num);

        let mut node = Node::new(items, children);
        node.page_num = page_num;
        Ok(node)
    }

    /// Buffers `node` in the dirty map; it reaches disk at commit.
    pub(crate) fn write_node(&mut self, node: &Node) -> Result<()> {
        self.ensure_write()?;
        ensure!(
            node.page_num != 0,
            "node must be assigned a page before it is buffered"
        );
        self.dirty_nodes.insert(node.page_num, node.clone());
        Ok(())
    }

    /// Schedules a page for release at commit. A dirty copy of the node is
    /// discarded: commit never writes a page it then frees.
    pub(crate) fn delete_node(&mut self, page_num: u64) {
        self.dirty_nodes.remove(&page_num);
        self.pages_to_delete.push(page_num);
    }

    #[cfg(test)]
    pub(crate) fn pages_to_delete(&self) -> &[u64] {
        &self.pages_to_delete
    }

    // ---- threshold passthroughs ----

    pub(crate) fn get_split_index(&self, node: &Node) -> Option<usize> {
        self.dal().get_split_index(node)
    }

    pub(crate) fn is_over_populated(&self, node: &Node) -> bool {
        self.dal().is_over_populated(node)
    }

    pub(crate) fn is_under_populated(&self, node: &Node) -> bool {
        self.dal().is_under_populated(node)
    }

    pub(crate) fn can_spare_an_element(&self, node: &Node) -> bool {
        self.dal().get_split_index(node).is_some()
    }

    pub(crate) fn page_size(&self) -> usize {
        self.dal().page_size()
    }

    // ---- catalog plumbing ----

    pub(crate) fn catalog_root(&self) -> u64 {
        self.root
    }

    pub(crate) fn set_catalog_root(&mut self, root: u64) {
        self.root = root;
    }

    pub(crate) fn put_catalog_record(
        &mut self,
        name: &[u8],
        root: u64,
        counter: u64,
    ) -> Result<()> {
        let record = Collection::serialize_record(root, counter);
        let mut catalog = Collection::catalog(self);
        catalog.put(name, &record)
    }

    // ---- collection namespace ----

    /// Looks up a named collection in the collections tree.
    pub fn get_collection<'tx>(&'tx mut self, name: &[u8]) -> Result<Collection<'tx, 'db>> {
        let record = {
            let mut catalog = Collection::catalog(self);
            catalog.find(name)?
        };
        let (root, counter) = Collection::deserialize_record(record.value())?;
        Ok(Collection::named(self, name, root, counter))
    }

    /// Creates (or replaces) a named collection rooted at a fresh empty
    /// leaf.
    pub fn create_collection<'tx>(&'tx mut self, name: &[u8]) -> Result<Collection<'tx, 'db>> {
        self.ensure_write()?;

        let root_node = self.new_node(Vec::new(), Vec::new())?;
        self.write_node(&root_node)?;

        let record = Collection::serialize_record(root_node.page_num, 0);
        {
            let mut catalog = Collection::catalog(self);
            catalog.put(name, &record)?;
        }
        Ok(Collection::named(self, name, root_node.page_num, 0))
    }

    /// Removes a named collection's record from the collections tree.
    pub fn delete_collection(&mut self, name: &[u8]) -> Result<()> {
        self.ensure_write()?;
        let mut catalog = Collection::catalog(self);
        catalog.remove(name)
    }

    // ---- commit & rollback ----

    /// Flushes the transaction's buffered state to disk and releases the
    /// database lock. A read transaction's commit only releases the lock.
    pub fn commit(mut self) -> Result<()> {
        let root = self.root;
        let dirty_count = self.dirty_nodes.len();
        let delete_count = self.pages_to_delete.len();

        let dirty: Vec<Node> = self.dirty_nodes.drain().map(|(_, node)| node).collect();
        let to_delete = std::mem::take(&mut self.pages_to_delete);
        self.allocated_page_nums.clear();
        self.finished = true;

        let Guard::Write(dal) = &mut self.guard else {
            return Ok(());
        };

        for mut node in dirty {
            dal.write_node(&mut node)?;
        }
        for page_num in to_delete {
            dal.delete_node(page_num);
        }
        dal.write_freelist()?;

        if root != dal.meta.root {
            dal.meta.root = root;
            dal.write_meta()?;
        }

        log::debug!(
            "committed transaction: {} dirty nodes, {} pages released",
            dirty_count,
            delete_count
        );
        Ok(())
    }

    /// Discards the transaction's buffered state, returns its page
    /// allocations to the free list, and releases the database lock.
    pub fn rollback(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let allocated = std::mem::take(&mut self.allocated_page_nums);
        self.dirty_nodes.clear();
        self.pages_to_delete.clear();

        if let Guard::Write(dal) = &mut self.guard {
            for page_num in &allocated {
                dal.freelist.release_page(*page_num);
            }
            log::debug!(
                "rolled back transaction: {} allocated pages returned",
                allocated.len()
            );
        }
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Db, Options};
    use crate::error::Error;
    use tempfile::tempdir;

    fn open_db(dir: &tempfile::TempDir) -> Db {
        Db::open(dir.path().join("test.db"), Options::default()).unwrap()
    }

    #[test]
    fn mutating_a_read_transaction_fails() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let mut tx = db.read_tx();
        let err = tx.create_collection(b"c").unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::WriteInsideReadTx)
        );

        let err = tx.delete_collection(b"c").unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::WriteInsideReadTx)
        );
    }

    #[test]
    fn later_reads_observe_earlier_writes_in_same_tx() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let mut tx = db.write_tx();
        {
            let mut c = tx.create_collection(b"c").unwrap();
            c.put(b"k", b"v1").unwrap();
            assert_eq!(c.find(b"k").unwrap().value(), b"v1");

            c.put(b"k", b"v2").unwrap();
            assert_eq!(c.find(b"k").unwrap().value(), b"v2");
        }
        tx.commit().unwrap();
    }

    #[test]
    fn committed_state_survives_new_transaction() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let mut tx = db.write_tx();
        tx.create_collection(b"c")
            .unwrap()
            .put(b"k", b"v")
            .unwrap();
        tx.commit().unwrap();

        let mut tx = db.read_tx();
        let item = tx.get_collection(b"c").unwrap().find(b"k").unwrap();
        assert_eq!(item.value(), b"v");
        tx.commit().unwrap();
    }

    #[test]
    fn rollback_discards_buffered_writes() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let mut tx = db.write_tx();
        tx.create_collection(b"ghost")
            .unwrap()
            .put(b"k", b"v")
            .unwrap();
        tx.rollback();

        let mut tx = db.read_tx();
        let err = tx.get_collection(b"ghost").unwrap_err();
        assert_eq!(err.downcast_ref::<Error>(), Some(&Error::NotFound));
    }

    #[test]
    fn dropping_an_uncommitted_write_tx_behaves_like_rollback() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        {
            let mut tx = db.write_tx();
            tx.create_collection(b"ghost").unwrap();
            // dropped without commit
        }

        let mut tx = db.read_tx();
        assert!(tx.get_collection(b"ghost").is_err());
    }

    #[test]
    fn rollback_returns_allocated_pages_lifo() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let mut tx = db.write_tx();
        let mut allocated = Vec::new();
        for _ in 0..5 {
            let node = tx.new_node(Vec::new(), Vec::new()).unwrap();
            allocated.push(node.page_num);
        }
        tx.rollback();

        let mut tx = db.write_tx();
        let mut reused = Vec::new();
        for _ in 0..5 {
            reused.push(tx.new_node(Vec::new(), Vec::new()).unwrap().page_num);
        }

        let expected: Vec<u64> = allocated.iter().rev().copied().collect();
        assert_eq!(reused, expected);
        tx.rollback();
    }

    #[test]
    fn delete_node_evicts_dirty_copy() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let mut tx = db.write_tx();
        let node = tx.new_node(Vec::new(), Vec::new()).unwrap();
        tx.write_node(&node).unwrap();
        tx.delete_node(node.page_num);

        assert!(tx.dirty_nodes.is_empty());
        assert_eq!(tx.pages_to_delete, vec![node.page_num]);
        tx.rollback();
    }

    #[test]
    fn read_commit_is_a_lock_release_only() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);

        let tx = db.read_tx();
        tx.commit().unwrap();

        // The exclusive lock is available again.
        let tx = db.write_tx();
        tx.rollback();
    }
}
