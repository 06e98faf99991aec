//! # Collection
//!
//! A collection is a named B-tree: a root page, a monotonic id counter, and
//! the name under which its 16-byte record (`root || counter`, big-endian)
//! is stored in the collections tree. The collections tree itself is the
//! nameless catalog collection whose root lives in the meta record, so
//! "collection of collections" bottoms out after one level.
//!
//! ## Rebalancing
//!
//! `put` and `remove` first mutate the target node found by descending from
//! the root, then walk the recorded ancestor path from the deepest level
//! upward: an over-populated child is split by its parent, an
//! under-populated child borrows from a sibling through the parent
//! (rotate right, then rotate left) or merges with one. A root that
//! overflows is pushed down under a fresh root; a root left with no items
//! and a single child is collapsed away and its page released.
//!
//! ## Record Write-Back
//!
//! Whenever an operation moves this collection's root or mints an id, the
//! record in the collections tree is rewritten through the owning
//! transaction. When the collections tree's own root moves, the
//! transaction's meta root is updated instead; that is the catalog's
//! "record".

use eyre::{ensure, Result};

use super::item::Item;
use super::node::{Ancestors, SearchResult};
use crate::error::Error;
use crate::tx::Tx;

/// Serialized size of a collection record: two big-endian u64s.
pub const COLLECTION_RECORD_SIZE: usize = 16;

/// A named B-tree handle, borrowing the transaction it lives in.
pub struct Collection<'tx, 'db> {
    tx: &'tx mut Tx<'db>,
    name: Vec<u8>,
    root: u64,
    counter: u64,
}

impl std::fmt::Debug for Collection<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("counter", &self.counter)
            .finish()
    }
}

impl<'tx, 'db> Collection<'tx, 'db> {
    /// The collections tree itself.
    pub(crate) fn catalog(tx: &'tx mut Tx<'db>) -> Self {
        let root = tx.catalog_root();
        Self {
            tx,
            name: Vec::new(),
            root,
            counter: 0,
        }
    }

    pub(crate) fn named(tx: &'tx mut Tx<'db>, name: &[u8], root: u64, counter: u64) -> Self {
        Self {
            tx,
            name: name.to_vec(),
            root,
            counter,
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> u64 {
        self.root
    }

    pub(crate) fn serialize_record(root: u64, counter: u64) -> [u8; COLLECTION_RECORD_SIZE] {
        let mut record = [0u8; COLLECTION_RECORD_SIZE];
        record[..8].copy_from_slice(&root.to_be_bytes());
        record[8..].copy_from_slice(&counter.to_be_bytes());
        record
    }

    pub(crate) fn deserialize_record(record: &[u8]) -> Result<(u64, u64)> {
        ensure!(
            record.len() == COLLECTION_RECORD_SIZE,
            "collection record is {} bytes, expected {}",
            record.len(),
            COLLECTION_RECORD_SIZE
        );
        let mut root = [0u8; 8];
        let mut counter = [0u8; 8];
        root.copy_from_slice(&record[..8]);
        counter.copy_from_slice(&record[8..]);
        Ok((u64::from_be_bytes(root), u64::from_be_bytes(counter)))
    }

    /// Returns the next id for this collection and advances the counter.
    /// On a read transaction ids cannot be minted and 0 is returned.
    pub fn id(&mut self) -> Result<u64> {
        if !self.tx.is_write() {
            return Ok(0);
        }
        let id = self.counter;
        self.counter += 1;
        self.persist_record()?;
        Ok(id)
    }

    // ---- lookup ----

    /// Finds the item stored under `key`, or [`Error::NotFound`].
    pub fn find(&self, key: &[u8]) -> Result<Item> {
        if self.root == 0 {
            return Err(Error::NotFound.into());
        }
        let root = self.tx.get_node(self.root)?;
        let (result, node, _) = root.find_key(&*self.tx, key)?;
        match result {
            SearchResult::Found(index) => Ok(node.items[index].clone()),
            SearchResult::NotFound(_) => Err(Error::NotFound.into()),
        }
    }

    // ---- insertion ----

    /// Inserts `key → value`, overwriting an existing binding, then splits
    /// any over-populated node on the path from the leaf back to the root.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tx.ensure_write()?;
        let item = Item::checked(key, value)?;
        let prev_root = self.root;

        if self.root == 0 {
            let node = self.tx.new_node(vec![item], Vec::new())?;
            self.tx.write_node(&node)?;
            self.root = node.page_num;
        } else {
            let root = self.tx.get_node(self.root)?;
            let (result, mut target, ancestors) = root.find_key(self.tx, key)?;
            match result {
                SearchResult::Found(index) => target.items[index] = item,
                SearchResult::NotFound(index) => target.items.insert(index, item),
            }
            self.tx.write_node(&target)?;

            let pages = self.path_pages(&ancestors)?;
            for i in (1..pages.len()).rev() {
                let mut parent = self.tx.get_node(pages[i - 1])?;
                let child = self.tx.get_node(pages[i])?;
                if self.tx.is_over_populated(&child) {
                    parent.split(self.tx, child, ancestors[i])?;
                }
            }

            let root_node = self.tx.get_node(self.root)?;
            if self.tx.is_over_populated(&root_node) {
                let mut new_root = self.tx.new_node(Vec::new(), vec![root_node.page_num])?;
                new_root.split(self.tx, root_node, 0)?;
                self.root = new_root.page_num;
            }
        }

        if self.root != prev_root {
            self.persist_record()?;
        }
        Ok(())
    }

    // ---- deletion ----

    /// Removes `key` if present, then rebalances any under-populated node on
    /// the affected path and collapses an emptied root.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.tx.ensure_write()?;
        if self.root == 0 {
            return Ok(());
        }
        let prev_root = self.root;

        let root = self.tx.get_node(self.root)?;
        let (result, mut target, mut ancestors) = root.find_key(self.tx, key)?;
        let SearchResult::Found(index) = result else {
            return Ok(());
        };

        if target.is_leaf() {
            target.items.remove(index);
            self.tx.write_node(&target)?;
        } else {
            // The inorder predecessor fills the hole; its path joins the
            // rebalance walk below.
            let affected = target.remove_item_from_internal(self.tx, index)?;
            ancestors.extend(affected);
        }

        let pages = self.path_pages(&ancestors)?;
        for i in (1..pages.len()).rev() {
            let mut parent = self.tx.get_node(pages[i - 1])?;
            let child = self.tx.get_node(pages[i])?;
            if self.tx.is_under_populated(&child) {
                parent.rebalance_remove(self.tx, child, ancestors[i])?;
            }
        }

        let root_node = self.tx.get_node(self.root)?;
        if root_node.items.is_empty() && !root_node.children.is_empty() {
            self.root = root_node.children[0];
            self.tx.delete_node(root_node.page_num);
        }

        if self.root != prev_root {
            self.persist_record()?;
        }
        Ok(())
    }

    // ---- internals ----

    /// Page numbers along the descent recorded in `ancestors`, root first.
    /// These stay valid through the rebalance walk: splits allocate new
    /// right siblings and merges delete children, but a path node keeps its
    /// page while its subtree is reshaped below it.
    fn path_pages(&self, ancestors: &Ancestors) -> Result<Vec<u64>> {
        let mut pages = Vec::with_capacity(ancestors.len());
        let mut node = self.tx.get_node(self.root)?;
        pages.push(node.page_num);

        for &child_index in &ancestors[1..] {
            let page = node.children.get(child_index).copied().ok_or_else(|| {
                eyre::eyre!(
                    "node {}: ancestor child index {} out of bounds ({} children)",
                    node.page_num,
                    child_index,
                    node.children.len()
                )
            })?;
            node = self.tx.get_node(page)?;
            pages.push(page);
        }
        Ok(pages)
    }

    fn persist_record(&mut self) -> Result<()> {
        if self.name.is_empty() {
            self.tx.set_catalog_root(self.root);
            return Ok(());
        }
        self.tx.put_catalog_record(&self.name, self.root, self.counter)
    }
}
