//! # Data Access Layer
//!
//! The DAL owns the backing file and everything that maps between on-disk
//! pages and in-memory structures: positional page I/O, node and meta and
//! free-list (de)serialization, page allocation through the free list, and
//! the fill-threshold arithmetic the tree uses to decide when to split or
//! rebalance.
//!
//! ## File Bootstrap
//!
//! Creating a database writes three pages:
//!
//! 1. the free list, at the first page the (brand new) free list hands out;
//! 2. an empty leaf that becomes the root of the collections tree;
//! 3. the meta record at page 0, pointing at both.
//!
//! Opening an existing file reads the meta record (validating the magic
//! number; a mismatch is fatal) and then the free list from the page meta
//! names.
//!
//! ## I/O Model
//!
//! All I/O is synchronous positional I/O (`read_exact_at`/`write_all_at`) at
//! `page_num * page_size`. Each call owns its buffer; nothing is cached at
//! this layer. Higher layers buffer mutations in a transaction's dirty map
//! and only come here on fault or commit.
//!
//! ## Thread Safety
//!
//! The DAL is not synchronized. The database wraps it in a reader-writer
//! lock: reads happen under the shared side, every mutation under the
//! exclusive side.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};

use super::freelist::FreeList;
use super::meta::Meta;
use super::page::{Page, META_PAGE_NUM};
use crate::btree::node::{Node, NODE_HEADER_SIZE};
use crate::db::Options;

#[derive(Debug)]
pub struct Dal {
    file: File,
    path: PathBuf,
    page_size: usize,
    min_fill_percent: f32,
    max_fill_percent: f32,
    pub meta: Meta,
    pub freelist: FreeList,
}

impl Dal {
    /// Opens the database file at `path`, creating and bootstrapping it if
    /// it does not exist.
    pub fn open(path: &Path, options: &Options) -> Result<Self> {
        if path.exists() {
            Self::open_existing(path, options)
        } else {
            Self::create(path, options)
        }
    }

    fn create(path: &Path, options: &Options) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create database file '{}'", path.display()))?;

        let mut dal = Self {
            file,
            path: path.to_path_buf(),
            page_size: options.page_size,
            min_fill_percent: options.min_fill_percent,
            max_fill_percent: options.max_fill_percent,
            meta: Meta::default(),
            freelist: FreeList::new(),
        };

        dal.meta.free_list_page = dal.freelist.get_next_page();
        dal.write_freelist()?;

        let mut root = Node::new(Vec::new(), Vec::new());
        dal.write_node(&mut root)?;
        dal.meta.root = root.page_num;
        dal.write_meta()?;

        log::debug!(
            "created database '{}' (page_size={}, root={}, free_list_page={})",
            path.display(),
            dal.page_size,
            dal.meta.root,
            dal.meta.free_list_page
        );
        Ok(dal)
    }

    fn open_existing(path: &Path, options: &Options) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        let mut dal = Self {
            file,
            path: path.to_path_buf(),
            page_size: options.page_size,
            min_fill_percent: options.min_fill_percent,
            max_fill_percent: options.max_fill_percent,
            meta: Meta::default(),
            freelist: FreeList::new(),
        };

        dal.meta = dal.read_meta()?;
        dal.freelist = dal.read_freelist()?;

        log::debug!(
            "opened database '{}' (root={}, free_list_page={}, max_page={}, released={})",
            path.display(),
            dal.meta.root,
            dal.meta.free_list_page,
            dal.freelist.max_page(),
            dal.freelist.released().len()
        );
        Ok(dal)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    // ---- raw page I/O ----

    pub fn read_page(&self, page_num: u64) -> Result<Page> {
        let mut page = Page::empty(page_num, self.page_size);
        let offset = page.offset(self.page_size);
        self.file
            .read_exact_at(&mut page.data, offset)
            .wrap_err_with(|| {
                format!(
                    "failed to read page {} of '{}'",
                    page_num,
                    self.path.display()
                )
            })?;
        Ok(page)
    }

    pub fn write_page(&mut self, page: &Page) -> Result<()> {
        ensure!(
            page.data.len() == self.page_size,
            "page {} buffer is {} bytes, page size is {}",
            page.num,
            page.data.len(),
            self.page_size
        );
        self.file
            .write_all_at(&page.data, page.offset(self.page_size))
            .wrap_err_with(|| {
                format!(
                    "failed to write page {} of '{}'",
                    page.num,
                    self.path.display()
                )
            })
    }

    // ---- nodes ----

    pub fn read_node(&self, page_num: u64) -> Result<Node> {
        ensure!(
            page_num != META_PAGE_NUM,
            "page 0 holds the meta record, not a node"
        );
        let page = self.read_page(page_num)?;
        Node::deserialize(page_num, &page.data)
    }

    /// Serializes `node` to its page, assigning a fresh page from the free
    /// list first when the node has none yet.
    pub fn write_node(&mut self, node: &mut Node) -> Result<()> {
        if node.page_num == 0 {
            node.page_num = self.freelist.get_next_page();
        }
        let mut page = Page::empty(node.page_num, self.page_size);
        node.serialize(&mut page.data)?;
        self.write_page(&page)
    }

    /// Returns a node's page to the free list.
    pub fn delete_node(&mut self, page_num: u64) {
        self.freelist.release_page(page_num);
    }

    // ---- free list & meta ----

    pub fn read_freelist(&self) -> Result<FreeList> {
        ensure!(
            self.meta.free_list_page != META_PAGE_NUM,
            "meta record does not name a free list page"
        );
        let page = self.read_page(self.meta.free_list_page)?;
        FreeList::deserialize(&page.data)
    }

    pub fn write_freelist(&mut self) -> Result<()> {
        let mut page = Page::empty(self.meta.free_list_page, self.page_size);
        self.freelist.serialize(&mut page.data)?;
        self.write_page(&page)
    }

    pub fn read_meta(&self) -> Result<Meta> {
        let page = self.read_page(META_PAGE_NUM)?;
        Meta::deserialize(&page.data)
    }

    pub fn write_meta(&mut self) -> Result<()> {
        let mut page = Page::empty(META_PAGE_NUM, self.page_size);
        self.meta.serialize(&mut page.data)?;
        self.write_page(&page)
    }

    // ---- fill thresholds ----

    pub fn max_threshold(&self) -> f32 {
        self.max_fill_percent * self.page_size as f32
    }

    pub fn min_threshold(&self) -> f32 {
        self.min_fill_percent * self.page_size as f32
    }

    pub fn is_over_populated(&self, node: &Node) -> bool {
        node.node_size() as f32 > self.max_threshold()
    }

    pub fn is_under_populated(&self, node: &Node) -> bool {
        (node.node_size() as f32) < self.min_threshold()
    }

    /// First index at which `node` can be cut so the left part keeps at
    /// least the minimum fill with items remaining on the right. `None`
    /// means the node holds no spare content: it can neither be split nor
    /// donate an item to a sibling.
    pub fn get_split_index(&self, node: &Node) -> Option<usize> {
        let mut size = NODE_HEADER_SIZE;
        for i in 0..node.items.len() {
            size += node.element_size(i);
            if size as f32 > self.min_threshold() && i < node.items.len() - 1 {
                return Some(i + 1);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::item::Item;
    use tempfile::tempdir;

    fn test_options() -> Options {
        Options {
            page_size: 4096,
            min_fill_percent: 0.5,
            max_fill_percent: 0.9,
        }
    }

    fn create_dal(dir: &tempfile::TempDir) -> Dal {
        Dal::open(&dir.path().join("test.db"), &test_options()).unwrap()
    }

    #[test]
    fn create_bootstraps_freelist_root_and_meta() {
        let dir = tempdir().unwrap();
        let dal = create_dal(&dir);

        assert_eq!(dal.meta.free_list_page, 1);
        assert_eq!(dal.meta.root, 2);

        let root = dal.read_node(dal.meta.root).unwrap();
        assert!(root.is_leaf());
        assert!(root.items.is_empty());
    }

    #[test]
    fn reopen_reads_back_meta_and_freelist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let (root, max_page) = {
            let dal = Dal::open(&path, &test_options()).unwrap();
            (dal.meta.root, dal.freelist.max_page())
        };

        let dal = Dal::open(&path, &test_options()).unwrap();
        assert_eq!(dal.meta.root, root);
        assert_eq!(dal.freelist.max_page(), max_page);
    }

    #[test]
    fn open_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, vec![0xFFu8; 8192]).unwrap();

        let err = Dal::open(&path, &test_options()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::Error>(),
            Some(crate::error::Error::InvalidMagic(_))
        ));
    }

    #[test]
    fn page_round_trip() {
        let dir = tempdir().unwrap();
        let mut dal = create_dal(&dir);

        let num = dal.freelist.get_next_page();
        let mut page = Page::empty(num, dal.page_size());
        page.data[0..4].copy_from_slice(b"shrd");
        dal.write_page(&page).unwrap();

        let back = dal.read_page(num).unwrap();
        assert_eq!(back, page);
    }

    #[test]
    fn write_node_assigns_page_on_first_write() {
        let dir = tempdir().unwrap();
        let mut dal = create_dal(&dir);

        let mut node = Node::new(vec![Item::new(b"k", b"v")], Vec::new());
        assert_eq!(node.page_num, 0);

        dal.write_node(&mut node).unwrap();
        assert_ne!(node.page_num, 0);

        let back = dal.read_node(node.page_num).unwrap();
        assert_eq!(back.items, node.items);
    }

    #[test]
    fn deleted_pages_go_back_to_the_freelist() {
        let dir = tempdir().unwrap();
        let mut dal = create_dal(&dir);

        let mut node = Node::new(vec![Item::new(b"k", b"v")], Vec::new());
        dal.write_node(&mut node).unwrap();
        dal.delete_node(node.page_num);

        assert_eq!(dal.freelist.get_next_page(), node.page_num);
    }

    #[test]
    fn thresholds_scale_with_page_size() {
        let dir = tempdir().unwrap();
        let dal = create_dal(&dir);

        assert_eq!(dal.max_threshold(), 0.9 * 4096.0);
        assert_eq!(dal.min_threshold(), 0.5 * 4096.0);
    }

    #[test]
    fn small_node_is_neither_over_nor_under_split() {
        let dir = tempdir().unwrap();
        let dal = create_dal(&dir);

        let node = Node::new(vec![Item::new(b"k", b"v")], Vec::new());
        assert!(!dal.is_over_populated(&node));
        assert!(dal.is_under_populated(&node));
        assert_eq!(dal.get_split_index(&node), None);
    }

    #[test]
    fn split_index_is_the_first_cut_past_minimum_fill() {
        let dir = tempdir().unwrap();
        let dal = create_dal(&dir);

        // 30 items of 218 bytes each against a 2048-byte minimum threshold.
        let items: Vec<Item> = (0..30)
            .map(|i| Item::new(format!("key{:03}", i).as_bytes(), &[0xAB; 200]))
            .collect();
        let node = Node::new(items, Vec::new());

        assert!(dal.is_over_populated(&node));
        let split = dal.get_split_index(&node).unwrap();
        assert!(split > 0 && split < node.items.len());

        // The prefix up to the cut is past the minimum; one item earlier it
        // was not.
        let prefix = |count: usize| -> usize {
            NODE_HEADER_SIZE + (0..count).map(|i| node.element_size(i)).sum::<usize>()
        };
        assert!((prefix(split) as f32) > dal.min_threshold());
        assert!((prefix(split - 1) as f32) <= dal.min_threshold());
    }

    #[test]
    fn freelist_survives_write_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dal = Dal::open(&path, &test_options()).unwrap();
            let p = dal.freelist.get_next_page();
            dal.freelist.release_page(p);
            dal.write_freelist().unwrap();
        }

        let dal = Dal::open(&path, &test_options()).unwrap();
        assert_eq!(dal.freelist.released().len(), 1);
    }
}
