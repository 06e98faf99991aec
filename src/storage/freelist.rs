//! # Free List
//!
//! The free list hands out page numbers. It tracks a high-water mark
//! (`max_page`, the highest page number ever allocated) and the list of
//! pages released back by deleted nodes. Released pages are reused before
//! the file is grown, which keeps file growth bounded and favors pages the
//! OS cache has seen recently.
//!
//! ## Allocation Discipline
//!
//! - `get_next_page` pops the most recently released page (LIFO). Only when
//!   no released page exists does it bump the high-water mark, growing the
//!   file by one page.
//! - `release_page` pushes onto the released list; nothing is written to
//!   disk until the owning transaction commits.
//!
//! ## Wire Format (big-endian)
//!
//! ```text
//! Offset  Size  Field      Description
//! ------  ----  ---------  -----------------------------------
//! 0       2     max_page   High-water mark
//! 2       2     count      Number of released page numbers
//! 4       8*N   released   Released page numbers, oldest first
//! ```
//!
//! The u16 widths cap a file at 65535 pages. That cap is part of the format:
//! serialization fails loudly rather than truncating when it is exceeded.

use eyre::{ensure, Result};
use zerocopy::big_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::page::META_PAGE_NUM;

pub const PAGE_NUM_SIZE: usize = 8;
pub const FREELIST_HEADER_SIZE: usize = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct FreeListHeader {
    max_page: U16,
    count: U16,
}

const _: () = assert!(std::mem::size_of::<FreeListHeader>() == FREELIST_HEADER_SIZE);

/// Allocator of page numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeList {
    max_page: u64,
    released: Vec<u64>,
}

impl FreeList {
    /// An empty free list. The high-water mark starts at the meta page, so
    /// the first allocation returns page 1.
    pub fn new() -> Self {
        Self {
            max_page: META_PAGE_NUM,
            released: Vec::new(),
        }
    }

    pub fn max_page(&self) -> u64 {
        self.max_page
    }

    pub fn released(&self) -> &[u64] {
        &self.released
    }

    /// Pops the most recently released page, or grows the high-water mark.
    pub fn get_next_page(&mut self) -> u64 {
        if let Some(page) = self.released.pop() {
            return page;
        }
        self.max_page += 1;
        self.max_page
    }

    /// Returns a page to the pool for reuse.
    pub fn release_page(&mut self, page: u64) {
        self.released.push(page);
    }

    pub fn serialize(&self, buf: &mut [u8]) -> Result<()> {
        ensure!(
            self.max_page <= u16::MAX as u64,
            "free list high-water mark {} exceeds the 65535-page format cap",
            self.max_page
        );
        ensure!(
            self.released.len() <= u16::MAX as usize,
            "released-page count {} exceeds the 65535-entry format cap",
            self.released.len()
        );

        let needed = FREELIST_HEADER_SIZE + self.released.len() * PAGE_NUM_SIZE;
        ensure!(
            buf.len() >= needed,
            "buffer too small for free list: {} < {}",
            buf.len(),
            needed
        );

        let header = FreeListHeader {
            max_page: U16::new(self.max_page as u16),
            count: U16::new(self.released.len() as u16),
        };
        buf[..FREELIST_HEADER_SIZE].copy_from_slice(header.as_bytes());

        let mut pos = FREELIST_HEADER_SIZE;
        for &page in &self.released {
            buf[pos..pos + PAGE_NUM_SIZE].copy_from_slice(&page.to_be_bytes());
            pos += PAGE_NUM_SIZE;
        }
        Ok(())
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() >= FREELIST_HEADER_SIZE,
            "buffer too small for free list header: {} < {}",
            buf.len(),
            FREELIST_HEADER_SIZE
        );

        let header = FreeListHeader::ref_from_bytes(&buf[..FREELIST_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse free list header: {:?}", e))?;

        let count = header.count.get() as usize;
        let needed = FREELIST_HEADER_SIZE + count * PAGE_NUM_SIZE;
        ensure!(
            buf.len() >= needed,
            "free list truncated: {} entries need {} bytes, page has {}",
            count,
            needed,
            buf.len()
        );

        let mut released = Vec::with_capacity(count);
        let mut pos = FREELIST_HEADER_SIZE;
        for _ in 0..count {
            let mut raw = [0u8; PAGE_NUM_SIZE];
            raw.copy_from_slice(&buf[pos..pos + PAGE_NUM_SIZE]);
            released.push(u64::from_be_bytes(raw));
            pos += PAGE_NUM_SIZE;
        }

        Ok(Self {
            max_page: header.max_page.get() as u64,
            released,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_allocation_skips_the_meta_page() {
        let mut freelist = FreeList::new();
        assert_eq!(freelist.get_next_page(), 1);
        assert_eq!(freelist.get_next_page(), 2);
        assert_eq!(freelist.max_page(), 2);
    }

    #[test]
    fn released_pages_are_reused_lifo() {
        let mut freelist = FreeList::new();
        for _ in 0..5 {
            freelist.get_next_page();
        }

        freelist.release_page(2);
        freelist.release_page(4);

        assert_eq!(freelist.get_next_page(), 4);
        assert_eq!(freelist.get_next_page(), 2);
        assert_eq!(freelist.get_next_page(), 6);
    }

    #[test]
    fn release_does_not_move_high_water_mark() {
        let mut freelist = FreeList::new();
        freelist.get_next_page();
        freelist.get_next_page();
        freelist.release_page(1);

        assert_eq!(freelist.max_page(), 2);
    }

    #[test]
    fn round_trip_preserves_order() {
        let mut freelist = FreeList::new();
        for _ in 0..10 {
            freelist.get_next_page();
        }
        freelist.release_page(3);
        freelist.release_page(7);
        freelist.release_page(5);

        let mut buf = [0u8; 256];
        freelist.serialize(&mut buf).unwrap();
        let decoded = FreeList::deserialize(&buf).unwrap();

        assert_eq!(decoded, freelist);
        assert_eq!(decoded.released(), &[3, 7, 5]);
    }

    #[test]
    fn serialized_layout_is_big_endian() {
        let mut freelist = FreeList::new();
        freelist.get_next_page();
        freelist.release_page(1);

        let mut buf = [0u8; 64];
        freelist.serialize(&mut buf).unwrap();

        assert_eq!(&buf[0..2], &[0x00, 0x01]);
        assert_eq!(&buf[2..4], &[0x00, 0x01]);
        assert_eq!(&buf[4..12], &1u64.to_be_bytes());
    }

    #[test]
    fn high_water_mark_beyond_cap_refuses_to_serialize() {
        let mut freelist = FreeList::new();
        freelist.max_page = u16::MAX as u64 + 1;

        let mut buf = [0u8; 64];
        assert!(freelist.serialize(&mut buf).is_err());
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut freelist = FreeList::new();
        freelist.release_page(9);
        let mut buf = [0u8; 64];
        freelist.serialize(&mut buf).unwrap();

        assert!(FreeList::deserialize(&buf[..6]).is_err());
    }
}
