//! # Meta Page
//!
//! Page 0 of every database file holds the meta record: a magic number
//! identifying the file format, the page number of the root of the
//! collections tree, and the page number where the free list is persisted.
//!
//! ## Layout (big-endian, 20 bytes at offset 0)
//!
//! ```text
//! Offset  Size  Field           Description
//! ------  ----  --------------  -------------------------------------
//! 0       4     magic           0xD00DB00D
//! 4       8     root            Page of the collections tree root node
//! 12      8     free_list_page  Page holding the serialized free list
//! ```
//!
//! The rest of the page is zero. A magic mismatch on open is fatal: the file
//! is not one of ours (or is corrupted) and the database refuses to proceed.

use eyre::{ensure, Result};
use zerocopy::big_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::Error;

/// Magic number at the start of the meta page.
pub const MAGIC: u32 = 0xD00D_B00D;

/// Serialized size of the meta record.
pub const META_SIZE: usize = 20;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct MetaHeader {
    magic: U32,
    root: U64,
    free_list_page: U64,
}

const _: () = assert!(std::mem::size_of::<MetaHeader>() == META_SIZE);

/// The in-memory meta record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Meta {
    /// Page of the root node of the collections tree.
    pub root: u64,
    /// Page where the free list is serialized.
    pub free_list_page: u64,
}

impl Meta {
    pub fn serialize(&self, buf: &mut [u8]) -> Result<()> {
        ensure!(
            buf.len() >= META_SIZE,
            "buffer too small for meta record: {} < {}",
            buf.len(),
            META_SIZE
        );

        let header = MetaHeader {
            magic: U32::new(MAGIC),
            root: U64::new(self.root),
            free_list_page: U64::new(self.free_list_page),
        };
        buf[..META_SIZE].copy_from_slice(header.as_bytes());
        Ok(())
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() >= META_SIZE,
            "buffer too small for meta record: {} < {}",
            buf.len(),
            META_SIZE
        );

        let header = MetaHeader::ref_from_bytes(&buf[..META_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse meta record: {:?}", e))?;

        let magic = header.magic.get();
        if magic != MAGIC {
            return Err(Error::InvalidMagic(magic).into());
        }

        Ok(Self {
            root: header.root.get(),
            free_list_page: header.free_list_page.get(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_writes_magic_big_endian() {
        let meta = Meta {
            root: 2,
            free_list_page: 1,
        };
        let mut buf = [0u8; META_SIZE];
        meta.serialize(&mut buf).unwrap();

        assert_eq!(&buf[0..4], &[0xD0, 0x0D, 0xB0, 0x0D]);
        assert_eq!(&buf[4..12], &2u64.to_be_bytes());
        assert_eq!(&buf[12..20], &1u64.to_be_bytes());
    }

    #[test]
    fn round_trip_preserves_fields() {
        let meta = Meta {
            root: 42,
            free_list_page: 7,
        };
        let mut buf = [0u8; 64];
        meta.serialize(&mut buf).unwrap();

        let decoded = Meta::deserialize(&buf).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut buf = [0u8; META_SIZE];
        buf[0] = 0xAA;

        let err = Meta::deserialize(&buf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidMagic(_))
        ));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let meta = Meta::default();
        let mut buf = [0u8; 10];
        assert!(meta.serialize(&mut buf).is_err());
        assert!(Meta::deserialize(&buf).is_err());
    }
}
