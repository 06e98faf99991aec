//! # Item
//!
//! A key/value pair stored in a B-tree node. Keys are compared
//! lexicographically as unsigned bytes (exactly the ordering `[u8]` gives
//! through `Ord`), and within a node they are strictly increasing.
//!
//! Both the key and the value are defensively copied into owned buffers at
//! construction, so an item never borrows from caller memory or from a page
//! buffer. The single-byte length prefixes of the cell format cap each side
//! at 255 bytes; that limit is enforced where user input enters the tree.

use eyre::Result;

use crate::error::{Error, MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// An owned key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    key: Vec<u8>,
    value: Vec<u8>,
}

impl Item {
    /// Copies `key` and `value` into a fresh item.
    pub fn new(key: &[u8], value: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    /// Like [`Item::new`], but rejects keys and values that do not fit the
    /// single-byte length prefixes of the cell format.
    pub fn checked(key: &[u8], value: &[u8]) -> Result<Self> {
        if key.len() > MAX_KEY_SIZE {
            return Err(Error::KeyTooLarge(key.len()).into());
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(Error::ValueTooLarge(value.len()).into());
        }
        Ok(Self::new(key, value))
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}
