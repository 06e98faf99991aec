//! # Error Kinds
//!
//! Typed error values surfaced by the public API. The crate propagates all
//! failures as `eyre::Result`, with rich context attached at each layer; the
//! variants below are the subset a caller is expected to match on, recovered
//! with `Report::downcast_ref::<Error>()`.
//!
//! I/O errors and format violations carry their own context (file path, page
//! number) and are not wrapped in these variants; they surface as the
//! underlying `std::io::Error` or as an `InvalidMagic` for an unrecognizable
//! database file.

use thiserror::Error;

/// Maximum key length in bytes. The on-disk cell format stores the key
/// length in a single byte.
pub const MAX_KEY_SIZE: usize = 255;

/// Maximum value length in bytes. The on-disk cell format stores the value
/// length in a single byte.
pub const MAX_VALUE_SIZE: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A mutating operation was issued on a read transaction.
    #[error("write operation attempted inside a read transaction")]
    WriteInsideReadTx,

    /// A `find` or `get_collection` target is absent.
    #[error("key not found")]
    NotFound,

    /// A key longer than [`MAX_KEY_SIZE`] was passed to `put`.
    #[error("key length {0} exceeds the 255-byte format limit")]
    KeyTooLarge(usize),

    /// A value longer than [`MAX_VALUE_SIZE`] was passed to `put`.
    #[error("value length {0} exceeds the 255-byte format limit")]
    ValueTooLarge(usize),

    /// The meta page does not start with the expected magic number. The
    /// database refuses to proceed.
    #[error("invalid magic number in meta page: {0:#010x}")]
    InvalidMagic(u32),

    /// A timed lock acquisition gave up.
    #[error("timed out waiting for lock")]
    Timeout,

    /// The channel was closed by a peer.
    #[error("channel is closed")]
    ChannelClosed,

    /// `try_send` on a channel at capacity.
    #[error("channel is full")]
    ChannelFull,

    /// `try_recv` on a channel with nothing buffered.
    #[error("channel is empty")]
    ChannelEmpty,
}

impl Error {
    /// True when `report` wraps this exact error kind.
    pub fn is(&self, report: &eyre::Report) -> bool {
        report.downcast_ref::<Error>() == Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_recovers_kind_through_report() {
        let report = eyre::Report::new(Error::NotFound);
        assert_eq!(report.downcast_ref::<Error>(), Some(&Error::NotFound));
        assert!(Error::NotFound.is(&report));
        assert!(!Error::WriteInsideReadTx.is(&report));
    }

    #[test]
    fn display_names_the_limit() {
        let msg = Error::KeyTooLarge(300).to_string();
        assert!(msg.contains("300"));
        assert!(msg.contains("255"));
    }
}
