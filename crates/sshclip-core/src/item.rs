//! The value stored at a register index, and its content hash.

use blake2::Blake2b;
use blake2::digest::consts::U32;
use blake2::digest::Digest;
use bytes::Bytes;

use sshclip_proto::ItemHashRecord;

bitflags::bitflags! {
    /// Opaque per-item flags describing how a payload was captured.
    ///
    /// The core never interprets these beyond storing and echoing them back;
    /// meaning is assigned by the clipboard-capture layer above it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u8 {
        /// Captured character-wise (a plain run of bytes).
        const CHARACTERWISE = 0b0000_0001;
        /// Captured line-wise (a whole line, including its terminator).
        const LINEWISE = 0b0000_0010;
        /// Captured block-wise (a rectangular visual selection).
        const BLOCKWISE = 0b0000_0100;
        /// The payload is a URL.
        const URL = 0b0000_1000;
    }
}

type Blake2b256 = Blake2b<U32>;

/// BLAKE2b-256 digest of `payload`. The content hash covers the payload only,
/// not the attribute byte.
#[must_use]
pub fn content_hash(payload: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(payload);
    hasher.finalize().into()
}

/// The value stored at one folded register index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterItem {
    /// The folded storage key.
    pub index: u8,
    /// Opaque capture-kind flags.
    pub attrs: Attributes,
    /// The stored value.
    pub payload: Bytes,
    /// BLAKE2b-256 of `payload`, kept in sync with every mutation.
    pub content_hash: [u8; 32],
    /// Nanoseconds since the Unix epoch at which this value was last written.
    pub created_at_nanos: i64,
}

impl RegisterItem {
    /// Build a new item, computing its content hash from `payload`.
    #[must_use]
    pub fn new(index: u8, attrs: Attributes, payload: Bytes, created_at_nanos: i64) -> Self {
        let content_hash = content_hash(&payload);
        Self { index, attrs, payload, content_hash, created_at_nanos }
    }

    /// Compact `{index, content_hash, created_at_nanos}` summary of this item.
    #[must_use]
    pub fn to_hash_record(&self) -> ItemHashRecord {
        ItemHashRecord {
            reg: self.index,
            content_hash: self.content_hash,
            created_at_nanos: self.created_at_nanos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic_and_payload_sensitive() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"hellp"));
        assert_eq!(content_hash(b"").len(), 32);
    }

    #[test]
    fn content_hash_ignores_attributes() {
        let a = RegisterItem::new(b'a', Attributes::CHARACTERWISE, Bytes::from_static(b"hi"), 1);
        let b = RegisterItem::new(b'a', Attributes::URL, Bytes::from_static(b"hi"), 2);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn to_hash_record_copies_hash_and_timestamp() {
        let item = RegisterItem::new(b'a', Attributes::CHARACTERWISE, Bytes::from_static(b"hi"), 42);
        let record = item.to_hash_record();
        assert_eq!(record.reg, b'a');
        assert_eq!(record.content_hash, item.content_hash);
        assert_eq!(record.created_at_nanos, 42);
    }
}
