//! The `SYNC` out-of-band payload and `LIST` response entries.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::io::{read_exact, write_all};
use crate::Result;

/// Content-addressed metadata for one register, without the payload itself.
///
/// Carried by `LIST` responses (one per present register) and by the
/// out-of-band `SYNC` push hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHashRecord {
    /// The register this record describes.
    pub reg: u8,
    /// BLAKE2b-256 digest of the register's current payload.
    pub content_hash: [u8; 32],
    /// Nanoseconds since the Unix epoch at which this value was written.
    pub created_at_nanos: i64,
}

/// Wire size of an [`ItemHashRecord`]: `reg(1) + content_hash(32) + created_at_nanos(8)`.
pub const RECORD_LEN: usize = 1 + 32 + 8;

impl ItemHashRecord {
    /// Encode this record into its fixed 41-byte wire representation.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0] = self.reg;
        buf[1..33].copy_from_slice(&self.content_hash);
        buf[33..41].copy_from_slice(&self.created_at_nanos.to_be_bytes());
        buf
    }

    /// Decode a record from its fixed 41-byte wire representation.
    #[must_use]
    pub fn decode(buf: &[u8; RECORD_LEN]) -> Self {
        let mut content_hash = [0u8; 32];
        content_hash.copy_from_slice(&buf[1..33]);
        let mut nanos = [0u8; 8];
        nanos.copy_from_slice(&buf[33..41]);
        Self {
            reg: buf[0],
            content_hash,
            created_at_nanos: i64::from_be_bytes(nanos),
        }
    }

    /// Write this record to an async stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ProtocolError::Io`] if the underlying write fails.
    pub async fn write(&self, w: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
        write_all(w, &self.encode()).await
    }

    /// Read a record from an async stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ProtocolError::ShortRead`] if the stream ends before
    /// 41 bytes are available, or [`crate::ProtocolError::Io`] on other I/O
    /// failure.
    pub async fn read(r: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        let mut buf = [0u8; RECORD_LEN];
        read_exact(r, &mut buf).await?;
        Ok(Self::decode(&buf))
    }
}
