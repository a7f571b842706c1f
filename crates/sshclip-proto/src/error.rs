//! Protocol-level errors.

use thiserror::Error;

/// Errors that can occur while decoding or encoding a frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The peer's protocol byte is lower than [`crate::PROTOCOL_VERSION`].
    #[error("protocol out of date")]
    OutOfDate,

    /// A declared length exceeds [`crate::MAX_PAYLOAD`].
    #[error("payload too large: {size} exceeds max {max}")]
    TooLarge {
        /// The size that was rejected.
        size: usize,
        /// The maximum permitted size.
        max: usize,
    },

    /// Fewer bytes were available than the frame declared.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes the frame claimed.
        expected: usize,
        /// Bytes actually read before the stream ended.
        actual: usize,
    },

    /// The op byte did not match any entry in the opcode table.
    #[error("unknown op: {0:#04x}")]
    UnknownOp(u8),

    /// An error message frame was not valid UTF-8.
    #[error("error message was not valid utf-8: {0}")]
    InvalidErrorText(#[from] std::str::Utf8Error),

    /// Underlying I/O failure (connection reset, broken pipe, EOF mid-frame).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// True if the underlying cause is transport I/O rather than a protocol
    /// violation. Used by callers deciding whether a failure should trigger
    /// reconnect-with-backoff (transient) or be treated as fatal.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ShortRead { .. })
    }
}
