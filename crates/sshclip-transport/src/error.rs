//! Transport-level errors.

use thiserror::Error;

/// Errors raised while dialing, accepting, or multiplexing a session.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The underlying network operation failed. Callers in the supervisor
    /// treat this kind as transient and eligible for reconnect-with-backoff.
    #[error("transport network error: {0}")]
    Network(#[from] std::io::Error),

    /// The peer closed the connection (or a multiplexed channel on it)
    /// before the requested channel could be opened.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// The peer's channel-open handshake did not match what we sent.
    #[error("channel handshake failed: expected {expected:?}, got {actual:?}")]
    HandshakeMismatch {
        /// The channel name we requested.
        expected: String,
        /// The channel name the peer echoed back.
        actual: String,
    },
}

impl TransportError {
    /// True if this is a plain network failure rather than a protocol
    /// violation — used by the supervisor to decide reconnect vs. abort.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::ChannelClosed(_))
    }
}
