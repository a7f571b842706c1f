//! Errors raised while talking to the upstream peer and by the supervisor.

use thiserror::Error;

/// Errors raised by a single request/response round-trip against the
/// upstream peer.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The underlying connection failed.
    #[error(transparent)]
    Transport(#[from] sshclip_transport::TransportError),
    /// The frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] sshclip_proto::ProtocolError),
    /// The upstream peer answered with an `ERR` frame.
    #[error("upstream reported an error: {0}")]
    Remote(String),
    /// No upstream connection is currently established.
    #[error("no upstream connection is currently established")]
    NotConnected,
    /// The upstream answered `OK` with a body shape that did not match the
    /// request that was sent.
    #[error("upstream answered with an unexpected response shape")]
    UnexpectedShape,
}

impl UpstreamError {
    /// True if retrying after a reconnect is worth attempting.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_transient(),
            Self::Protocol(err) => err.is_transport(),
            Self::Remote(_) | Self::NotConnected => true,
            Self::UnexpectedShape => false,
        }
    }
}

impl From<UpstreamError> for sshclip_core::StoreError {
    fn from(err: UpstreamError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Errors raised by the agent supervisor's connection lifecycle.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Dialing, opening the logical channel, or the connection itself
    /// failed.
    #[error(transparent)]
    Transport(#[from] sshclip_transport::TransportError),
}

impl SupervisorError {
    /// True if this failure should trigger reconnect-with-backoff rather
    /// than propagating out of `Run` (spec §4.5: only transport errors are
    /// transient; everything else is fatal).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_transient(),
        }
    }
}
