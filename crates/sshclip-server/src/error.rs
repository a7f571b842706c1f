//! Errors raised by the request handler and listen loop.

use thiserror::Error;

/// Errors that can terminate a connection's handler loop.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The frame stream failed in a way that cannot be answered with an
    /// `ERR` response (the write side itself is broken, or the protocol
    /// framing is unrecoverable).
    #[error("protocol error: {0}")]
    Protocol(#[from] sshclip_proto::ProtocolError),
}

/// Errors that can terminate the accept loop.
#[derive(Error, Debug)]
pub enum ListenError {
    /// The underlying transport failed to bind or accept.
    #[error("transport error: {0}")]
    Transport(#[from] sshclip_transport::TransportError),
}
