//! Wire framing for the sshclip register-synchronization protocol.
//!
//! A frame is `[protocol:u8][op:u8][op-specific fields]`. Requests
//! (`GET`/`PUT`/`LIST`/`STOP`) flow from a client to a peer; responses
//! (`OK`/`ERR`) flow back. All multi-byte integers are big endian. This
//! crate only knows how to read and write bytes on an `AsyncRead`/
//! `AsyncWrite` pair — it has no opinion about sockets, TLS, or what a
//! "register" means beyond its 8-bit index and attribute byte.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod io;
mod op;
mod record;
mod request;
mod response;

pub use error::ProtocolError;
pub use op::Op;
pub use record::{ItemHashRecord, RECORD_LEN};
pub use request::Request;
pub use response::{OkBody, Response, ResponseShape};

/// Current protocol version. A peer whose version byte is lower is
/// [`ProtocolError::OutOfDate`].
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum payload size: 2^23 - 1 bytes, just under 8 MiB.
pub const MAX_PAYLOAD: usize = (1 << 23) - 1;

/// Result type alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
