//! The request handler (C3) and listen loop (C7) for the register
//! synchronization server.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod handler;
mod listen;

pub use error::{HandlerError, ListenError};
pub use handler::{serve_connection, STOP_REQUESTED};
pub use listen::{run_local, run_tcp};
