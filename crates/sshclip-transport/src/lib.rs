//! External interfaces consumed and served by the core (spec §6): the
//! abstract authenticated-transport [`Dialer`]/[`Session`] pair used by the
//! agent supervisor, a plain-TCP reference implementation of it, and the
//! local Unix-domain-socket endpoint the listen loop binds.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod local;
mod session;
pub mod tcp;

pub use error::TransportError;
pub use session::{
    Channel, ChannelStream, Dialer, OutOfBandChannel, OutOfBandRequest, OutOfBandSender,
    ReplySender, Session,
};
