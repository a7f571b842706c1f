//! The protocol's opcode table.

use crate::ProtocolError;

/// Operation codes shared by the request side (`GET`/`PUT`/`LIST`/`STOP`),
/// the response side (`OK`/`ERR`), and the out-of-band sync hint (`SYNC`).
///
/// `ACCEPT`/`REJECT` are reserved wire values from the original protocol's
/// opcode table; no frame producer in this crate emits them. The
/// acknowledgement they would have carried is instead a plain boolean
/// decided at the transport layer (see `sshclip_transport::ReplySender`),
/// since an out-of-band request's reply never shares the main frame
/// stream `sshclip-proto` governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Error response: `length:u24-be | utf8 message`.
    Err = 0,
    /// Success response. Body shape depends on the request it answers.
    Ok = 1,
    /// List all present registers.
    List = 2,
    /// Out-of-band push hint: one [`crate::ItemHashRecord`].
    Sync = 3,
    /// Fetch a register's current value.
    Get = 4,
    /// Store (or append to, for uppercase indices) a register's value.
    Put = 5,
    /// Request orderly shutdown of the receiving peer.
    Stop = 6,
    /// Reserved; not produced by this implementation (see the enum docs).
    Accept = 7,
    /// Reserved; not produced by this implementation (see the enum docs).
    Reject = 8,
}

impl Op {
    /// Encode as the wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Decode from a wire byte. `None` if the byte is outside the table.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Err),
            1 => Some(Self::Ok),
            2 => Some(Self::List),
            3 => Some(Self::Sync),
            4 => Some(Self::Get),
            5 => Some(Self::Put),
            6 => Some(Self::Stop),
            7 => Some(Self::Accept),
            8 => Some(Self::Reject),
            _ => None,
        }
    }

    /// Decode from a wire byte, mapping an unrecognized byte to
    /// [`ProtocolError::UnknownOp`].
    pub fn try_from_u8(byte: u8) -> Result<Self, ProtocolError> {
        Self::from_u8(byte).ok_or(ProtocolError::UnknownOp(byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_defined_op() {
        for op in [
            Op::Err,
            Op::Ok,
            Op::List,
            Op::Sync,
            Op::Get,
            Op::Put,
            Op::Stop,
            Op::Accept,
            Op::Reject,
        ] {
            assert_eq!(Op::from_u8(op.to_u8()), Some(op));
        }
    }

    #[test]
    fn rejects_unknown_byte() {
        assert_eq!(Op::from_u8(9), None);
        assert!(matches!(Op::try_from_u8(200), Err(ProtocolError::UnknownOp(200))));
    }
}
