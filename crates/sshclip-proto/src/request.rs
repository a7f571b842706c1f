//! Requests sent on the main control stream.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::io::{read_and_check_version, read_exact, read_payload, write_all, write_payload};
use crate::{Op, ProtocolError, Result, PROTOCOL_VERSION};

/// A request frame, as read from or written to the main control stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Fetch a register's current value: `GET reg`.
    Get {
        /// The register index.
        reg: u8,
    },
    /// Store a register's value: `PUT reg attrs length payload`.
    ///
    /// Uppercase register indices append to the existing value instead of
    /// replacing it; this request carries the raw wire index unfolded.
    Put {
        /// The register index as sent on the wire (case preserved).
        reg: u8,
        /// Opaque attribute byte, interpreted by the register store.
        attrs: u8,
        /// The value to store.
        payload: Bytes,
    },
    /// List all present registers.
    List,
    /// Request orderly shutdown of the receiving peer.
    Stop,
}

impl Request {
    fn op(&self) -> Op {
        match self {
            Self::Get { .. } => Op::Get,
            Self::Put { .. } => Op::Put,
            Self::List => Op::List,
            Self::Stop => Op::Stop,
        }
    }

    /// Encode and write this request to an async stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TooLarge`] if a `PUT` payload exceeds
    /// [`crate::MAX_PAYLOAD`], or [`ProtocolError::Io`] on write failure.
    pub async fn write(&self, w: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
        let mut buf = vec![PROTOCOL_VERSION, self.op().to_u8()];
        match self {
            Self::Get { reg } => buf.push(*reg),
            Self::Put { reg, attrs, payload } => {
                buf.push(*reg);
                buf.push(*attrs);
                write_payload(&mut buf, payload)?;
            }
            Self::List | Self::Stop => {}
        }
        write_all(w, &buf).await
    }

    /// Read and decode a request from an async stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::OutOfDate`] if the peer's protocol byte is
    /// stale, [`ProtocolError::UnknownOp`] if the op byte names something
    /// that is not a valid request, [`ProtocolError::TooLarge`] if a `PUT`
    /// declares an oversized payload, or [`ProtocolError::ShortRead`] /
    /// [`ProtocolError::Io`] on a truncated or failed read.
    pub async fn read(r: &mut (impl AsyncRead + Unpin)) -> Result<Self> {
        read_and_check_version(r).await?;

        let mut op_byte = [0u8; 1];
        read_exact(r, &mut op_byte).await?;
        let op = Op::try_from_u8(op_byte[0])?;

        match op {
            Op::Get => {
                let mut reg = [0u8; 1];
                read_exact(r, &mut reg).await?;
                Ok(Self::Get { reg: reg[0] })
            }
            Op::Put => {
                let mut head = [0u8; 2];
                read_exact(r, &mut head).await?;
                let payload = read_payload(r).await?;
                Ok(Self::Put { reg: head[0], attrs: head[1], payload: Bytes::from(payload) })
            }
            Op::List => Ok(Self::List),
            Op::Stop => Ok(Self::Stop),
            Op::Err | Op::Ok | Op::Sync | Op::Accept | Op::Reject => {
                Err(ProtocolError::UnknownOp(op_byte[0]))
            }
        }
    }
}


#[cfg(test)]
mod proptests {
    use bytes::Bytes;
    use proptest::prelude::*;
    use tokio::runtime::Runtime;

    use super::Request;

    fn request_strategy() -> impl Strategy<Value = Request> {
        prop_oneof![
            any::<u8>().prop_map(|reg| Request::Get { reg }),
            (any::<u8>(), any::<u8>(), prop::collection::vec(any::<u8>(), 0..4096))
                .prop_map(|(reg, attrs, payload)| Request::Put {
                    reg,
                    attrs,
                    payload: Bytes::from(payload),
                }),
            Just(Request::List),
            Just(Request::Stop),
        ]
    }

    fn round_trip(req: &Request) -> Request {
        Runtime::new().unwrap().block_on(async {
            let mut buf = Vec::new();
            req.write(&mut buf).await.unwrap();
            let mut cursor = std::io::Cursor::new(buf);
            Request::read(&mut cursor).await.unwrap()
        })
    }

    proptest! {
        /// Every request this crate can produce decodes back to itself.
        #[test]
        fn prop_request_round_trips(req in request_strategy()) {
            prop_assert_eq!(round_trip(&req), req);
        }
    }
}
