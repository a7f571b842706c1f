//! Responses sent back on the main control stream.
//!
//! An `OK` response's body is not self-describing: its shape depends on
//! which request it answers. Callers reading a response must say which
//! [`ResponseShape`] they expect, mirroring how a client that issued a `GET`
//! already knows to read a `GET`-shaped reply.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::io::{read_and_check_version, read_exact, read_payload, write_all, write_payload};
use crate::{ItemHashRecord, Op, ProtocolError, Result, PROTOCOL_VERSION};

/// The body of an `OK` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OkBody {
    /// No body: acknowledges a `PUT` or `STOP`.
    Empty,
    /// Answers a `GET`.
    Get {
        /// Opaque attribute byte stored alongside the value.
        attrs: u8,
        /// The register's current value.
        payload: Bytes,
    },
    /// Answers a `LIST`: one record per present register.
    List(Vec<ItemHashRecord>),
}

/// Which shape of `OK` body the reader expects, chosen based on the request
/// that was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Expect [`OkBody::Empty`].
    Empty,
    /// Expect [`OkBody::Get`].
    Get,
    /// Expect [`OkBody::List`].
    List,
}

/// A response frame, as read from or written to the main control stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The request succeeded.
    Ok(OkBody),
    /// The request failed; the string is a human-readable explanation.
    Err(String),
}

impl Response {
    /// Encode and write this response to an async stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TooLarge`] if a body payload exceeds
    /// [`crate::MAX_PAYLOAD`], or [`ProtocolError::Io`] on write failure.
    pub async fn write(&self, w: &mut (impl AsyncWrite + Unpin)) -> Result<()> {
        let mut buf = vec![PROTOCOL_VERSION];
        match self {
            Self::Ok(OkBody::Empty) => {
                buf.push(Op::Ok.to_u8());
            }
            Self::Ok(OkBody::Get { attrs, payload }) => {
                buf.push(Op::Ok.to_u8());
                buf.push(*attrs);
                write_payload(&mut buf, payload)?;
            }
            Self::Ok(OkBody::List(records)) => {
                buf.push(Op::Ok.to_u8());
                write_record_count(&mut buf, records.len())?;
                for record in records {
                    buf.extend_from_slice(&record.encode());
                }
            }
            Self::Err(message) => {
                buf.push(Op::Err.to_u8());
                write_payload(&mut buf, message.as_bytes())?;
            }
        }
        write_all(w, &buf).await
    }

    /// Read and decode a response from an async stream.
    ///
    /// `shape` must match the request that prompted this response; it is
    /// ignored for `ERR` responses, which are always `length:u24-be | utf8`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::OutOfDate`] if the peer's protocol byte is
    /// stale, [`ProtocolError::UnknownOp`] if the op byte is neither `OK`
    /// nor `ERR`, [`ProtocolError::InvalidErrorText`] if an `ERR` message is
    /// not valid UTF-8, [`ProtocolError::TooLarge`] if a declared length
    /// exceeds [`crate::MAX_PAYLOAD`], or [`ProtocolError::ShortRead`] /
    /// [`ProtocolError::Io`] on a truncated or failed read.
    pub async fn read(r: &mut (impl AsyncRead + Unpin), shape: ResponseShape) -> Result<Self> {
        read_and_check_version(r).await?;

        let mut op_byte = [0u8; 1];
        read_exact(r, &mut op_byte).await?;
        let op = Op::try_from_u8(op_byte[0])?;

        match op {
            Op::Err => {
                let bytes = read_payload(r).await?;
                let message = std::str::from_utf8(&bytes)?.to_owned();
                Ok(Self::Err(message))
            }
            Op::Ok => match shape {
                ResponseShape::Empty => Ok(Self::Ok(OkBody::Empty)),
                ResponseShape::Get => {
                    let mut attrs = [0u8; 1];
                    read_exact(r, &mut attrs).await?;
                    let payload = read_payload(r).await?;
                    Ok(Self::Ok(OkBody::Get { attrs: attrs[0], payload: Bytes::from(payload) }))
                }
                ResponseShape::List => {
                    let count = read_record_count(r).await?;
                    let mut records = Vec::with_capacity(count);
                    for _ in 0..count {
                        records.push(ItemHashRecord::read(r).await?);
                    }
                    Ok(Self::Ok(OkBody::List(records)))
                }
            },
            Op::List | Op::Sync | Op::Get | Op::Put | Op::Stop | Op::Accept | Op::Reject => {
                Err(ProtocolError::UnknownOp(op_byte[0]))
            }
        }
    }
}

/// `LIST` bodies prefix the record count with a single byte, unlike payload
/// lengths: `count:u8`.
async fn read_record_count(r: &mut (impl AsyncRead + Unpin)) -> Result<usize> {
    let mut buf = [0u8; 1];
    read_exact(r, &mut buf).await?;
    Ok(usize::from(buf[0]))
}

fn write_record_count(out: &mut Vec<u8>, count: usize) -> Result<()> {
    let max_count = usize::from(u8::MAX);
    if count > max_count {
        return Err(ProtocolError::TooLarge { size: count, max: max_count });
    }
    out.push(count as u8);
    Ok(())
}
