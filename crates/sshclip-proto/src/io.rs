//! Low-level read/write helpers shared by requests, responses, and records.
//!
//! Frame reads are atomic: either the full requested number of bytes comes
//! back, or the call fails with [`ProtocolError::ShortRead`] rather than
//! silently returning a truncated buffer.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{MAX_PAYLOAD, ProtocolError, Result};

/// Read exactly `buf.len()` bytes, distinguishing "peer closed early" from
/// other I/O errors.
pub(crate) async fn read_exact(
    r: &mut (impl AsyncRead + Unpin),
    buf: &mut [u8],
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(ProtocolError::ShortRead { expected: buf.len(), actual: filled });
        }
        filled += n;
    }
    Ok(())
}

/// Read a big-endian `u24` length prefix.
pub(crate) async fn read_u24(r: &mut (impl AsyncRead + Unpin)) -> Result<usize> {
    let mut buf = [0u8; 3];
    read_exact(r, &mut buf).await?;
    Ok((usize::from(buf[0]) << 16) | (usize::from(buf[1]) << 8) | usize::from(buf[2]))
}

/// Write a big-endian `u24` length prefix.
///
/// # Errors
///
/// Returns [`ProtocolError::TooLarge`] if `len` exceeds [`MAX_PAYLOAD`].
pub(crate) fn write_u24(out: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::TooLarge { size: len, max: MAX_PAYLOAD });
    }
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    Ok(())
}

/// Read a `length:u24-be | payload` pair, rejecting an oversized length
/// before allocating the payload buffer.
pub(crate) async fn read_payload(r: &mut (impl AsyncRead + Unpin)) -> Result<Vec<u8>> {
    let len = read_u24(r).await?;
    if len > MAX_PAYLOAD {
        return Err(ProtocolError::TooLarge { size: len, max: MAX_PAYLOAD });
    }
    let mut payload = vec![0u8; len];
    read_exact(r, &mut payload).await?;
    Ok(payload)
}

/// Write a `length:u24-be | payload` pair.
pub(crate) fn write_payload(out: &mut Vec<u8>, payload: &[u8]) -> Result<()> {
    write_u24(out, payload.len())?;
    out.extend_from_slice(payload);
    Ok(())
}

/// Read a protocol version byte and fail with [`ProtocolError::OutOfDate`]
/// if it is lower than ours.
pub(crate) async fn read_and_check_version(r: &mut (impl AsyncRead + Unpin)) -> Result<()> {
    let mut version = [0u8; 1];
    read_exact(r, &mut version).await?;
    if version[0] < crate::PROTOCOL_VERSION {
        return Err(ProtocolError::OutOfDate);
    }
    Ok(())
}

/// Write a complete buffer to the stream.
pub(crate) async fn write_all(w: &mut (impl AsyncWrite + Unpin), buf: &[u8]) -> Result<()> {
    w.write_all(buf).await?;
    Ok(())
}
