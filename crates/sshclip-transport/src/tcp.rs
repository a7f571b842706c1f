//! A plain-TCP reference implementation of [`Dialer`]/[`Session`].
//!
//! This is explicitly **not** an authenticated or encrypted transport — the
//! core's own scope excludes key management and wire encryption (spec §1);
//! this module exists so the rest of the system has something concrete and
//! runnable to drive in tests and local development. A real deployment
//! layers `sshclip` on top of an actual authenticated transport (e.g. SSH
//! channels, as the original implementation did) that satisfies the same
//! [`Dialer`]/[`Session`] interface.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::session::{
    reply_pair, Channel, Dialer, OutOfBandChannel, OutOfBandRequest, OutOfBandSender,
    OutgoingOobRequest, ReplySender, Session,
};

const TAG_DATA: u8 = 0;
const TAG_OOB_REQUEST: u8 = 1;
const TAG_OOB_REPLY: u8 = 2;

/// Backlog for the demultiplexed main-stream byte bridge and the
/// out-of-band request/write-request queues.
const MUX_CHANNEL_CAPACITY: usize = 64;

/// Dials plain, unauthenticated TCP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTcpDialer;

impl PlainTcpDialer {
    /// Create a new dialer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Dialer for PlainTcpDialer {
    type Session = PlainTcpSession;

    async fn dial(&self, host: &str, port: u16) -> Result<Self::Session, TransportError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(PlainTcpSession { stream: Mutex::new(Some(stream)) })
    }
}

/// A dialed TCP connection, not yet split into a named channel.
///
/// Only one channel may be opened per session; this mirrors how the
/// original implementation opens exactly one `sshclip` SSH channel per
/// upstream connection.
pub struct PlainTcpSession {
    stream: Mutex<Option<TcpStream>>,
}

impl Session for PlainTcpSession {
    type Stream = tokio::io::DuplexStream;

    async fn open_channel(&self, name: &str) -> Result<Channel<Self::Stream>, TransportError> {
        #[allow(clippy::expect_used)]
        let mut stream = self
            .stream
            .lock()
            .expect("tcp session mutex poisoned")
            .take()
            .ok_or_else(|| TransportError::ChannelClosed("channel already opened".to_owned()))?;
        write_handshake_name(&mut stream, name).await?;
        let echoed = read_handshake_name(&mut stream).await?;
        if echoed != name {
            return Err(TransportError::HandshakeMismatch {
                expected: name.to_owned(),
                actual: echoed,
            });
        }
        Ok(spawn_mux(stream))
    }
}

/// Accepts plain TCP connections and performs the channel-name handshake on
/// each, standing in for a remote authenticated-transport listener.
pub struct PlainTcpListener {
    listener: TcpListener,
}

impl PlainTcpListener {
    /// Bind a listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the bind fails.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        Ok(Self { listener: TcpListener::bind(addr).await? })
    }

    /// The bound local address, useful when binding to port 0 in tests.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the socket's address cannot be
    /// queried.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one connection, complete the channel-name handshake, and
    /// return the name the peer requested along with the opened channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] on accept or I/O failure.
    pub async fn accept(
        &self,
    ) -> Result<(String, Channel<tokio::io::DuplexStream>), TransportError> {
        let (mut stream, peer) = self.listener.accept().await?;
        debug!(%peer, "accepted tcp session");
        let name = read_handshake_name(&mut stream).await?;
        write_handshake_name(&mut stream, &name).await?;
        Ok((name.clone(), spawn_mux(stream)))
    }
}

async fn write_handshake_name(stream: &mut TcpStream, name: &str) -> Result<(), TransportError> {
    let bytes = name.as_bytes();
    #[allow(clippy::cast_possible_truncation)]
    let len = bytes.len() as u8;
    let mut buf = Vec::with_capacity(1 + bytes.len());
    buf.push(len);
    buf.extend_from_slice(bytes);
    stream.write_all(&buf).await?;
    Ok(())
}

async fn read_handshake_name(stream: &mut TcpStream) -> Result<String, TransportError> {
    let mut len = [0u8; 1];
    stream.read_exact(&mut len).await?;
    let mut name = vec![0u8; usize::from(len[0])];
    stream.read_exact(&mut name).await?;
    String::from_utf8(name)
        .map_err(|err| TransportError::ChannelClosed(format!("invalid channel name: {err}")))
}

fn spawn_mux(stream: TcpStream) -> Channel<tokio::io::DuplexStream> {
    let (socket_rx, socket_tx) = tokio::io::split(stream);
    let (writer_tx, writer_rx) = mpsc::channel::<Vec<u8>>(MUX_CHANNEL_CAPACITY);
    let (oob_in_tx, oob_in_rx) = mpsc::channel(MUX_CHANNEL_CAPACITY);
    let (oob_out_tx, oob_out_rx) = mpsc::channel::<OutgoingOobRequest>(MUX_CHANNEL_CAPACITY);
    let pending_replies = Arc::new(Mutex::new(VecDeque::new()));

    let (user_end, internal_end) = tokio::io::duplex(64 * 1024);
    let (internal_read, internal_write) = tokio::io::split(internal_end);

    tokio::spawn(write_loop(socket_tx, writer_rx));
    tokio::spawn(outgoing_data_loop(internal_read, writer_tx.clone()));
    tokio::spawn(outgoing_oob_loop(oob_out_rx, writer_tx.clone()));
    tokio::spawn(read_loop(
        socket_rx,
        internal_write,
        oob_in_tx,
        Arc::clone(&pending_replies),
        writer_tx,
    ));

    Channel {
        stream: user_end,
        oob_in: OutOfBandChannel { inbox: oob_in_rx },
        oob_out: OutOfBandSender { outbox: oob_out_tx, pending_replies },
    }
}

/// The only task allowed to write to the socket, serializing data frames
/// and out-of-band frames onto a single stream of bytes.
async fn write_loop(mut socket_tx: WriteHalf<TcpStream>, mut writer_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = writer_rx.recv().await {
        if let Err(err) = socket_tx.write_all(&frame).await {
            warn!(?err, "tcp mux write failed, closing connection");
            return;
        }
    }
}

/// Bridges bytes the user wrote into the exposed duplex stream out to the
/// socket as `TAG_DATA` frames.
async fn outgoing_data_loop(
    mut internal_read: ReadHalf<tokio::io::DuplexStream>,
    writer_tx: mpsc::Sender<Vec<u8>>,
) {
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = match internal_read.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let frame = encode_frame(TAG_DATA, &buf[..n]);
        if writer_tx.send(frame).await.is_err() {
            return;
        }
    }
}

async fn outgoing_oob_loop(
    mut oob_out_rx: mpsc::Receiver<OutgoingOobRequest>,
    writer_tx: mpsc::Sender<Vec<u8>>,
) {
    while let Some(req) = oob_out_rx.recv().await {
        let mut payload = Vec::with_capacity(2 + req.name.len() + 4 + req.payload.len());
        payload.push(u8::from(req.wants_reply));
        #[allow(clippy::cast_possible_truncation)]
        payload.push(req.name.len() as u8);
        payload.extend_from_slice(req.name.as_bytes());
        #[allow(clippy::cast_possible_truncation)]
        payload.extend_from_slice(&(req.payload.len() as u32).to_be_bytes());
        payload.extend_from_slice(&req.payload);
        if writer_tx.send(encode_frame(TAG_OOB_REQUEST, &payload)).await.is_err() {
            return;
        }
    }
}

/// Reads tagged frames off the socket and routes each to its destination:
/// `TAG_DATA` into the user-visible stream, `TAG_OOB_REQUEST` to the
/// channel's out-of-band inbox (spawning a task that writes the handler's
/// eventual reply back as `TAG_OOB_REPLY` if one was requested),
/// `TAG_OOB_REPLY` to the oldest still-pending reply slot.
async fn read_loop(
    mut socket_rx: ReadHalf<TcpStream>,
    mut internal_write: tokio::io::WriteHalf<tokio::io::DuplexStream>,
    oob_in_tx: mpsc::Sender<(OutOfBandRequest, Option<ReplySender>)>,
    pending_replies: Arc<Mutex<VecDeque<oneshot::Sender<bool>>>>,
    writer_tx: mpsc::Sender<Vec<u8>>,
) {
    loop {
        let Some((tag, payload)) = read_frame(&mut socket_rx).await else { return };
        match tag {
            TAG_DATA => {
                if internal_write.write_all(&payload).await.is_err() {
                    return;
                }
            }
            TAG_OOB_REQUEST => {
                let Some((request, wants_reply)) = decode_oob_request(payload) else { continue };
                let reply_sender = if wants_reply {
                    let (sender, receiver) = reply_pair();
                    tokio::spawn(send_reply_when_ready(receiver, writer_tx.clone()));
                    Some(sender)
                } else {
                    None
                };
                if oob_in_tx.send((request, reply_sender)).await.is_err() {
                    return;
                }
            }
            TAG_OOB_REPLY => {
                let accept = payload.first().copied().unwrap_or(0) != 0;
                #[allow(clippy::expect_used)]
                let waiting =
                    pending_replies.lock().expect("reply queue mutex poisoned").pop_front();
                if let Some(waiting) = waiting {
                    let _ = waiting.send(accept);
                }
            }
            other => {
                warn!(tag = other, "dropping frame with unknown mux tag");
            }
        }
    }
}

/// Waits for the local handler to call [`ReplySender::reply`] (or drop it,
/// which resolves to "no") and writes the corresponding `TAG_OOB_REPLY`
/// frame back to the peer.
async fn send_reply_when_ready(receiver: oneshot::Receiver<bool>, writer_tx: mpsc::Sender<Vec<u8>>) {
    let accept = receiver.await.unwrap_or(false);
    let _ = writer_tx.send(encode_frame(TAG_OOB_REPLY, &[u8::from(accept)])).await;
}

fn decode_oob_request(mut payload: Bytes) -> Option<(OutOfBandRequest, bool)> {
    if payload.is_empty() {
        return None;
    }
    let wants_reply = payload.get_u8() != 0;
    if payload.is_empty() {
        return None;
    }
    let name_len = usize::from(payload.get_u8());
    if payload.len() < name_len + 4 {
        return None;
    }
    let name = String::from_utf8(payload.copy_to_bytes(name_len).to_vec()).ok()?;
    let body_len = usize::try_from(payload.get_u32()).ok()?;
    if payload.len() < body_len {
        return None;
    }
    let body = payload.copy_to_bytes(body_len);
    Some((OutOfBandRequest { name, payload: body }, wants_reply))
}

fn encode_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + payload.len());
    buf.push(tag);
    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

async fn read_frame(socket_rx: &mut ReadHalf<TcpStream>) -> Option<(u8, Bytes)> {
    let mut head = [0u8; 5];
    socket_rx.read_exact(&mut head).await.ok()?;
    let tag = head[0];
    let len = u32::from_be_bytes([head[1], head[2], head[3], head[4]]) as usize;
    let mut payload = BytesMut::zeroed(len);
    socket_rx.read_exact(&mut payload).await.ok()?;
    Some((tag, payload.freeze()))
}
