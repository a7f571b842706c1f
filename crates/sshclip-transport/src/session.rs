//! The transport interface consumed from the authentication layer (spec §6).
//!
//! The core only assumes a stream that is reliable, ordered, and
//! authenticated; it never inspects the transport's cryptographic details.
//! [`Dialer`] opens sessions to a remote host; a [`Session`] opens named
//! logical channels, each yielding a byte stream plus an out-of-band request
//! receiver.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;

/// An out-of-band request delivered on a channel's request stream.
///
/// The only name the register-sync core understands is `"sync"`; its
/// payload is a single `ItemHashRecord` encoded by `sshclip-proto`. Unknown
/// names are acknowledged with "no" if a reply was requested, and otherwise
/// dropped.
#[derive(Debug, Clone)]
pub struct OutOfBandRequest {
    /// The request name (`"sync"` is the only one the core interprets).
    pub name: String,
    /// The request's raw payload.
    pub payload: Bytes,
}

/// A pending reply slot for an [`OutOfBandRequest`] that asked for one.
///
/// Dropping this without calling [`ReplySender::reply`] is equivalent to
/// replying `false`: the peer's wait resolves to "no" rather than hanging,
/// mirroring how an SSH channel request reply defaults to rejection if the
/// handler never responds.
pub struct ReplySender {
    reply: oneshot::Sender<bool>,
}

impl ReplySender {
    /// Accept or reject the request.
    pub fn reply(self, accept: bool) {
        let _ = self.reply.send(accept);
    }
}

pub(crate) fn reply_pair() -> (ReplySender, oneshot::Receiver<bool>) {
    let (tx, rx) = oneshot::channel();
    (ReplySender { reply: tx }, rx)
}

/// Receives [`OutOfBandRequest`]s on a channel, each with an optional
/// [`ReplySender`] when the sender asked for a reply.
pub struct OutOfBandChannel {
    pub(crate) inbox: mpsc::Receiver<(OutOfBandRequest, Option<ReplySender>)>,
}

impl OutOfBandChannel {
    /// Wait for the next out-of-band request. Returns `None` once the
    /// underlying channel has closed.
    pub async fn recv(&mut self) -> Option<(OutOfBandRequest, Option<ReplySender>)> {
        self.inbox.recv().await
    }
}

/// A sender side used to push out-of-band requests, e.g. `SYNC` push hints
/// from the server down to an agent.
///
/// Replies to requests that asked for one arrive out-of-order with respect
/// to this struct's calls but in-order with respect to the wire (the peer
/// processes and replies to requests one at a time, per RFC 4254-style
/// channel-request ordering); `pending_replies` is a FIFO matching each
/// reply frame back to the call that is waiting for it.
#[derive(Clone)]
pub struct OutOfBandSender {
    pub(crate) outbox: mpsc::Sender<OutgoingOobRequest>,
    pub(crate) pending_replies: Arc<Mutex<VecDeque<oneshot::Sender<bool>>>>,
}

pub(crate) struct OutgoingOobRequest {
    pub(crate) name: String,
    pub(crate) payload: Bytes,
    pub(crate) wants_reply: bool,
}

impl OutOfBandSender {
    /// Send an out-of-band request with no reply expected.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ChannelClosed`] if the peer side of this
    /// channel has gone away.
    pub async fn send(&self, name: impl Into<String>, payload: Bytes) -> Result<(), TransportError> {
        self.outbox
            .send(OutgoingOobRequest { name: name.into(), payload, wants_reply: false })
            .await
            .map_err(|_| TransportError::ChannelClosed("out-of-band channel closed".to_owned()))
    }

    /// Send an out-of-band request and wait for the peer's accept/reject
    /// reply.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ChannelClosed`] if the peer side of this
    /// channel, or the reply itself, is dropped before a reply arrives.
    pub async fn send_and_wait(
        &self,
        name: impl Into<String>,
        payload: Bytes,
    ) -> Result<bool, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        #[allow(clippy::expect_used)]
        self.pending_replies
            .lock()
            .expect("out-of-band reply queue mutex poisoned")
            .push_back(reply_tx);
        self.outbox
            .send(OutgoingOobRequest { name: name.into(), payload, wants_reply: true })
            .await
            .map_err(|_| TransportError::ChannelClosed("out-of-band channel closed".to_owned()))?;
        reply_rx
            .await
            .map_err(|_| TransportError::ChannelClosed("peer dropped reply".to_owned()))
    }
}

/// An authenticated, ordered, reliable byte stream for the main request
/// control channel.
pub trait ChannelStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> ChannelStream for T {}

/// One multiplexed logical channel: the main frame stream plus the
/// out-of-band request channel layered over the same underlying
/// connection.
pub struct Channel<S: ChannelStream> {
    /// The main, frame-oriented byte stream (what `sshclip-proto` reads and
    /// writes requests/responses on).
    pub stream: S,
    /// Receives out-of-band requests from the peer.
    pub oob_in: OutOfBandChannel,
    /// Sends out-of-band requests to the peer.
    pub oob_out: OutOfBandSender,
}

/// A connected, multiplexing session to a single remote peer.
pub trait Session: Send + Sync + 'static {
    /// The concrete stream type this session's channels yield.
    type Stream: ChannelStream;

    /// Open a named logical channel on this session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the peer rejects or does not recognize
    /// the channel name, or if the underlying connection fails.
    fn open_channel(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Channel<Self::Stream>, TransportError>> + Send;
}

/// Dials an authenticated session to a remote host.
pub trait Dialer: Send + Sync + 'static {
    /// The session type this dialer produces.
    type Session: Session;

    /// Connect to `host:port` and establish a session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] on connection failure.
    fn dial(
        &self,
        host: &str,
        port: u16,
    ) -> impl std::future::Future<Output = Result<Self::Session, TransportError>> + Send;
}
