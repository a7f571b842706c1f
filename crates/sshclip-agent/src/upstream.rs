//! A single request/response actor owning the upstream frame stream.
//!
//! Spec §5 calls for the upstream stream to be guarded so that the
//! write-back worker, `get()`'s on-miss fetch, and the reconcile pass never
//! interleave bytes. A request and its response always alternate on this
//! stream (no pipelining), so a single mutex held across the write-then-read
//! pair is sufficient and simpler than separate reader/writer locks.

use sshclip_proto::{Request, Response, ResponseShape};
use sshclip_transport::ChannelStream;
use tokio::sync::Mutex;

use crate::error::UpstreamError;

/// One connected upstream `sshclip` channel.
pub struct UpstreamClient<C: ChannelStream> {
    stream: Mutex<C>,
}

impl<C: ChannelStream> UpstreamClient<C> {
    /// Wrap an already-opened channel stream.
    #[must_use]
    pub fn new(stream: C) -> Self {
        Self { stream: Mutex::new(stream) }
    }

    /// Send `request` and read back the response shaped by `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] if the write or read fails.
    pub async fn call(&self, request: &Request, shape: ResponseShape) -> Result<Response, UpstreamError> {
        let mut stream = self.stream.lock().await;
        request.write(&mut *stream).await?;
        let response = Response::read(&mut *stream, shape).await?;
        Ok(response)
    }
}
