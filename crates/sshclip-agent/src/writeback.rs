//! The write-back worker: drains the cache's FIFO and issues `PUT` frames
//! upstream in order (spec §4.4, P9).
//!
//! A record that fails to send because the connection dropped is not
//! re-enqueued: the next reconcile pass (§4.4) will observe that the local
//! copy is newer than what upstream last saw and push it again, so no write
//! is silently lost, only delayed until the following reconnect.

use std::sync::Arc;

use sshclip_proto::{OkBody, Request, Response, ResponseShape};
use sshclip_transport::ChannelStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::WriteBackRecord;
use crate::error::UpstreamError;
use crate::upstream::UpstreamClient;

/// Drain `queue` sequentially, issuing a `PUT` for each record against
/// `upstream`. Returns when the queue closes (normal shutdown) or the first
/// time a send fails (the caller should treat this as a signal to
/// reconnect).
pub async fn run<C: ChannelStream>(
    queue: &mut mpsc::Receiver<WriteBackRecord>,
    upstream: &Arc<UpstreamClient<C>>,
) -> Result<(), UpstreamError> {
    while let Some(record) = queue.recv().await {
        let request = Request::Put { reg: record.reg, attrs: record.attrs.bits(), payload: record.payload };
        match upstream.call(&request, ResponseShape::Empty).await? {
            Response::Ok(OkBody::Empty) => {
                debug!(reg = format!("{:#04x}", record.reg), "write-back delivered");
            }
            Response::Ok(_) => {
                warn!("upstream answered PUT with an unexpected OK shape");
            }
            Response::Err(message) => {
                warn!(reg = format!("{:#04x}", record.reg), %message, "upstream rejected write-back");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use sshclip_core::Attributes;

    use super::*;

    #[tokio::test]
    async fn drains_records_in_order() {
        let (mut server, client) = tokio::io::duplex(4096);
        let upstream = Arc::new(UpstreamClient::new(client));
        let (tx, mut rx) = mpsc::channel(WRITE_BACK_TEST_CAPACITY);

        let server_task = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..2 {
                let request = Request::read(&mut server).await.unwrap();
                if let Request::Put { reg, payload, .. } = request {
                    seen.push((reg, payload));
                }
                Response::Ok(OkBody::Empty).write(&mut server).await.unwrap();
            }
            seen
        });

        tx.send(WriteBackRecord { reg: b'a', attrs: Attributes::empty(), payload: Bytes::from_static(b"1") })
            .await
            .unwrap();
        tx.send(WriteBackRecord { reg: b'a', attrs: Attributes::empty(), payload: Bytes::from_static(b"2") })
            .await
            .unwrap();
        drop(tx);

        run(&mut rx, &upstream).await.unwrap();
        let seen = server_task.await.unwrap();
        assert_eq!(seen, vec![(b'a', Bytes::from_static(b"1")), (b'a', Bytes::from_static(b"2"))]);
    }

    #[tokio::test]
    async fn a_dropped_connection_stops_the_worker_without_panicking() {
        let (server, client) = tokio::io::duplex(4096);
        drop(server);
        let upstream = Arc::new(UpstreamClient::new(client));
        let (tx, mut rx) = mpsc::channel(WRITE_BACK_TEST_CAPACITY);
        tx.send(WriteBackRecord { reg: b'a', attrs: Attributes::empty(), payload: Bytes::from_static(b"x") })
            .await
            .unwrap();
        drop(tx);

        assert!(run(&mut rx, &upstream).await.is_err());
    }

    const WRITE_BACK_TEST_CAPACITY: usize = 4;
}
