//! The cache/proxy store (C4): fronts a remote register store with a local
//! hot copy and an ordered, asynchronous write-back.

use std::sync::Arc;

use bytes::Bytes;
use sshclip_core::{
    Attributes, Environment, InMemoryStore, ItemHashRecord, RegisterItem, RegisterStore, StoreError,
};
use sshclip_proto::{OkBody, Request, Response, ResponseShape};
use sshclip_transport::ChannelStream;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use crate::error::UpstreamError;
use crate::upstream::UpstreamClient;

/// Depth of the write-back FIFO (spec §4.4/§5).
pub const WRITE_BACK_CAPACITY: usize = 4;

/// One write that has been applied locally and is waiting to be sent
/// upstream.
#[derive(Debug, Clone)]
pub struct WriteBackRecord {
    /// The raw wire register index (case preserved), exactly as the caller
    /// sent it — forwarding it unfolded lets the upstream store apply its
    /// own fold/append logic rather than the agent resolving it twice.
    pub reg: u8,
    /// The attribute byte as received.
    pub attrs: Attributes,
    /// The value as received.
    pub payload: Bytes,
}

/// The shared slot holding the currently-connected upstream client, if any.
/// Swapped by the supervisor on every reconnect; read by the cache store on
/// every cache miss.
pub type UpstreamSlot<C> = Arc<RwLock<Option<Arc<UpstreamClient<C>>>>>;

/// Implements [`RegisterStore`] by delegating to a local hot copy and an
/// upstream peer, per spec §4.4.
pub struct CacheStore<E: Environment, C: ChannelStream> {
    env: E,
    local: InMemoryStore<E>,
    upstream: UpstreamSlot<C>,
    write_back: mpsc::Sender<WriteBackRecord>,
}

impl<E: Environment, C: ChannelStream> CacheStore<E, C> {
    /// Build a cache store with no upstream connected yet, returning the
    /// receiving end of its write-back FIFO and the upstream slot the
    /// supervisor fills in on connect.
    #[must_use]
    pub fn new(env: E) -> (Self, mpsc::Receiver<WriteBackRecord>, UpstreamSlot<C>) {
        let (write_back, receiver) = mpsc::channel(WRITE_BACK_CAPACITY);
        let upstream = Arc::new(RwLock::new(None));
        let store = Self { env, local: InMemoryStore::new(env), upstream: Arc::clone(&upstream), write_back };
        (store, receiver, upstream)
    }

    /// The local hot copy, for the supervisor's reconcile pass and the
    /// push-hint handler.
    #[must_use]
    pub fn local(&self) -> &InMemoryStore<E> {
        &self.local
    }

    async fn current_upstream(&self) -> Result<Arc<UpstreamClient<C>>, UpstreamError> {
        self.upstream.read().await.clone().ok_or(UpstreamError::NotConnected)
    }

    async fn get(&self, reg: u8, notify: bool) -> Result<RegisterItem, StoreError> {
        let probe = if notify { self.local.get_notify(reg).await } else { self.local.get_silent(reg).await };
        match probe {
            Ok(item) => Ok(item),
            Err(StoreError::NotExist) => {
                // A cold miss still has to honor the caller's own
                // notify/silent choice: a `get_notify` that happens to be
                // the first fetch of a register must still emit a change
                // event, the same way a warm hit would have.
                let item = self.fetch_from_upstream(reg, notify).await?;
                Ok(item)
            }
            Err(other) => Err(other),
        }
    }

    async fn fetch_from_upstream(&self, reg: u8, notify: bool) -> Result<RegisterItem, StoreError> {
        let upstream = self.current_upstream().await?;
        match upstream.call(&Request::Get { reg }, ResponseShape::Get).await? {
            Response::Ok(OkBody::Get { attrs, payload }) => {
                let attrs = Attributes::from_bits_truncate(attrs);
                if notify {
                    self.local.put_notify(reg, attrs, payload).await?;
                    self.local.get_silent(reg).await
                } else {
                    self.local.put_silent(reg, attrs, payload).await?;
                    self.local.get_silent(reg).await
                }
            }
            Response::Ok(_) => Err(StoreError::from(UpstreamError::UnexpectedShape)),
            Response::Err(message) => Err(StoreError::from(UpstreamError::Remote(message))),
        }
    }

    async fn put(&self, reg: u8, attrs: Attributes, payload: Bytes, notify: bool) -> Result<(), StoreError> {
        if notify {
            self.local.put_notify(reg, attrs, payload.clone()).await?;
        } else {
            self.local.put_silent(reg, attrs, payload.clone()).await?;
        }
        let record = WriteBackRecord { reg, attrs, payload };
        if self.write_back.send(record).await.is_err() {
            warn!(reg = format!("{reg:#04x}"), "write-back queue closed; local write was not queued upstream");
        }
        Ok(())
    }

    /// Apply a `SYNC` push hint (spec §4.4): if the local value differs from
    /// the hinted hash, asynchronously fetch and `put_notify` the new value.
    /// Never blocks the caller on the fetch's completion.
    pub fn handle_push_hint(self: &Arc<Self>, hint: ItemHashRecord)
    where
        E: 'static,
        C: 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let matches = matches!(
                this.local.get_silent(hint.reg).await,
                Ok(item) if item.content_hash == hint.content_hash
            );
            if matches {
                return;
            }
            if let Err(err) = this.fetch_from_upstream(hint.reg, true).await {
                warn!(reg = format!("{:#04x}", hint.reg), %err, "push-hint fetch failed");
            }
        });
    }
}

impl<E: Environment, C: ChannelStream> RegisterStore for CacheStore<E, C> {
    async fn get_notify(&self, reg: u8) -> Result<RegisterItem, StoreError> {
        self.get(reg, true).await
    }

    async fn get_silent(&self, reg: u8) -> Result<RegisterItem, StoreError> {
        self.get(reg, false).await
    }

    async fn put_notify(&self, reg: u8, attrs: Attributes, payload: Bytes) -> Result<(), StoreError> {
        self.put(reg, attrs, payload, true).await
    }

    async fn put_silent(&self, reg: u8, attrs: Attributes, payload: Bytes) -> Result<(), StoreError> {
        self.put(reg, attrs, payload, false).await
    }

    async fn list(&self) -> Vec<ItemHashRecord> {
        self.local.list().await
    }
}
