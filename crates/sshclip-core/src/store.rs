//! The register store (C2): an in-memory keyed container with append
//! semantics, content hashing, and a change-notification stream.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use sshclip_proto::{ItemHashRecord, MAX_PAYLOAD};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::env::Environment;
use crate::error::StoreError;
use crate::item::{content_hash, Attributes, RegisterItem};
use crate::register::RegisterIndex;

/// Which operation produced a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    /// A `GET` read the register's current value.
    Get,
    /// A `PUT` wrote (or appended to) the register.
    Put,
}

/// Emitted after a store operation that should be visible to subscribers
/// (the clipboard watcher, a reconciling upstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    /// The operation that produced this event.
    pub op: ChangeOp,
    /// The folded register key affected.
    pub reg: u8,
}

/// Backlog depth for the change-event broadcast channel. A subscriber that
/// falls this far behind observes a `Lagged` error on its next receive and
/// resumes from the oldest event still buffered, rather than stalling the
/// writer that is trying to publish.
const CHANGE_BUS_CAPACITY: usize = 256;

/// The register store interface (C2 §4.2).
///
/// Implemented directly by [`InMemoryStore`] and, one layer up, by the
/// cache/proxy store that fronts a remote peer — callers generic over
/// `S: RegisterStore` don't need to know which.
pub trait RegisterStore: Send + Sync {
    /// Fetch a register's current value, folding uppercase first, and emit a
    /// `GET` change event on success.
    fn get_notify(
        &self,
        reg: u8,
    ) -> impl std::future::Future<Output = Result<RegisterItem, StoreError>> + Send;

    /// As [`RegisterStore::get_notify`], but emits no change event. Used by
    /// the cache layer to probe without triggering feedback loops.
    fn get_silent(
        &self,
        reg: u8,
    ) -> impl std::future::Future<Output = Result<RegisterItem, StoreError>> + Send;

    /// Store (or, for an uppercase index, append to) a register's value, and
    /// emit a `PUT` change event on success.
    fn put_notify(
        &self,
        reg: u8,
        attrs: Attributes,
        payload: Bytes,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// As [`RegisterStore::put_notify`], but emits no change event.
    fn put_silent(
        &self,
        reg: u8,
        attrs: Attributes,
        payload: Bytes,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// A stable snapshot of every present register's hash record, ordered by
    /// key.
    fn list(&self) -> impl std::future::Future<Output = Vec<ItemHashRecord>> + Send;
}

/// In-memory [`RegisterStore`], guarded by a single reader-writer lock.
///
/// Concurrent readers proceed in parallel; a write is exclusive and the
/// corresponding change event is only sent after the write lock is released,
/// so a subscriber never observes a notification ahead of the mutation it
/// describes.
#[derive(Clone)]
pub struct InMemoryStore<E: Environment> {
    env: E,
    items: Arc<RwLock<HashMap<u8, RegisterItem>>>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl<E: Environment> InMemoryStore<E> {
    /// Create an empty store.
    #[must_use]
    pub fn new(env: E) -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self { env, items: Arc::new(RwLock::new(HashMap::new())), changes }
    }

    /// Subscribe to the change-event stream. A subscriber that lags by more
    /// than [`CHANGE_BUS_CAPACITY`] events will see [`broadcast::error::RecvError::Lagged`]
    /// on its next receive rather than stalling writers.
    #[must_use]
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    async fn get(&self, reg: u8) -> Result<RegisterItem, StoreError> {
        let index = RegisterIndex::parse(reg)?;
        let items = self.items.read().await;
        items.get(&index.key()).cloned().ok_or(StoreError::NotExist)
    }

    async fn put(&self, reg: u8, attrs: Attributes, payload: Bytes) -> Result<u8, StoreError> {
        let index = RegisterIndex::parse(reg)?;
        let created_at_nanos = self.env.unix_nanos();
        let mut items = self.items.write().await;

        if index.is_append() {
            if let Some(existing) = items.get(&index.key()) {
                let combined_len = existing.payload.len() + payload.len();
                if combined_len > MAX_PAYLOAD {
                    return Err(StoreError::TooLarge { size: combined_len, max: MAX_PAYLOAD });
                }
                let mut combined = Vec::with_capacity(combined_len);
                combined.extend_from_slice(&existing.payload);
                combined.extend_from_slice(&payload);
                let combined = Bytes::from(combined);
                let item = RegisterItem {
                    index: index.key(),
                    attrs,
                    content_hash: content_hash(&combined),
                    payload: combined,
                    created_at_nanos,
                };
                items.insert(index.key(), item);
                return Ok(index.key());
            }
        }

        if payload.len() > MAX_PAYLOAD {
            return Err(StoreError::TooLarge { size: payload.len(), max: MAX_PAYLOAD });
        }
        let item = RegisterItem::new(index.key(), attrs, payload, created_at_nanos);
        items.insert(index.key(), item);
        Ok(index.key())
    }
}

impl<E: Environment> RegisterStore for InMemoryStore<E> {
    async fn get_notify(&self, reg: u8) -> Result<RegisterItem, StoreError> {
        let item = self.get(reg).await?;
        let _ = self.changes.send(ChangeEvent { op: ChangeOp::Get, reg: item.index });
        Ok(item)
    }

    async fn get_silent(&self, reg: u8) -> Result<RegisterItem, StoreError> {
        self.get(reg).await
    }

    async fn put_notify(&self, reg: u8, attrs: Attributes, payload: Bytes) -> Result<(), StoreError> {
        let key = self.put(reg, attrs, payload).await?;
        let _ = self.changes.send(ChangeEvent { op: ChangeOp::Put, reg: key });
        Ok(())
    }

    async fn put_silent(&self, reg: u8, attrs: Attributes, payload: Bytes) -> Result<(), StoreError> {
        self.put(reg, attrs, payload).await?;
        Ok(())
    }

    async fn list(&self) -> Vec<ItemHashRecord> {
        let items = self.items.read().await;
        let mut records: Vec<ItemHashRecord> =
            items.values().map(RegisterItem::to_hash_record).collect();
        records.sort_by_key(|record| record.reg);
        debug!(count = records.len(), "listed registers");
        records
    }
}


#[cfg(test)]
mod proptests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use proptest::prelude::*;
    use tokio::runtime::Runtime;

    use super::{InMemoryStore, RegisterStore};
    use crate::env::Environment;
    use crate::item::{content_hash, Attributes, RegisterItem};

    #[derive(Clone)]
    struct TestEnv {
        nanos: Arc<AtomicI64>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { nanos: Arc::new(AtomicI64::new(0)) }
        }
    }

    impl Environment for TestEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn unix_nanos(&self) -> i64 {
            self.nanos.fetch_add(1, Ordering::Relaxed)
        }

        async fn sleep(&self, _duration: Duration) {}
    }

    fn store() -> InMemoryStore<TestEnv> {
        InMemoryStore::new(TestEnv::new())
    }

    /// Every byte in the register alphabet (`a`-`z`, `A`-`Z`, `0`-`9`, `*`,
    /// `+`), uppercase and lowercase both included.
    fn valid_reg_byte() -> impl Strategy<Value = u8> {
        prop_oneof![(b'a'..=b'z'), (b'A'..=b'Z'), (b'0'..=b'9'), Just(b'*'), Just(b'+'),]
    }

    /// Byte of the alphabet that selects replace (never append) semantics.
    fn replace_reg_byte() -> impl Strategy<Value = u8> {
        prop_oneof![(b'a'..=b'z'), (b'0'..=b'9'), Just(b'*'), Just(b'+'),]
    }

    fn attrs_strategy() -> impl Strategy<Value = Attributes> {
        any::<u8>().prop_map(Attributes::from_bits_truncate)
    }

    fn payload_strategy() -> impl Strategy<Value = Bytes> {
        prop::collection::vec(any::<u8>(), 0..4096).prop_map(Bytes::from)
    }

    fn put(store: &InMemoryStore<TestEnv>, reg: u8, attrs: Attributes, payload: Bytes) {
        Runtime::new().unwrap().block_on(store.put_notify(reg, attrs, payload)).unwrap();
    }

    fn get(store: &InMemoryStore<TestEnv>, reg: u8) -> RegisterItem {
        Runtime::new().unwrap().block_on(store.get_notify(reg)).unwrap()
    }

    proptest! {
        /// P1: a put of any valid register index is readable back under the
        /// same index with the same payload and attributes.
        #[test]
        fn prop_put_then_get_round_trips(
            reg in valid_reg_byte(),
            attrs in attrs_strategy(),
            payload in payload_strategy(),
        ) {
            let store = store();
            put(&store, reg, attrs, payload.clone());
            let item = get(&store, reg.to_ascii_lowercase());
            prop_assert_eq!(item.payload, payload);
            prop_assert_eq!(item.attrs, attrs);
        }

        /// P2: two uppercase puts against the same letter concatenate, in
        /// order, under the folded lowercase key.
        #[test]
        fn prop_uppercase_put_appends_in_order(
            letter in b'A'..=b'Z',
            first in payload_strategy(),
            second in payload_strategy(),
        ) {
            let store = store();
            put(&store, letter, Attributes::empty(), first.clone());
            put(&store, letter, Attributes::empty(), second.clone());
            let item = get(&store, letter.to_ascii_lowercase());
            let mut expected = Vec::with_capacity(first.len() + second.len());
            expected.extend_from_slice(&first);
            expected.extend_from_slice(&second);
            prop_assert_eq!(item.payload, Bytes::from(expected));
        }

        /// P4: a lowercase (non-append) put always replaces, never appends.
        #[test]
        fn prop_lowercase_put_replaces(
            reg in replace_reg_byte(),
            first in payload_strategy(),
            second in payload_strategy(),
        ) {
            let store = store();
            put(&store, reg, Attributes::empty(), first);
            put(&store, reg, Attributes::empty(), second.clone());
            let item = get(&store, reg);
            prop_assert_eq!(item.payload, second);
        }

        /// P5: `list()`'s content hash always matches `content_hash()` of
        /// the register's current payload, for an arbitrary set of
        /// distinct registers.
        #[test]
        fn prop_list_content_hash_matches_current_payload(
            entries in prop::collection::hash_map(valid_reg_byte(), payload_strategy(), 0..8),
        ) {
            let store = store();
            let runtime = Runtime::new().unwrap();
            for (reg, payload) in &entries {
                runtime.block_on(store.put_silent(*reg, Attributes::empty(), payload.clone())).unwrap();
            }
            let records = runtime.block_on(store.list());
            for record in &records {
                let expected = entries
                    .iter()
                    .find(|(reg, _)| reg.to_ascii_lowercase() == record.reg)
                    .map(|(_, payload)| content_hash(payload))
                    .expect("listed register must have a backing entry");
                prop_assert_eq!(record.content_hash, expected);
            }
        }
    }
}
