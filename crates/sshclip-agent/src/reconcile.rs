//! Full reconcile pass run once per new upstream connection (spec §4.4, P8).

use std::collections::BTreeSet;
use std::sync::Arc;

use sshclip_core::{Environment, RegisterStore};
use sshclip_proto::{ItemHashRecord, OkBody, Request, Response, ResponseShape};
use sshclip_transport::ChannelStream;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::error::UpstreamError;
use crate::upstream::UpstreamClient;

/// Reconcile the local cache against `upstream`: union the key sets,
/// push/pull/no-op per key depending on which side (if either) is missing
/// the value or holds the newer one.
///
/// # Errors
///
/// Returns [`UpstreamError`] if the initial `LIST` round-trip fails; a
/// failure reconciling one individual key is logged and does not abort the
/// whole pass.
pub async fn run<E, C>(cache: &CacheStore<E, C>, upstream: &Arc<UpstreamClient<C>>) -> Result<(), UpstreamError>
where
    E: Environment,
    C: ChannelStream,
{
    let remote_records = match upstream.call(&Request::List, ResponseShape::List).await? {
        Response::Ok(OkBody::List(records)) => records,
        Response::Ok(_) => return Err(UpstreamError::UnexpectedShape),
        Response::Err(message) => return Err(UpstreamError::Remote(message)),
    };
    let local_records = cache.local().list().await;

    let mut remote_by_key = std::collections::HashMap::new();
    for record in &remote_records {
        remote_by_key.insert(record.reg, *record);
    }
    let mut local_by_key = std::collections::HashMap::new();
    for record in &local_records {
        local_by_key.insert(record.reg, *record);
    }

    let keys: BTreeSet<u8> =
        remote_by_key.keys().copied().chain(local_by_key.keys().copied()).collect();

    for key in keys {
        if let Err(err) = reconcile_key(cache, upstream, key, local_by_key.get(&key), remote_by_key.get(&key)).await
        {
            warn!(reg = format!("{key:#04x}"), %err, "reconcile failed for this register");
        }
    }
    Ok(())
}

async fn reconcile_key<E, C>(
    cache: &CacheStore<E, C>,
    upstream: &Arc<UpstreamClient<C>>,
    key: u8,
    local: Option<&ItemHashRecord>,
    remote: Option<&ItemHashRecord>,
) -> Result<(), UpstreamError>
where
    E: Environment,
    C: ChannelStream,
{
    match (local, remote) {
        (Some(_), None) => push(cache, upstream, key).await,
        (None, Some(_)) => pull(cache, upstream, key).await,
        (Some(local), Some(remote)) if local.content_hash != remote.content_hash => {
            if remote.created_at_nanos > local.created_at_nanos {
                pull(cache, upstream, key).await
            } else {
                push(cache, upstream, key).await
            }
        }
        _ => {
            debug!(reg = format!("{key:#04x}"), "already in sync");
            Ok(())
        }
    }
}

async fn push<E, C>(cache: &CacheStore<E, C>, upstream: &Arc<UpstreamClient<C>>, key: u8) -> Result<(), UpstreamError>
where
    E: Environment,
    C: ChannelStream,
{
    let item = cache
        .local()
        .get_silent(key)
        .await
        .map_err(|err| UpstreamError::Remote(err.to_string()))?;
    let request = Request::Put { reg: item.index, attrs: item.attrs.bits(), payload: item.payload };
    match upstream.call(&request, ResponseShape::Empty).await? {
        Response::Ok(_) => Ok(()),
        Response::Err(message) => Err(UpstreamError::Remote(message)),
    }
}

async fn pull<E, C>(cache: &CacheStore<E, C>, upstream: &Arc<UpstreamClient<C>>, key: u8) -> Result<(), UpstreamError>
where
    E: Environment,
    C: ChannelStream,
{
    match upstream.call(&Request::Get { reg: key }, ResponseShape::Get).await? {
        Response::Ok(OkBody::Get { attrs, payload }) => {
            let attrs = sshclip_core::Attributes::from_bits_truncate(attrs);
            cache
                .local()
                .put_silent(key, attrs, payload)
                .await
                .map_err(|err| UpstreamError::Remote(err.to_string()))
        }
        Response::Ok(_) => Err(UpstreamError::UnexpectedShape),
        Response::Err(message) => Err(UpstreamError::Remote(message)),
    }
}
