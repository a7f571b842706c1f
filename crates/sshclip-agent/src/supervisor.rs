//! The agent supervisor (C5): owns the upstream connection lifecycle —
//! connect, reconnect with backoff, reconcile on connect, dispatch push
//! hints, and orderly shutdown.

use std::sync::Arc;
use std::time::Duration;

use sshclip_core::{Environment, EventBus, ShutdownEvent, Subscriber};
use sshclip_proto::{ItemHashRecord, RECORD_LEN};
use sshclip_transport::{Channel, ChannelStream, Dialer, OutOfBandRequest, ReplySender, Session};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, UpstreamSlot, WriteBackRecord};
use crate::error::SupervisorError;
use crate::upstream::UpstreamClient;
use crate::{reconcile, writeback};

/// The logical channel name requested on every dial, matching what the
/// original implementation's SSH-channel peer expects.
const CHANNEL_NAME: &str = "sshclip";

/// The backoff delay grows by one second every 10 consecutive failures,
/// capping once the 50th attempt is reached (spec §4.5; grounded in the
/// original implementation's reconnect loop, which increments this way up
/// to attempt 50).
fn backoff_delay(consecutive_failures: u32) -> Duration {
    let capped = consecutive_failures.min(50);
    Duration::from_secs(u64::from(capped / 10 + 1))
}

/// Runs the upstream connection lifecycle until a shutdown event arrives.
///
/// # Errors
///
/// This function currently only returns `Ok`; it is fallible in signature
/// because a future non-transient transport failure should abort the
/// supervisor rather than retry (spec §4.5), a case today's [`Dialer`]/
/// [`Session`] implementations do not produce.
pub async fn run<E, D>(
    env: E,
    dialer: D,
    host: String,
    port: u16,
    cache: Arc<CacheStore<E, <D::Session as Session>::Stream>>,
    write_back: mpsc::Receiver<WriteBackRecord>,
    upstream_slot: UpstreamSlot<<D::Session as Session>::Stream>,
    events: EventBus,
) -> Result<(), SupervisorError>
where
    E: Environment,
    D: Dialer,
{
    let mut shutdown = events.subscribe([ShutdownEvent::Interrupt, ShutdownEvent::Terminate]);
    let write_back = Arc::new(tokio::sync::Mutex::new(write_back));
    let mut consecutive_failures: u32 = 0;

    'outer: loop {
        let connect = async {
            let session = dialer.dial(&host, port).await?;
            session.open_channel(CHANNEL_NAME).await
        };

        let channel: Channel<<D::Session as Session>::Stream> = tokio::select! {
            result = connect => match result {
                Ok(channel) => channel,
                Err(err) => {
                    consecutive_failures += 1;
                    warn!(%err, attempt = consecutive_failures, "upstream connect failed");
                    if wait_backoff_or_shutdown(&env, &mut shutdown, consecutive_failures).await {
                        continue 'outer;
                    }
                    return Ok(());
                }
            },
            event = shutdown.recv() => {
                info!(?event, "supervisor stopping while connecting");
                return Ok(());
            }
        };

        consecutive_failures = 0;
        info!("upstream connected");

        let client = Arc::new(UpstreamClient::new(channel.stream));
        *upstream_slot.write().await = Some(Arc::clone(&client));

        if let Err(err) = reconcile::run(cache.as_ref(), &client).await {
            warn!(%err, "initial reconcile failed");
        }

        let worker_queue = Arc::clone(&write_back);
        let worker_client = Arc::clone(&client);
        let mut worker = tokio::spawn(async move {
            let mut queue = worker_queue.lock().await;
            writeback::run(&mut queue, &worker_client).await
        });

        let mut oob_in = channel.oob_in;
        loop {
            tokio::select! {
                biased;
                event = shutdown.recv() => {
                    info!(?event, "supervisor stopping");
                    worker.abort();
                    *upstream_slot.write().await = None;
                    return Ok(());
                }
                worker_result = &mut worker => {
                    match worker_result {
                        Ok(Ok(())) => debug!("write-back queue closed"),
                        Ok(Err(err)) => warn!(%err, "write-back worker stopped"),
                        Err(join_err) => warn!(%join_err, "write-back worker panicked"),
                    }
                    break;
                }
                maybe_request = oob_in.recv() => {
                    match maybe_request {
                        Some((request, reply)) => handle_oob_request(Arc::clone(&cache), request, reply),
                        None => {
                            debug!("upstream out-of-band channel closed");
                            break;
                        }
                    }
                }
            }
        }

        *upstream_slot.write().await = None;
        consecutive_failures += 1;
        if wait_backoff_or_shutdown(&env, &mut shutdown, consecutive_failures).await {
            continue 'outer;
        }
        return Ok(());
    }
}

/// Sleeps the backoff delay for `attempt`, racing it against a shutdown
/// event. Returns `true` if the caller should retry, `false` if shutdown
/// was requested first.
async fn wait_backoff_or_shutdown<E: Environment>(
    env: &E,
    shutdown: &mut Subscriber,
    attempt: u32,
) -> bool {
    let delay = backoff_delay(attempt);
    tokio::select! {
        () = env.sleep(delay) => true,
        event = shutdown.recv() => {
            info!(?event, "supervisor stopping during backoff");
            false
        }
    }
}

fn handle_oob_request<E, C>(
    cache: Arc<CacheStore<E, C>>,
    request: OutOfBandRequest,
    reply: Option<ReplySender>,
) where
    E: Environment,
    C: ChannelStream,
{
    if request.name == "sync" {
        if let Some(hint) = decode_sync_hint(&request.payload) {
            cache.handle_push_hint(hint);
        } else {
            warn!("dropped malformed sync hint");
        }
        if let Some(reply) = reply {
            reply.reply(true);
        }
    } else {
        warn!(name = %request.name, "unrecognized out-of-band request");
        if let Some(reply) = reply {
            reply.reply(false);
        }
    }
}

fn decode_sync_hint(payload: &[u8]) -> Option<ItemHashRecord> {
    let buf: [u8; RECORD_LEN] = payload.get(..RECORD_LEN)?.try_into().ok()?;
    Some(ItemHashRecord::decode(&buf))
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use super::backoff_delay;

    #[test]
    fn backoff_delay_grows_by_one_second_every_ten_failures() {
        assert_eq!(backoff_delay(0), StdDuration::from_secs(1));
        assert_eq!(backoff_delay(9), StdDuration::from_secs(1));
        assert_eq!(backoff_delay(10), StdDuration::from_secs(2));
        assert_eq!(backoff_delay(20), StdDuration::from_secs(3));
        assert_eq!(backoff_delay(50), StdDuration::from_secs(6));
    }

    #[test]
    fn backoff_delay_caps_beyond_attempt_fifty() {
        assert_eq!(backoff_delay(500), backoff_delay(50));
    }
}
