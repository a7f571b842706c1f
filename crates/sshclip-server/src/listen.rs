//! The listen loop (C7): accepts connections and hands each to the request
//! handler, until told to stop by the shutdown/event bus.

use std::sync::Arc;

use sshclip_core::{EventBus, RegisterStore, ShutdownEvent};
use sshclip_transport::local::LocalListener;
use sshclip_transport::tcp::PlainTcpListener;
use tracing::{info, warn};

use crate::error::ListenError;
use crate::handler::{serve_connection, STOP_REQUESTED};

fn shutdown_interests() -> [ShutdownEvent; 3] {
    [ShutdownEvent::Interrupt, ShutdownEvent::Terminate, ShutdownEvent::Custom(STOP_REQUESTED.into())]
}

/// Serve CLI clients on a local Unix domain socket until `events` signals
/// shutdown.
///
/// # Errors
///
/// Returns [`ListenError`] if accepting a connection fails outright (as
/// opposed to a single connection's handler erroring, which is logged and
/// does not stop the loop).
pub async fn run_local<S>(
    listener: LocalListener,
    store: Arc<S>,
    events: EventBus,
) -> Result<(), ListenError>
where
    S: RegisterStore + 'static,
{
    let mut shutdown = events.subscribe(shutdown_interests());
    info!(path = %listener.path().display(), "listening on local socket");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let stream = accepted?;
                let store = Arc::clone(&store);
                let events = events.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, store.as_ref(), &events).await {
                        warn!(?err, "connection handler failed");
                    }
                });
            }
            event = shutdown.recv() => {
                info!(?event, "listen loop stopping");
                return Ok(());
            }
        }
    }
}

/// Serve agent connections on a plain-TCP socket until `events` signals
/// shutdown.
///
/// # Errors
///
/// Returns [`ListenError`] if accepting a connection fails outright.
pub async fn run_tcp<S>(
    listener: PlainTcpListener,
    store: Arc<S>,
    events: EventBus,
) -> Result<(), ListenError>
where
    S: RegisterStore + 'static,
{
    let mut shutdown = events.subscribe(shutdown_interests());
    info!(addr = ?listener.local_addr()?, "listening on tcp");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (name, channel) = accepted?;
                info!(%name, "accepted channel");
                let store = Arc::clone(&store);
                let events = events.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(channel.stream, store.as_ref(), &events).await {
                        warn!(?err, "connection handler failed");
                    }
                });
            }
            event = shutdown.recv() => {
                info!(?event, "listen loop stopping");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use sshclip_core::{Environment, InMemoryStore};
    use sshclip_proto::{OkBody, Request, Response, ResponseShape};

    use super::*;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = std::time::Instant;

        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn unix_nanos(&self) -> i64 {
            0
        }

        async fn sleep(&self, _duration: Duration) {}
    }

    #[tokio::test]
    async fn local_listen_loop_serves_a_client_then_stops_on_interrupt() {
        let dir = std::env::temp_dir().join(format!("sshclip-listen-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sshclip.sock");

        let listener = LocalListener::bind(&path).unwrap();
        let store = Arc::new(InMemoryStore::new(TestEnv));
        let events = EventBus::new();

        let loop_events = events.clone();
        let loop_handle = tokio::spawn(run_local(listener, store, loop_events));

        let mut client = sshclip_transport::local::connect(&path, None).await.unwrap();
        Request::Put { reg: b'a', attrs: 0, payload: Bytes::from_static(b"hi") }
            .write(&mut client)
            .await
            .unwrap();
        let response = Response::read(&mut client, ResponseShape::Empty).await.unwrap();
        assert_eq!(response, Response::Ok(OkBody::Empty));
        drop(client);

        events.publish(&ShutdownEvent::Interrupt);
        loop_handle.await.unwrap().unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
