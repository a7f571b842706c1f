//! A deterministic reconnect/backoff simulation: the supervisor starts
//! dialing before any upstream is listening (exercising the Backoff state),
//! then the upstream comes up and the supervisor completes its reconcile
//! pass and applies a push hint, demonstrating P8 convergence end to end.

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sshclip_agent::{run_supervisor, CacheStore};
use sshclip_core::{EventBus, ShutdownEvent};
use sshclip_harness::TestEnv;
use sshclip_proto::{ItemHashRecord, OkBody, Request, Response, ResponseShape};
use sshclip_transport::tcp::{PlainTcpDialer, PlainTcpListener};

fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

#[tokio::test]
async fn supervisor_retries_until_upstream_appears_then_reconciles_and_applies_a_push_hint() {
    let port = free_port();
    let env = TestEnv::new();
    let events = EventBus::new();
    let (cache, write_back, upstream_slot) =
        CacheStore::<TestEnv, tokio::io::DuplexStream>::new(env.clone());
    let cache = Arc::new(cache);

    let supervisor = tokio::spawn(run_supervisor(
        env,
        PlainTcpDialer::new(),
        "127.0.0.1".to_owned(),
        port,
        Arc::clone(&cache),
        write_back,
        upstream_slot,
        events.clone(),
    ));

    // The supervisor is now retrying against a port nothing is listening on
    // yet; give it a moment to exhaust a handful of failed attempts before
    // the upstream comes up, exercising the Connecting -> Backoff -> retry
    // path under a real (if trivial) network error.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let listener = PlainTcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let server = tokio::spawn(async move {
        let (name, mut channel) = listener.accept().await.unwrap();
        assert_eq!(name, "sshclip");

        assert_eq!(Request::read(&mut channel.stream).await.unwrap(), Request::List);
        Response::Ok(OkBody::List(Vec::new())).write(&mut channel.stream).await.unwrap();

        let hint = ItemHashRecord {
            reg: b'q',
            content_hash: sshclip_core::content_hash(b"zzz"),
            created_at_nanos: 999,
        };
        channel.oob_out.send("sync", Bytes::copy_from_slice(&hint.encode())).await.unwrap();

        assert_eq!(Request::read(&mut channel.stream).await.unwrap(), Request::Get { reg: b'q' });
        Response::Ok(OkBody::Get { attrs: 0, payload: Bytes::from_static(b"zzz") })
            .write(&mut channel.stream)
            .await
            .unwrap();

        // Hold the connection open until the test is done with it.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let item = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(item) = cache.local().get_silent(b'q').await {
                return item;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("push hint was never applied");
    assert_eq!(item.payload, Bytes::from_static(b"zzz"));

    events.publish(&ShutdownEvent::Interrupt);
    supervisor.await.unwrap().unwrap();
    server.abort();
}
