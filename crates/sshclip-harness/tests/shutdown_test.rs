//! P10: after a `Terminate` event is dispatched, the listen loop stops
//! accepting new connections within one accept/select cycle, while a
//! connection already accepted is allowed to finish its in-flight request.

use std::sync::Arc;

use bytes::Bytes;
use sshclip_core::{EventBus, InMemoryStore, ShutdownEvent};
use sshclip_harness::TestEnv;
use sshclip_proto::{OkBody, Request, Response, ResponseShape};
use sshclip_server::run_local;
use sshclip_transport::local::{connect, LocalListener};

#[tokio::test]
async fn in_flight_request_completes_but_new_connections_are_refused_after_terminate() {
    let dir = std::env::temp_dir().join(format!("sshclip-harness-shutdown-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("sshclip.sock");

    let listener = LocalListener::bind(&path).unwrap();
    let store = Arc::new(InMemoryStore::new(TestEnv::new()));
    let events = EventBus::new();

    let loop_handle = tokio::spawn(run_local(listener, store, events.clone()));

    let mut client = connect(&path, None).await.unwrap();
    Request::Put { reg: b'a', attrs: 0, payload: Bytes::from_static(b"hi") }
        .write(&mut client)
        .await
        .unwrap();

    // The connection is already accepted; dispatch Terminate before reading
    // the response back, simulating a request in flight at shutdown time.
    events.publish(&ShutdownEvent::Terminate);

    let response = Response::read(&mut client, ResponseShape::Empty).await.unwrap();
    assert_eq!(response, Response::Ok(OkBody::Empty));
    drop(client);

    loop_handle.await.unwrap().unwrap();

    // The loop has returned and unlinked the socket; a fresh dial must fail.
    assert!(connect(&path, Some(std::time::Duration::from_millis(200))).await.is_err());

    let _ = std::fs::remove_dir_all(&dir);
}
