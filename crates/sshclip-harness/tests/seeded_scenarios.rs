//! The seeded end-to-end scenarios: each drives the request handler (or, for
//! the agent-side scenarios, the cache store and reconcile pass) with the
//! exact byte sequences, asserting the exact response bytes back.

use bytes::Bytes;
use sshclip_agent::CacheStore;
use sshclip_core::{EventBus, InMemoryStore};
use sshclip_harness::TestEnv;
use sshclip_proto::{ItemHashRecord, OkBody, Op, Request, Response, ResponseShape};
use sshclip_server::serve_connection;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

async fn read_exact_n(stream: &mut (impl tokio::io::AsyncRead + Unpin), n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn scenario_1_simple_put_then_get() {
    let store = InMemoryStore::new(TestEnv::new());
    let events = EventBus::new();
    let (mut client, server) = duplex(4096);

    let handler = tokio::spawn(async move { serve_connection(server, &store, &events).await });

    client.write_all(&[1, Op::Put.to_u8(), b'*', 0, 0, 0, 3, b'h', b'i', b'!']).await.unwrap();
    let response = read_exact_n(&mut client, 2).await;
    assert_eq!(response, [1, Op::Ok.to_u8()]);

    client.write_all(&[1, Op::Get.to_u8(), b'*']).await.unwrap();
    let response = read_exact_n(&mut client, 1 + 1 + 1 + 3 + 3).await;
    assert_eq!(response, [1, Op::Ok.to_u8(), 0, 0, 0, 3, b'h', b'i', b'!']);

    drop(client);
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn scenario_2_uppercase_append() {
    let store = InMemoryStore::new(TestEnv::new());
    let events = EventBus::new();
    let (mut client, mut server) = duplex(4096);
    let handler = tokio::spawn(async move { serve_connection(&mut server, &store, &events).await });

    Request::Put { reg: b'A', attrs: 1, payload: Bytes::from_static(b"foo") }
        .write(&mut client)
        .await
        .unwrap();
    assert_eq!(Response::read(&mut client, ResponseShape::Empty).await.unwrap(), Response::Ok(OkBody::Empty));

    Request::Put { reg: b'A', attrs: 1, payload: Bytes::from_static(b"bar") }
        .write(&mut client)
        .await
        .unwrap();
    assert_eq!(Response::read(&mut client, ResponseShape::Empty).await.unwrap(), Response::Ok(OkBody::Empty));

    Request::Get { reg: b'a' }.write(&mut client).await.unwrap();
    assert_eq!(
        Response::read(&mut client, ResponseShape::Get).await.unwrap(),
        Response::Ok(OkBody::Get { attrs: 1, payload: Bytes::from_static(b"foobar") })
    );

    drop(client);
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn scenario_3_invalid_register_is_an_err_response() {
    let store = InMemoryStore::new(TestEnv::new());
    let events = EventBus::new();
    let (mut client, mut server) = duplex(4096);
    let handler = tokio::spawn(async move { serve_connection(&mut server, &store, &events).await });

    Request::Put { reg: b'#', attrs: 0, payload: Bytes::from_static(b"x") }.write(&mut client).await.unwrap();
    match Response::read(&mut client, ResponseShape::Empty).await.unwrap() {
        Response::Err(_) => {}
        other => panic!("expected an ERR response, got {other:?}"),
    }

    drop(client);
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn scenario_4_list_with_one_entry() {
    let store = InMemoryStore::new(TestEnv::new());
    let events = EventBus::new();
    let (mut client, mut server) = duplex(4096);
    let handler = tokio::spawn(async move { serve_connection(&mut server, &store, &events).await });

    Request::Put { reg: b'*', attrs: 0, payload: Bytes::from_static(b"hi!") }
        .write(&mut client)
        .await
        .unwrap();
    assert_eq!(Response::read(&mut client, ResponseShape::Empty).await.unwrap(), Response::Ok(OkBody::Empty));

    Request::List.write(&mut client).await.unwrap();
    match Response::read(&mut client, ResponseShape::List).await.unwrap() {
        Response::Ok(OkBody::List(records)) => {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].reg, b'*');
            assert_eq!(records[0].content_hash, sshclip_core::content_hash(b"hi!"));
        }
        other => panic!("expected a LIST response, got {other:?}"),
    }

    drop(client);
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn scenario_5_reconcile_pull_from_an_empty_agent() {
    let (cache, _write_back, upstream_slot) = CacheStore::<TestEnv, tokio::io::DuplexStream>::new(TestEnv::new());
    let (mut upstream_server, upstream_client) = duplex(4096);
    *upstream_slot.write().await = Some(std::sync::Arc::new(sshclip_agent::UpstreamClient::new(upstream_client)));
    let upstream = upstream_slot.read().await.clone().unwrap();

    let upstream_task = tokio::spawn(async move {
        assert_eq!(Request::read(&mut upstream_server).await.unwrap(), Request::List);
        let record = ItemHashRecord { reg: b'a', content_hash: sshclip_core::content_hash(b"x"), created_at_nanos: 100 };
        Response::Ok(OkBody::List(vec![record])).write(&mut upstream_server).await.unwrap();

        assert_eq!(Request::read(&mut upstream_server).await.unwrap(), Request::Get { reg: b'a' });
        Response::Ok(OkBody::Get { attrs: 0, payload: Bytes::from_static(b"x") })
            .write(&mut upstream_server)
            .await
            .unwrap();
    });

    sshclip_agent::test_support::reconcile(&cache, &upstream).await.unwrap();
    upstream_task.await.unwrap();

    let item = cache.local().get_silent(b'a').await.unwrap();
    assert_eq!(item.payload, Bytes::from_static(b"x"));
    assert_eq!(item.created_at_nanos, 100);
}

#[tokio::test]
async fn scenario_6_push_hint_drives_a_refetch() {
    let (cache, _write_back, upstream_slot) = CacheStore::<TestEnv, tokio::io::DuplexStream>::new(TestEnv::new());
    let (mut upstream_server, upstream_client) = duplex(4096);
    *upstream_slot.write().await = Some(std::sync::Arc::new(sshclip_agent::UpstreamClient::new(upstream_client)));
    let cache = std::sync::Arc::new(cache);

    let mut changes = cache.local().subscribe_changes();

    let upstream_task = tokio::spawn(async move {
        assert_eq!(Request::read(&mut upstream_server).await.unwrap(), Request::Get { reg: b'b' });
        Response::Ok(OkBody::Get { attrs: 0, payload: Bytes::from_static(b"new") })
            .write(&mut upstream_server)
            .await
            .unwrap();
    });

    let hint = ItemHashRecord { reg: b'b', content_hash: sshclip_core::content_hash(b"new"), created_at_nanos: 200 };
    cache.handle_push_hint(hint);

    upstream_task.await.unwrap();
    let item = tokio::time::timeout(std::time::Duration::from_secs(1), async {
        loop {
            let item = cache.local().get_silent(b'b').await;
            if let Ok(item) = item {
                return item;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(item.payload, Bytes::from_static(b"new"));

    let event = changes.recv().await.unwrap();
    assert_eq!(event.op, sshclip_core::ChangeOp::Put);
    assert_eq!(event.reg, b'b');
}
