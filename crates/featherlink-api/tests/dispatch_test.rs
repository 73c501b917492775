#![allow(clippy::unwrap_used)]
// Integration tests for `CallDispatcher` driven by the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::time::Instant;

use featherlink_api::memory::{self, MemoryServer, MemoryTransport};
use featherlink_api::{
    CONNECT_EVENT, CallDispatcher, ConnectionStatus, Endpoint, Error, Pagination, RemoteStatus,
    Response, SocketTransport, TimeoutStart, WireCall,
};

const TIMEOUT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

fn setup(
    status: ConnectionStatus,
) -> (Arc<MemoryTransport>, MemoryServer, CallDispatcher<MemoryTransport>) {
    let (transport, server) = memory::channel();
    server.set_status(status);
    let transport = Arc::new(transport);
    let dispatcher = CallDispatcher::new(Arc::downgrade(&transport), TIMEOUT);
    (transport, server, dispatcher)
}

fn find_messages() -> WireCall {
    Endpoint::find("messages", None).wire_call()
}

/// Let spawned tasks run until they block.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_connected_call_emits_immediately() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));

    let call = server.next_call().await.unwrap();
    assert_eq!(call.event, "find");
    assert_eq!(call.args, vec![json!("messages"), json!({})]);
    call.ack(vec![
        Value::Null,
        json!({ "total": 2, "limit": 10, "skip": 0, "data": [{ "id": 1 }, { "id": 2 }] }),
    ]);

    let response = handle.await.unwrap().unwrap();
    assert_eq!(
        response,
        Response::paginated(
            Pagination {
                total: 2,
                limit: 10,
                skip: 0
            },
            vec![json!({ "id": 1 }), json!({ "id": 2 })]
        )
    );
}

#[tokio::test]
async fn test_disconnected_call_emits_immediately() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Disconnected);

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));
    server.next_call().await.unwrap().ack(vec![json!([])]);

    assert_eq!(handle.await.unwrap(), Ok(Response::list(vec![])));
}

#[tokio::test]
async fn test_error_reply_is_classified() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);

    let handle = tokio::spawn(dispatcher.dispatch(WireCall::new("authenticate", vec![json!({})])));
    server
        .next_call()
        .await
        .unwrap()
        .ack(vec![json!({ "code": 401, "message": "Invalid login" })]);

    assert_eq!(
        handle.await.unwrap(),
        Err(Error::Status {
            status: RemoteStatus::NotAuthenticated,
            message: Some("Invalid login".into())
        })
    );
}

#[tokio::test]
async fn test_no_ack_sentinel_is_not_found() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));
    server.next_call().await.unwrap().ack(vec![json!("NO ACK")]);

    assert_eq!(handle.await.unwrap(), Err(Error::NotFound));
}

#[tokio::test]
async fn test_concurrent_calls_resolve_independently() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);

    let first = tokio::spawn(dispatcher.dispatch(Endpoint::get("users", 1_i64, None).wire_call()));
    let call_a = server.next_call().await.unwrap();
    let second = tokio::spawn(dispatcher.dispatch(Endpoint::get("users", 2_i64, None).wire_call()));
    let call_b = server.next_call().await.unwrap();

    assert_eq!(call_a.args[1], json!(1));
    assert_eq!(call_b.args[1], json!(2));

    call_b.ack(vec![Value::Null, json!({ "id": 2 })]);
    call_a.ack(vec![Value::Null, json!({ "id": 1 })]);

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.data.as_object().unwrap()["id"], json!(1));
    assert_eq!(second.data.as_object().unwrap()["id"], json!(2));
}

// ── Laziness and interruption ───────────────────────────────────────

#[tokio::test]
async fn test_dispatch_is_lazy() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);

    let future = dispatcher.dispatch(find_messages());
    settle().await;
    assert!(server.try_next_call().is_none());
    drop(future);
    assert!(server.try_next_call().is_none());
}

#[tokio::test]
async fn test_released_transport_interrupts_call() {
    let (transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);
    let future = dispatcher.dispatch(find_messages());
    drop(transport);

    assert_eq!(future.await, Err(Error::TransportInterrupted));
    assert!(server.try_next_call().is_none());
}

#[tokio::test]
async fn test_dropped_ack_interrupts_call() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));
    drop(server.next_call().await.unwrap());

    assert_eq!(handle.await.unwrap(), Err(Error::TransportInterrupted));
}

// ── Connect deferral ────────────────────────────────────────────────

#[tokio::test]
async fn test_connecting_call_waits_for_single_connect() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connecting);

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));
    settle().await;

    assert!(server.try_next_call().is_none(), "emit must wait for connect");
    assert_eq!(server.listener_count(CONNECT_EVENT), 1);

    assert_eq!(server.accept_connection(), 1);
    let call = server.next_call().await.unwrap();
    assert_eq!(call.event, "find");

    // A second connect must not re-emit.
    server.push_event(CONNECT_EVENT, vec![]);
    settle().await;
    assert!(server.try_next_call().is_none());
    assert_eq!(server.listener_count(CONNECT_EVENT), 0);

    call.ack(vec![json!([1, 2, 3])]);
    assert_eq!(
        handle.await.unwrap(),
        Ok(Response::list(vec![json!(1), json!(2), json!(3)]))
    );
}

#[tokio::test]
async fn test_connect_listener_removed_interrupts_call() {
    let (transport, _server, dispatcher) = setup(ConnectionStatus::Connecting);

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));
    settle().await;
    transport.off(CONNECT_EVENT);

    assert_eq!(handle.await.unwrap(), Err(Error::TransportInterrupted));
}

// ── Timeouts ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_missing_ack_times_out_after_exact_timeout() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);
    let start = Instant::now();

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));
    let call = server.next_call().await.unwrap();

    let result = handle.await.unwrap();
    assert_eq!(result, Err(Error::TimedOut { timeout: TIMEOUT }));
    assert_eq!(start.elapsed(), TIMEOUT);

    // The late ack has nobody left to resolve.
    assert!(!call.ack(vec![json!([])]));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_starts_at_emit_by_default() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connecting);
    assert_eq!(dispatcher.timeout_start(), TimeoutStart::OnEmit);
    let start = Instant::now();

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!handle.is_finished(), "connect wait has no bound");

    server.accept_connection();
    let _call = server.next_call().await.unwrap();

    assert_eq!(
        handle.await.unwrap(),
        Err(Error::TimedOut { timeout: TIMEOUT })
    );
    assert_eq!(start.elapsed(), Duration::from_secs(65));
}

#[tokio::test(start_paused = true)]
async fn test_never_connecting_transport_hangs_when_timing_from_emit() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connecting);

    let pending = tokio::time::timeout(
        Duration::from_secs(3600),
        dispatcher.dispatch(find_messages()),
    )
    .await;

    assert!(pending.is_err(), "call must still be waiting for connect");
    assert!(server.try_next_call().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_from_dispatch_bounds_connect_wait() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connecting);
    let dispatcher = dispatcher.with_timeout_start(TimeoutStart::OnDispatch);
    let start = Instant::now();

    let result = dispatcher.dispatch(find_messages()).await;

    assert_eq!(result, Err(Error::TimedOut { timeout: TIMEOUT }));
    assert_eq!(start.elapsed(), TIMEOUT);
    assert!(server.try_next_call().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_from_dispatch_includes_connect_wait() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connecting);
    let dispatcher = dispatcher.with_timeout_start(TimeoutStart::OnDispatch);
    let start = Instant::now();

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));
    tokio::time::sleep(Duration::from_secs(3)).await;
    server.accept_connection();
    let _call = server.next_call().await.unwrap();

    assert_eq!(
        handle.await.unwrap(),
        Err(Error::TimedOut { timeout: TIMEOUT })
    );
    assert_eq!(start.elapsed(), TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn test_sub_second_timeout_is_reported_exactly() {
    let (transport, mut server, _) = setup(ConnectionStatus::Connected);
    let timeout = Duration::from_millis(250);
    let dispatcher = CallDispatcher::new(Arc::downgrade(&transport), timeout);
    let start = Instant::now();

    let handle = tokio::spawn(dispatcher.dispatch(find_messages()));
    let _call = server.next_call().await.unwrap();

    let result = handle.await.unwrap();
    assert_eq!(result, Err(Error::TimedOut { timeout }));
    assert_eq!(start.elapsed(), timeout);
    assert_eq!(
        result.unwrap_err().to_string(),
        "Call timed out after 250ms"
    );
}

// ── Eager emit ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_emit_now_emits_before_polling() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connecting);

    let reply = dispatcher.emit_now(find_messages());

    let call = server.try_next_call().expect("emitted without waiting for connect");
    assert_eq!(call.event, "find");
    call.ack(vec![json!([{ "id": 1 }])]);

    assert_eq!(reply.await, Ok(Response::list(vec![json!({ "id": 1 })])));
}

#[tokio::test]
async fn test_emit_now_from_connect_handler_precedes_deferred_calls() {
    let (transport, mut server, dispatcher) = setup(ConnectionStatus::Connecting);

    let eager = dispatcher.clone();
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    transport.once(
        CONNECT_EVENT,
        Box::new(move |_| {
            let _ = reply_tx.send(eager.emit_now(WireCall::new("authenticate", Vec::new())));
        }),
    );
    let deferred = tokio::spawn(dispatcher.dispatch(find_messages()));
    settle().await;
    assert_eq!(server.listener_count(CONNECT_EVENT), 2);

    server.accept_connection();

    let first = server.next_call().await.unwrap();
    assert_eq!(first.event, "authenticate");
    let second = server.next_call().await.unwrap();
    assert_eq!(second.event, "find");

    second.ack(vec![json!([])]);
    first.ack(vec![json!({ "accessToken": "fresh" })]);
    assert_eq!(deferred.await.unwrap(), Ok(Response::list(Vec::new())));
    let authenticated = reply_rx.await.unwrap().await.unwrap();
    assert_eq!(authenticated.str_field("accessToken"), Some("fresh"));
}

#[tokio::test(start_paused = true)]
async fn test_emit_now_times_out_from_emit() {
    let (_transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);
    let start = Instant::now();

    let reply = dispatcher.emit_now(find_messages());
    let _call = server.next_call().await.unwrap();

    assert_eq!(reply.await, Err(Error::TimedOut { timeout: TIMEOUT }));
    assert_eq!(start.elapsed(), TIMEOUT);
}

#[tokio::test]
async fn test_emit_now_on_released_transport_is_interrupted() {
    let (transport, mut server, dispatcher) = setup(ConnectionStatus::Connected);
    drop(transport);

    let reply = dispatcher.emit_now(find_messages());

    assert!(server.try_next_call().is_none());
    assert_eq!(reply.await, Err(Error::TransportInterrupted));
}
