//! End-to-end tests against a real local stream server: handshake,
//! queued/connected execute, timeout, and non-recoverable close. No
//! mocked transport — a real `TcpListener` plus `tokio-tungstenite` on
//! the server side. Preflight is covered separately in
//! `crate::preflight`'s own tests, so these run with it disabled and
//! exercise the upgrade handshake directly.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use interactive_core::error::ExecuteError;
use interactive_core::options::SocketOptions;
use interactive_core::socket::{Socket, SocketEvent, SocketState};

async fn accept_one(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn spawn_server() -> (String, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (format!("ws://{addr}/socket"), listener)
}

#[tokio::test]
async fn happy_path_execute_resolves_with_result() {
    let (url, listener) = spawn_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_one(&listener).await;
        match ws.next().await.unwrap().unwrap() {
            WsMessage::Text(text) => {
                let frame: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(frame["type"], "method");
                assert_eq!(frame["method"], "ready");
                assert_eq!(frame["id"], 0);
                let reply = json!({"type": "reply", "id": 0, "result": null});
                ws.send(WsMessage::Text(reply.to_string())).await.unwrap();
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        ws
    });

    let handle = Socket::spawn(url, SocketOptions::new().without_preflight());
    handle.connect();

    let result = handle
        .execute_with_timeout("ready", json!({"isReady": true}), false, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(result, Value::Null);

    let _ws = server.await.unwrap();
}

#[tokio::test]
async fn queued_while_connecting_drains_on_open() {
    let (url, listener) = spawn_server().await;

    let options = SocketOptions::new().without_preflight();
    let handle = Socket::spawn(url, options);

    // No connect() yet: the execute call must queue rather than fail.
    let execute_fut = {
        let handle = handle.clone();
        tokio::spawn(async move {
            handle
                .execute_with_timeout("ready", json!({}), false, Some(Duration::from_secs(5)))
                .await
        })
    };

    // Give the actor a moment to register the queued packet before the
    // peer exists at all.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.queue_size().await, 1);

    handle.connect();

    let server = tokio::spawn(async move {
        let mut ws = accept_one(&listener).await;
        match ws.next().await.unwrap().unwrap() {
            WsMessage::Text(text) => {
                let frame: Value = serde_json::from_str(&text).unwrap();
                let reply = json!({"type": "reply", "id": frame["id"], "result": "ok"});
                ws.send(WsMessage::Text(reply.to_string())).await.unwrap();
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    });

    let result = execute_fut.await.unwrap().unwrap();
    assert_eq!(result, json!("ok"));
    server.await.unwrap();
}

#[tokio::test]
async fn timeout_rejects_without_cancelling_on_server() {
    let (url, listener) = spawn_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_one(&listener).await;
        // Never reply; keep the connection open past the packet timeout.
        let _ = ws.next().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let handle = Socket::spawn(url, SocketOptions::new().without_preflight());
    handle.connect();

    let err = handle
        .execute_with_timeout("slow", json!({}), false, Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecuteError::Timeout));

    server.abort();
}

#[tokio::test]
async fn non_recoverable_close_emits_error_and_cancels_queue() {
    let (url, listener) = spawn_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_one(&listener).await;
        ws.close(Some(CloseFrame {
            code: 4006u16.into(),
            reason: "kicked".into(),
        }))
        .await
        .unwrap();
    });

    let handle = Socket::spawn(url, SocketOptions::new().without_preflight());
    let mut events = handle.subscribe();
    handle.connect();

    loop {
        match events.recv().await.unwrap() {
            SocketEvent::Error(interactive_core::socket::SocketError::Interactive(e)) => {
                assert_eq!(e.code, 4006);
                break;
            }
            _ => continue,
        }
    }

    assert_eq!(handle.state().await, SocketState::Idle);
    server.await.unwrap();
}

#[tokio::test]
async fn recoverable_close_schedules_reconnect() {
    let (url, listener) = spawn_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept_one(&listener).await;
        ws.close(Some(CloseFrame {
            code: 1011u16.into(),
            reason: "restart".into(),
        }))
        .await
        .unwrap();
    });

    let handle = Socket::spawn(url, SocketOptions::new().without_preflight());
    let mut events = handle.subscribe();
    handle.connect();

    loop {
        match events.recv().await.unwrap() {
            SocketEvent::Close { code, .. } => {
                assert_eq!(code, 1011);
                break;
            }
            _ => continue,
        }
    }

    assert_eq!(handle.state().await, SocketState::Reconnecting);
    server.await.unwrap();
}
