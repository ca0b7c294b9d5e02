//! Socket ingest tests against a local WebSocket server.
//!
//! Run with: cargo test -p movers-engine --test stream_ingest

#![allow(clippy::unwrap_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use movers_engine::infrastructure::config::ApiKey;
use movers_engine::infrastructure::metrics::Channel;
use movers_engine::infrastructure::stream::ConnectionState;
use movers_engine::{AggregateIngester, AggregateStore, HaltIngester, HaltStore, StreamSupervisor};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

type ServerSocket = WebSocketStream<TcpStream>;

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .unwrap()
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn next_json(ws: &mut ServerSocket) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

fn supervisor(url: String) -> StreamSupervisor {
    StreamSupervisor::new(
        url,
        ApiKey::new("stream-key").unwrap(),
        Duration::from_millis(50),
        CancellationToken::new(),
    )
}

/// Run the auth handshake from the server side and return the
/// subscription parameter the client asked for.
async fn handshake(ws: &mut ServerSocket) -> String {
    send(ws, json!([{"ev": "status", "status": "connected"}])).await;

    let auth = next_json(ws).await;
    assert_eq!(auth, json!({"action": "auth", "params": "stream-key"}));

    // Nothing else may arrive before auth_success.
    assert!(
        tokio::time::timeout(Duration::from_millis(150), ws.next())
            .await
            .is_err()
    );

    send(ws, json!([{"ev": "status", "status": "auth_success"}])).await;
    let subscribe = next_json(ws).await;
    assert_eq!(subscribe["action"], "subscribe");
    subscribe["params"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn halts_flow_through_auth_subscribe_and_reconnect() {
    let (listener, url) = listen().await;
    let store = Arc::new(HaltStore::new());
    let supervisor = supervisor(url);
    assert!(supervisor.ensure_started(HaltIngester::new(Arc::clone(&store))));

    let mut ws = accept(&listener).await;
    assert_eq!(handshake(&mut ws).await, "LULD.*");
    let feed = supervisor.state(Channel::Halts);
    eventually(|| feed.is_connected()).await;

    send(
        &mut ws,
        json!([{"ev": "LULD", "T": "ABC", "h": 5.5, "l": 4.5, "i": [17], "z": 3, "t": 1_704_117_600_000_i64}]),
    )
    .await;
    ws.send(Message::Text("{broken".into())).await.unwrap();
    eventually(|| store.is_halted("ABC")).await;
    eventually(|| feed.frames_dropped() == 1).await;

    // Server goes away; the client comes back after the fixed delay.
    drop(ws);
    let mut ws = accept(&listener).await;
    assert_eq!(handshake(&mut ws).await, "LULD.*");
    eventually(|| feed.is_connected()).await;
    assert_eq!(feed.reconnect_attempts(), 0);

    send(&mut ws, json!([{"ev": "LULD", "T": "ABC", "i": [18], "t": 1_704_117_900_000_i64}])).await;
    eventually(|| !store.is_halted("ABC")).await;
    assert_eq!(store.get("ABC").unwrap().timestamp, Some(1_704_117_900_000));

    supervisor.shutdown().await;
    assert_eq!(feed.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn rejected_key_is_retried() {
    let (listener, url) = listen().await;
    let supervisor = supervisor(url);
    supervisor.ensure_started(HaltIngester::new(Arc::new(HaltStore::new())));

    let mut ws = accept(&listener).await;
    let auth = next_json(&mut ws).await;
    assert_eq!(auth["action"], "auth");
    send(
        &mut ws,
        json!([{"ev": "status", "status": "auth_failed", "message": "authentication failed"}]),
    )
    .await;

    // A fresh connection follows the failure.
    let mut ws = accept(&listener).await;
    assert_eq!(next_json(&mut ws).await["action"], "auth");
    assert!(supervisor.state(Channel::Halts).reconnect_attempts() >= 1);

    supervisor.shutdown().await;
}

#[tokio::test]
async fn minute_aggregates_land_in_the_table() {
    let (listener, url) = listen().await;
    let store = Arc::new(AggregateStore::new(100));
    let supervisor = supervisor(url);
    supervisor.ensure_started(AggregateIngester::new(Arc::clone(&store)));

    let mut ws = accept(&listener).await;
    assert_eq!(handshake(&mut ws).await, "AM.*");

    send(
        &mut ws,
        json!([
            {"ev": "AM", "sym": "XYZ", "v": 1200, "av": 85_000, "op": 10.2, "vw": 11.02,
             "o": 11.0, "c": 11.1, "h": 11.2, "l": 10.9, "a": 10.8, "z": 12,
             "s": 1_704_117_600_000_i64, "e": 1_704_117_660_000_i64},
            {"ev": "AM", "sym": "BAD", "o": "x"}
        ]),
    )
    .await;

    eventually(|| store.get("XYZ").is_some()).await;
    let aggregate = store.get("XYZ").unwrap();
    assert_eq!(aggregate.close, 11.1);
    assert_eq!(aggregate.accumulated_volume, Some(85_000.0));
    assert!(store.get("BAD").is_none());
    assert_eq!(supervisor.state(Channel::Aggregates).frames_dropped(), 1);

    supervisor.shutdown().await;
}
