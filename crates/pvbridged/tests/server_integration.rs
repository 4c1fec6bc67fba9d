//! End-to-end tests for the WebSocket server.
//!
//! These tests run a `BridgeServer` on an ephemeral port and talk to it with
//! a real WebSocket client.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use pvbridge_core::{RawUpdate, VariableName};
use pvbridge_protocol::codec::decode_f64;
use pvbridged::config::BridgeConfig;
use pvbridged::provider::{LocalProvider, PvProvider};
use pvbridged::registry::RegistryHandle;
use pvbridged::server::BridgeServer;

use common::{RecordingProvider, RECV_TIMEOUT, SILENCE};

/// Maximum time to wait for an asynchronous side effect
const CONDITION_TIMEOUT: Duration = Duration::from_secs(2);

/// Interval between condition checks
const POLL_INTERVAL: Duration = Duration::from_millis(10);

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Test Helpers
// ============================================================================

/// Running server that shuts down when dropped.
struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn(provider: Arc<dyn PvProvider>) -> Self {
        Self::spawn_with(BridgeConfig::default(), provider).await
    }

    async fn spawn_with(config: BridgeConfig, provider: Arc<dyn PvProvider>) -> Self {
        let cancel_token = CancellationToken::new();
        let server = BridgeServer::bind(
            config.with_bind("127.0.0.1:0"),
            provider,
            cancel_token.clone(),
        )
        .await
        .expect("bind server");

        let addr = server.local_addr().expect("local addr");
        let registry = server.registry();
        tokio::spawn(server.run());

        Self {
            addr,
            registry,
            cancel_token,
        }
    }

    async fn connect(&self) -> Client {
        let (ws, _) = connect_async(format!("ws://{}", self.addr))
            .await
            .expect("websocket connect");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Reads the next text frame as JSON, skipping control frames.
async fn recv(ws: &mut Client) -> Value {
    let deadline = Instant::now() + RECV_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let msg = timeout(remaining, ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("valid JSON");
        }
    }
}

async fn assert_silent(ws: &mut Client) {
    if let Ok(Some(Ok(Message::Text(text)))) = timeout(SILENCE, ws.next()).await {
        panic!("unexpected frame: {}", text.as_str());
    }
}

/// Round-trips a `list` so every earlier frame from `ws` has been handled.
async fn sync(ws: &mut Client) -> Value {
    send(ws, json!({"type": "list"})).await;
    loop {
        let msg = recv(ws).await;
        if msg["type"] == "list" {
            return msg;
        }
    }
}

async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < CONDITION_TIMEOUT {
        if condition() {
            return;
        }
        sleep(POLL_INTERVAL).await;
    }
    panic!("condition not met within {CONDITION_TIMEOUT:?}");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_local_variable_subscribe_and_write() {
    let server = TestServer::spawn(Arc::new(LocalProvider::new())).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    send(&mut a, json!({"type": "subscribe", "pvs": ["loc://setpoint"]})).await;
    let initial = recv(&mut a).await;
    assert_eq!(initial["type"], "update");
    assert_eq!(initial["pv"], "loc://setpoint");
    assert_eq!(initial["value"], 0.0);
    assert_eq!(initial["alarm"]["message"], "NO_ALARM");
    assert!(initial["timeStamp"]["secondsPastEpoch"].is_i64());

    send(&mut b, json!({"type": "subscribe", "pvs": ["loc://setpoint"]})).await;
    assert_eq!(sync(&mut b).await["pvs"], json!(["loc://setpoint"]));

    send(&mut a, json!({"type": "write", "pv": "loc://setpoint", "value": 4.5})).await;
    assert_eq!(recv(&mut a).await["value"], 4.5);
    assert_eq!(recv(&mut b).await["value"], 4.5);
}

#[tokio::test]
async fn test_wave_arrives_as_packed_doubles() {
    let server = TestServer::spawn(Arc::new(LocalProvider::new())).await;
    let mut a = server.connect().await;

    send(&mut a, json!({"type": "subscribe", "pvs": ["sim://wave"]})).await;
    let msg = recv(&mut a).await;

    assert_eq!(msg["pv"], "sim://wave");
    assert!(msg.get("value").is_none());
    let points = decode_f64(msg["b64dbl"].as_str().expect("b64dbl field")).unwrap();
    assert_eq!(points.len(), 64);
}

#[tokio::test]
async fn test_disconnect_releases_upstream_subscription() {
    let provider = RecordingProvider::new();
    let server = TestServer::spawn(Arc::new(provider.clone())).await;
    let mut a = server.connect().await;
    let mut b = server.connect().await;

    send(&mut a, json!({"type": "subscribe", "pvs": ["X", "Y"]})).await;
    send(&mut b, json!({"type": "subscribe", "pvs": ["X"]})).await;
    sync(&mut a).await;
    sync(&mut b).await;

    assert!(provider.emit("X", RawUpdate::with_value(1.0)));
    assert_eq!(recv(&mut a).await["pv"], "X");
    assert_eq!(recv(&mut b).await["pv"], "X");

    b.close(None).await.unwrap();
    drop(b);

    let registry = server.registry.clone();
    let mut done = false;
    for _ in 0..200 {
        if registry.subscribers(VariableName::new("X")).await.len() == 1 {
            done = true;
            break;
        }
        sleep(POLL_INTERVAL).await;
    }
    assert!(done, "B was not removed from the registry");
    assert_eq!(provider.unsubscribe_count("X"), 0);

    drop(a);
    wait_until(|| provider.unsubscribe_count("X") == 1 && provider.unsubscribe_count("Y") == 1)
        .await;

    // Cleanup never repeats
    sleep(SILENCE).await;
    assert_eq!(provider.unsubscribe_count("X"), 1);
    assert_eq!(provider.unsubscribe_count("Y"), 1);
}

#[tokio::test]
async fn test_malformed_frames_get_error_replies() {
    let server = TestServer::spawn(Arc::new(RecordingProvider::new())).await;
    let mut a = server.connect().await;

    a.send(Message::text("{broken")).await.unwrap();
    assert_eq!(recv(&mut a).await["type"], "error");

    send(&mut a, json!({"type": "fly"})).await;
    assert_eq!(
        recv(&mut a).await,
        json!({"type": "error", "message": "Unknown message type"})
    );

    a.send(Message::binary(vec![1_u8, 2, 3])).await.unwrap();
    assert_eq!(
        recv(&mut a).await,
        json!({"type": "error", "message": "Binary frames are not supported"})
    );

    // Still usable afterwards
    send(&mut a, json!({"type": "subscribe", "pvs": ["X"]})).await;
    assert_eq!(sync(&mut a).await["pvs"], json!(["X"]));
}

#[tokio::test]
async fn test_oversized_frame_rejected() {
    let config = BridgeConfig {
        max_message_size: 64,
        ..BridgeConfig::default()
    };
    let server = TestServer::spawn_with(config, Arc::new(RecordingProvider::new())).await;
    let mut a = server.connect().await;

    let long_name = "P".repeat(100);
    send(&mut a, json!({"type": "subscribe", "pvs": [long_name.clone()]})).await;

    let reply = recv(&mut a).await;
    assert_eq!(reply["type"], "error");
    assert!(reply["message"].as_str().unwrap().starts_with("Message too large"));
    assert!(!server.registry.is_watched(VariableName::new(long_name)).await);
}

#[tokio::test]
async fn test_write_gating_end_to_end() {
    let provider = RecordingProvider::new();
    let server = TestServer::spawn(Arc::new(provider.clone())).await;
    let mut a = server.connect().await;

    send(&mut a, json!({"type": "write", "pv": "X", "value": 1})).await;
    sync(&mut a).await;
    assert!(provider.writes().is_empty());

    send(&mut a, json!({"type": "subscribe", "pvs": ["X"]})).await;
    send(&mut a, json!({"type": "write", "pv": "X", "value": 1})).await;
    sync(&mut a).await;
    assert_eq!(provider.writes().len(), 1);
}

#[tokio::test]
async fn test_ping_is_silent() {
    let server = TestServer::spawn(Arc::new(RecordingProvider::new())).await;
    let mut a = server.connect().await;

    send(&mut a, json!({"type": "ping"})).await;
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_client_limit_enforced() {
    let config = BridgeConfig {
        max_clients: 1,
        ..BridgeConfig::default()
    };
    let server = TestServer::spawn_with(config, Arc::new(RecordingProvider::new())).await;
    let mut first = server.connect().await;
    sync(&mut first).await;

    let second = connect_async(format!("ws://{}", server.addr)).await;
    assert!(second.is_err(), "second client should be refused");

    // The first client is unaffected
    assert_eq!(sync(&mut first).await["pvs"], json!([]));
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let server = TestServer::spawn(Arc::new(RecordingProvider::new())).await;
    let mut a = server.connect().await;
    sync(&mut a).await;

    server.cancel_token.cancel();

    let closed = timeout(RECV_TIMEOUT, async {
        loop {
            match a.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "client was not closed on shutdown");
}
