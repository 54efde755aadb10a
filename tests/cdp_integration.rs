//! Integration tests for the CDP WebSocket client.
//!
//! Each test spins up a mock WebSocket server with configurable behavior,
//! connects a `CdpClient`, and verifies the expected interactions.

#![allow(clippy::needless_pass_by_value)]

use std::net::SocketAddr;
use std::time::Duration;

use debug_bridge::cdp::{CdpClient, CdpConfig, CdpError};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

// =============================================================================
// Mock server helpers
// =============================================================================

/// Start a mock inspector that echoes `{"id": N, "result": {}}` for each command.
async fn start_echo_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                while let Some(Ok(msg)) = source.next().await {
                    if let Message::Text(text) = msg {
                        let cmd: Value = serde_json::from_str(&text).unwrap();
                        let response = json!({"id": cmd["id"], "result": {}});
                        sink.send(Message::Text(response.to_string().into()))
                            .await
                            .unwrap();
                    }
                }
            });
        }
    });
    (addr, handle)
}

/// Start a mock server that responds with a custom result for each command.
async fn start_custom_result_server(
    result_fn: fn(&Value) -> Value,
) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                while let Some(Ok(msg)) = source.next().await {
                    if let Message::Text(text) = msg {
                        let cmd: Value = serde_json::from_str(&text).unwrap();
                        let result = result_fn(&cmd);
                        let response = json!({"id": cmd["id"], "result": result});
                        sink.send(Message::Text(response.to_string().into()))
                            .await
                            .unwrap();
                    }
                }
            });
        }
    });
    (addr, handle)
}

/// Start a mock server that never responds to commands (for timeout tests).
async fn start_silent_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (_sink, mut source) = ws.split();
                // Accept commands but never respond
                while source.next().await.is_some() {}
            });
        }
    });
    (addr, handle)
}

/// Start a mock server that returns a CDP protocol error for each command.
async fn start_protocol_error_server(code: i64, message: &str) -> (SocketAddr, JoinHandle<()>) {
    let message = message.to_owned();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let message = message.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                while let Some(Ok(msg)) = source.next().await {
                    if let Message::Text(text) = msg {
                        let cmd: Value = serde_json::from_str(&text).unwrap();
                        let response = json!({
                            "id": cmd["id"],
                            "error": {"code": code, "message": message}
                        });
                        sink.send(Message::Text(response.to_string().into()))
                            .await
                            .unwrap();
                    }
                }
            });
        }
    });
    (addr, handle)
}

/// Start a mock server that reads one command and drops the connection
/// without ever responding.
async fn start_drop_without_reply_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (sink, mut source) = ws.split();
            let _ = source.next().await;
            drop(sink);
            drop(source);
        }
    });
    (addr, handle)
}

/// Start a mock server that emits events on demand via a channel.
async fn start_event_server() -> (SocketAddr, mpsc::Sender<Value>, JoinHandle<()>) {
    let (event_tx, mut event_rx) = mpsc::channel::<Value>(32);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();

            loop {
                tokio::select! {
                    // Handle incoming commands (echo response)
                    msg = source.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let cmd: Value = serde_json::from_str(&text).unwrap();
                                let response = json!({"id": cmd["id"], "result": {}});
                                sink.send(Message::Text(response.to_string().into()))
                                    .await
                                    .unwrap();
                            }
                            None | Some(Err(_)) => break,
                            _ => {}
                        }
                    }
                    // Send events requested by tests
                    event = event_rx.recv() => {
                        if let Some(event) = event {
                            sink.send(Message::Text(event.to_string().into()))
                                .await
                                .unwrap();
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    });
    (addr, event_tx, handle)
}

/// Start a mock server that sends malformed JSON, then continues serving normally.
async fn start_malformed_then_echo_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut source) = ws.split();
                let mut first = true;
                while let Some(Ok(msg)) = source.next().await {
                    if let Message::Text(text) = msg {
                        let cmd: Value = serde_json::from_str(&text).unwrap();
                        if first {
                            // Send malformed JSON first
                            sink.send(Message::Text(r"this is not json{".into()))
                                .await
                                .unwrap();
                            first = false;
                        }
                        // Then send a proper response
                        let response = json!({"id": cmd["id"], "result": {}});
                        sink.send(Message::Text(response.to_string().into()))
                            .await
                            .unwrap();
                    }
                }
            });
        }
    });
    (addr, handle)
}

fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}")
}

fn quick_config() -> CdpConfig {
    CdpConfig {
        connect_timeout: Duration::from_secs(5),
        command_timeout: Duration::from_secs(5),
        channel_capacity: 256,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn connect_to_mock_server() {
    let (addr, _handle) = start_echo_server().await;
    let client = CdpClient::connect(&ws_url(addr), quick_config()).await;
    assert!(client.is_ok());
    let client = client.unwrap();
    assert!(client.is_connected());
}

#[tokio::test]
async fn send_command_and_receive_response() {
    let (addr, _handle) = start_echo_server().await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    let result = client.send_command("Debugger.enable", None).await;

    assert!(result.is_ok());
    let value = result.unwrap();
    assert!(value.is_object());
}

#[tokio::test]
async fn concurrent_command_correlation() {
    // Server returns the command's id as a result value
    let (addr, _handle) = start_custom_result_server(|cmd| json!({"echo_id": cmd["id"]})).await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    // Send 10 commands concurrently using join_all
    let client_ref = &client;
    let futures: Vec<_> = (0..10)
        .map(|i| async move {
            let method = format!("Test.method{i}");
            client_ref.send_command(&method, None).await
        })
        .collect();

    let results = futures_util::future::join_all(futures).await;

    // All 10 should succeed with distinct echo_ids
    let ids: std::collections::HashSet<u64> = results
        .iter()
        .map(|r| {
            let value = r.as_ref().expect("command failed");
            value["echo_id"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(ids.len(), 10, "expected 10 unique response IDs");
}

#[tokio::test]
async fn receive_cdp_events() {
    let (addr, event_tx, _handle) = start_event_server().await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    let mut rx = client.subscribe("Debugger.paused").await.unwrap();

    // Server emits the event
    event_tx
        .send(json!({
            "method": "Debugger.paused",
            "params": {"reason": "other", "callFrames": []}
        }))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed");

    assert_eq!(event.method, "Debugger.paused");
    assert_eq!(event.params["reason"], "other");
}

#[tokio::test]
async fn events_are_delivered_in_order() {
    let (addr, event_tx, _handle) = start_event_server().await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    let mut rx = client.subscribe("Debugger.scriptParsed").await.unwrap();

    for i in 0..5 {
        event_tx
            .send(json!({
                "method": "Debugger.scriptParsed",
                "params": {"scriptId": i.to_string(), "url": format!("file:///s{i}.js")}
            }))
            .await
            .unwrap();
    }

    for i in 0..5 {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(event.params["scriptId"], i.to_string());
    }
}

#[tokio::test]
async fn event_unsubscription_on_drop() {
    let (addr, event_tx, _handle) = start_event_server().await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    let rx = client.subscribe("Runtime.consoleAPICalled").await.unwrap();
    // Drop the receiver
    drop(rx);

    // Give transport time to notice the drop
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Server sends event — should not cause issues
    event_tx
        .send(json!({
            "method": "Runtime.consoleAPICalled",
            "params": {"type": "log", "args": []}
        }))
        .await
        .unwrap();

    // Client should still be functional
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn connection_timeout() {
    // Connect to a non-routable address with a very short timeout
    let config = CdpConfig {
        connect_timeout: Duration::from_secs(1),
        command_timeout: Duration::from_secs(1),
        channel_capacity: 16,
    };

    let start = std::time::Instant::now();
    let result = CdpClient::connect("ws://192.0.2.1:9999", config).await;
    let elapsed = start.elapsed();

    assert!(result.is_err());
    assert!(
        elapsed < Duration::from_secs(3),
        "should timeout quickly, took {elapsed:?}"
    );

    match result {
        Err(CdpError::ConnectionTimeout | CdpError::Connection(_)) => {}
        Err(other) => panic!("expected ConnectionTimeout or Connection, got: {other}"),
        Ok(_) => panic!("expected connection error, but connection succeeded"),
    }
}

#[tokio::test]
async fn command_timeout() {
    let (addr, _handle) = start_silent_server().await;
    let config = CdpConfig {
        connect_timeout: Duration::from_secs(5),
        command_timeout: Duration::from_secs(1),
        channel_capacity: 256,
    };
    let client = CdpClient::connect(&ws_url(addr), config).await.unwrap();

    let result = client.send_command("Slow.method", None).await;
    assert!(result.is_err());
    let err = result.unwrap_err();
    assert!(
        matches!(err, CdpError::CommandTimeout { .. }),
        "expected CommandTimeout, got: {err}"
    );
}

#[tokio::test]
async fn pending_waiters_fail_when_peer_drops() {
    let (addr, _handle) = start_drop_without_reply_server().await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    // The server reads this command and drops the socket without replying.
    let result = client.send_command("Debugger.resume", None).await;
    let err = result.unwrap_err();
    assert!(
        matches!(err, CdpError::ConnectionClosed),
        "expected ConnectionClosed, got: {err}"
    );

    // Subsequent commands fail the same way; the transport does not
    // attempt to reconnect to a dead target.
    let err = client.send_command("Debugger.resume", None).await.unwrap_err();
    assert!(matches!(err, CdpError::ConnectionClosed), "got: {err}");
    assert!(!client.is_connected());
}

#[tokio::test]
async fn subscribers_end_when_peer_drops() {
    let (addr, _handle) = start_drop_without_reply_server().await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    let mut rx = client.subscribe("Debugger.paused").await.unwrap();

    // Trigger the drop
    let _ = client.send_command("Debugger.resume", None).await;

    let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for channel end");
    assert!(next.is_none(), "event channel should end on disconnect");
}

#[tokio::test]
async fn protocol_error_handling() {
    let (addr, _handle) =
        start_protocol_error_server(-32000, "Can only perform operation while paused.").await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    let result = client.send_command("Debugger.stepOver", None).await;
    assert!(result.is_err());

    let err = result.unwrap_err();
    match err {
        CdpError::Protocol { code, message } => {
            assert_eq!(code, -32000);
            assert!(message.contains("while paused"));
        }
        other => panic!("expected Protocol error, got: {other}"),
    }
}

#[tokio::test]
async fn invalid_json_handling() {
    let (addr, _handle) = start_malformed_then_echo_server().await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    // First command triggers malformed JSON, but should still get a response
    let result = client.send_command("Test.first", None).await;
    assert!(
        result.is_ok(),
        "client should handle malformed JSON gracefully"
    );

    // Second command should work normally
    let result = client.send_command("Test.second", None).await;
    assert!(result.is_ok(), "subsequent commands should still work");
}

#[tokio::test]
async fn close_shuts_down_cleanly() {
    let (addr, _handle) = start_echo_server().await;
    let client = CdpClient::connect(&ws_url(addr), quick_config())
        .await
        .unwrap();

    let result = client.send_command("Debugger.enable", None).await;
    assert!(result.is_ok());

    assert!(client.close().await.is_ok());
}
