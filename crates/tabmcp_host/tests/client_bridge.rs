//! The reconnecting client against a live bridge listener: discovery via
//! the bootstrap endpoint, the authenticated upgrade, frame pumping in
//! both directions, and reconnect after replacement.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use tabmcp_bridge::state::{BridgeState, BridgeTiming};
use tabmcp_bridge::transport::extension_routes;
use tabmcp_bridge::wire::{ToolDescriptor, WireMessage};
use tabmcp_config::Config;
use tabmcp_host::{BridgeClient, HostEvent, RetryPolicy};

async fn serve_bridge() -> (Arc<BridgeState>, u16) {
    let timing = BridgeTiming {
        call_timeout: Duration::from_secs(2),
        ..BridgeTiming::default()
    };
    let state = Arc::new(BridgeState::new("tok".to_string(), timing));
    let router = extension_routes(Arc::clone(&state));
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (state, port)
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        base: Duration::from_millis(50),
        multiplier: 2,
        cap: Duration::from_millis(200),
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<HostEvent>) -> HostEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for host event")
        .expect("event channel closed")
}

async fn wait_connected(rx: &mut mpsc::UnboundedReceiver<HostEvent>) {
    loop {
        if matches!(next_event(rx).await, HostEvent::BridgeConnected) {
            return;
        }
    }
}

#[tokio::test]
async fn test_client_discovers_and_round_trips_a_call() {
    let (state, port) = serve_bridge().await;

    let mut cfg = Config::default();
    cfg.port_range = (port, port);
    let client = BridgeClient::new(&cfg, fast_policy());

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    // Queued while disconnected: stale by definition, must never arrive.
    outbound_tx
        .send(WireMessage::RegisterTools {
            tools: vec![ToolDescriptor::new("stale", "", json!({}))],
        })
        .unwrap();

    let run = tokio::spawn(client.run(events_tx, outbound_rx));
    wait_connected(&mut events_rx).await;

    outbound_tx
        .send(WireMessage::RegisterTools {
            tools: vec![ToolDescriptor::new(
                "remote_echo",
                "",
                json!({"type": "object"}),
            )],
        })
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !state.catalog_has("remote_echo") {
        assert!(
            tokio::time::Instant::now() < deadline,
            "registration never reached the bridge"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!state.catalog_has("stale"));

    // The bridge dispatches a call; it travels the socket as execute_tool
    // and the extension side answers over the same socket.
    let dispatch_state = Arc::clone(&state);
    let call =
        tokio::spawn(async move { dispatch_state.dispatch("remote_echo", json!({"n": 1})).await });

    let call_id = loop {
        match next_event(&mut events_rx).await {
            HostEvent::Bridge(WireMessage::ExecuteTool {
                call_id,
                name,
                arguments,
            }) => {
                assert_eq!(name, "remote_echo");
                assert_eq!(arguments, json!({"n": 1}));
                break call_id;
            }
            _ => {}
        }
    };
    outbound_tx
        .send(WireMessage::ToolResult {
            call_id,
            result: Some(json!("pong")),
            error: None,
            is_error: false,
        })
        .unwrap();

    let result = call.await.unwrap().expect("dispatch should resolve");
    assert_eq!(result, json!("pong"));

    run.abort();
}

#[tokio::test]
async fn test_client_reconnects_after_being_replaced() {
    let (state, port) = serve_bridge().await;

    let mut cfg = Config::default();
    cfg.port_range = (port, port);
    let client = BridgeClient::new(&cfg, fast_policy());

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (_outbound_tx, outbound_rx) = mpsc::unbounded_channel::<WireMessage>();

    let run = tokio::spawn(client.run(events_tx, outbound_rx));
    wait_connected(&mut events_rx).await;

    // Another connection takes over; the client's socket is closed with
    // "replaced" and the loop must come back on its own.
    let (usurper_tx, _usurper_rx) = mpsc::unbounded_channel();
    state.install_connection(usurper_tx);

    loop {
        if matches!(next_event(&mut events_rx).await, HostEvent::BridgeDisconnected) {
            break;
        }
    }
    wait_connected(&mut events_rx).await;
    assert!(state.connected());

    run.abort();
}
