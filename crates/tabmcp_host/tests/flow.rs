//! End-to-end flow across the extension: page interceptor, isolation
//! relay, privileged runtime, and the wire frames that leave for the
//! bridge.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use tabmcp_bridge::wire::{ToolDescriptor, WireMessage};
use tabmcp_host::{HostEvent, HostRuntime, JsonFileStore};
use tabmcp_page::capability::{NoopCapability, ToolFn};
use tabmcp_page::interceptor::InPageInterceptor;
use tabmcp_page::messages::{PageCommand, PageEvent};
use tabmcp_page::relay::IsolationRelay;

const ORIGIN: &str = "https://docs.example";

fn echo_tool() -> (ToolDescriptor, ToolFn) {
    (
        ToolDescriptor::new("doc_search", "Search the open document", json!({"type": "object"})),
        Arc::new(|args| Box::pin(async move { Ok(json!({"hits": [args["q"].clone()]})) })),
    )
}

async fn recv_frame(rx: &mut mpsc::UnboundedReceiver<WireMessage>) -> WireMessage {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for wire frame")
        .expect("wire channel closed")
}

#[tokio::test]
async fn test_page_registration_reaches_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("contexts.json");
    let store = Arc::new(JsonFileStore::new(snapshot.to_str().unwrap()));

    let (wire_tx, mut wire_rx) = mpsc::unbounded_channel();
    let mut runtime = HostRuntime::new(store, wire_tx, Duration::from_millis(10));
    runtime.handle_event(HostEvent::BridgeConnected);
    assert_eq!(
        recv_frame(&mut wire_rx).await,
        WireMessage::RegisterTools { tools: vec![] }
    );

    // Page side: interceptor broadcasting framed events into the relay.
    let (page_out_tx, mut page_out_rx) = mpsc::unbounded_channel();
    let mut interceptor = InPageInterceptor::new(NoopCapability, ORIGIN, page_out_tx);

    let (host_in_tx, mut host_in_rx) = mpsc::unbounded_channel();
    let (page_in_tx, mut page_in_rx) = mpsc::unbounded_channel();
    let relay = IsolationRelay::new(ORIGIN, interceptor.nonce(), host_in_tx, page_in_tx);

    // Privileged side: a command link the runtime writes into.
    let (link_tx, mut link_rx) = mpsc::unbounded_channel::<PageCommand>();
    runtime.handle_event(HostEvent::ContextOpened {
        context_id: "tab-9".to_string(),
        meta: tabmcp_host::ContextMeta {
            origin_url: ORIGIN.to_string(),
            display_title: "Docs".to_string(),
            is_polyfilled: false,
        },
        commands: link_tx,
    });
    // Opening a context triggers the freshness re-poll.
    assert_eq!(link_rx.try_recv(), Ok(PageCommand::RePoll));

    let (descriptor, executable) = echo_tool();
    interceptor.register(descriptor, executable);

    // Pump: page -> relay -> runtime, with full verification on the way.
    while let Ok(framed) = page_out_rx.try_recv() {
        relay.relay_to_host(framed).expect("genuine frames must pass");
    }
    while let Ok(event) = host_in_rx.try_recv() {
        runtime.handle_event(HostEvent::Page {
            context_id: "tab-9".to_string(),
            event,
        });
    }

    // The last advertisement carries the registered tool.
    let mut last_tools = None;
    while let Ok(frame) = wire_rx.try_recv() {
        if let WireMessage::RegisterTools { tools } = frame {
            last_tools = Some(tools);
        }
    }
    let tools = last_tools.expect("expected an advertisement");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "doc_search");

    // Bridge asks for a call; the runtime routes it to the owning context,
    // the relay re-tags it, and the page executes.
    runtime.handle_event(HostEvent::Bridge(WireMessage::ExecuteTool {
        call_id: 77,
        name: "doc_search".to_string(),
        arguments: json!({"q": "borrowck"}),
    }));
    let command = link_rx.try_recv().expect("command for owning context");
    relay.relay_to_page(command).unwrap();
    let framed = page_in_rx.try_recv().unwrap();
    assert_eq!(framed.nonce, interceptor.nonce());
    interceptor.handle_command(framed.payload);

    // The executable runs on the runtime's spawner; wait for its result.
    let result_event = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let framed = page_out_rx.recv().await.expect("page channel closed");
            if matches!(framed.payload, PageEvent::CallResult { .. }) {
                return framed;
            }
        }
    })
    .await
    .expect("timed out waiting for call result");

    relay.relay_to_host(result_event).unwrap();
    while let Ok(event) = host_in_rx.try_recv() {
        runtime.handle_event(HostEvent::Page {
            context_id: "tab-9".to_string(),
            event,
        });
    }

    match recv_frame(&mut wire_rx).await {
        WireMessage::ToolResult {
            call_id,
            result,
            error,
            is_error,
        } => {
            assert_eq!(call_id, 77);
            assert_eq!(result, Some(json!({"hits": ["borrowck"]})));
            assert_eq!(error, None);
            assert!(!is_error);
        }
        other => panic!("expected tool_result, got {other:?}"),
    }

    // Debounced persistence lands on disk.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let persisted = std::fs::read_to_string(&snapshot).expect("snapshot written");
    assert!(persisted.contains("doc_search"));
}

#[tokio::test]
async fn test_forged_page_frame_never_reaches_the_runtime() {
    let (page_out_tx, _page_out_rx) = mpsc::unbounded_channel();
    let interceptor = InPageInterceptor::new(NoopCapability, ORIGIN, page_out_tx);

    let (host_in_tx, mut host_in_rx) = mpsc::unbounded_channel();
    let (page_in_tx, _page_in_rx) = mpsc::unbounded_channel();
    let relay = IsolationRelay::new(ORIGIN, interceptor.nonce(), host_in_tx, page_in_tx);

    // A malicious script knows the origin but cannot read the nonce.
    let forged = tabmcp_page::messages::Framed {
        origin: ORIGIN.to_string(),
        nonce: "0000000000000000".to_string(),
        payload: PageEvent::ToolsUpdated {
            tools: vec![ToolDescriptor::new("evil", "", json!({}))],
        },
    };
    assert!(relay.relay_to_host(forged).is_err());
    assert!(host_in_rx.try_recv().is_err());
}
