//! Decorator over the host registration capability.
//!
//! Every mutation updates an in-memory map scoped to one page load and
//! broadcasts the serialized tool list across the isolation boundary.

use indexmap::IndexMap;
use serde_json::Value;
use tabmcp_bridge::{ToolDescriptor, auth};
use tokio::sync::mpsc;

use crate::capability::{ToolCapability, ToolFn};
use crate::messages::{Framed, PageCommand, PageEvent};

struct RegisteredTool {
    descriptor: ToolDescriptor,
    executable: ToolFn,
}

/// Wraps a [`ToolCapability`] so registrations are never missed.
///
/// The embedder must construct this before any page script can reach the
/// capability; registrations issued immediately on page load are then
/// captured. On a host without that guarantee the interception race of the
/// underlying platform reappears.
pub struct InPageInterceptor<C: ToolCapability> {
    inner: C,
    tools: IndexMap<String, RegisteredTool>,
    origin: String,
    nonce: String,
    to_relay: mpsc::UnboundedSender<Framed<PageEvent>>,
}

impl<C: ToolCapability> InPageInterceptor<C> {
    /// Wraps `inner` and immediately broadcasts the (empty) initial state
    /// so the privileged runtime learns this page load's nonce-tagged
    /// channel exists.
    pub fn new(
        inner: C,
        origin: impl Into<String>,
        to_relay: mpsc::UnboundedSender<Framed<PageEvent>>,
    ) -> Self {
        let interceptor = Self {
            inner,
            tools: IndexMap::new(),
            origin: origin.into(),
            nonce: auth::generate_nonce(),
            to_relay,
        };
        interceptor.broadcast();
        interceptor
    }

    /// Page-load nonce, shared with the relay at construction time.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn register(&mut self, descriptor: ToolDescriptor, executable: ToolFn) {
        self.inner.register(&descriptor);
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                executable,
            },
        );
        self.broadcast();
    }

    pub fn unregister(&mut self, name: &str) {
        self.inner.unregister(name);
        self.tools.shift_remove(name);
        self.broadcast();
    }

    pub fn replace_all(&mut self, tools: Vec<(ToolDescriptor, ToolFn)>) {
        let descriptors: Vec<ToolDescriptor> = tools.iter().map(|(d, _)| d.clone()).collect();
        self.inner.replace_all(&descriptors);
        self.tools.clear();
        for (descriptor, executable) in tools {
            self.tools.insert(
                descriptor.name.clone(),
                RegisteredTool {
                    descriptor,
                    executable,
                },
            );
        }
        self.broadcast();
    }

    pub fn clear_all(&mut self) {
        self.inner.clear_all();
        self.tools.clear();
        self.broadcast();
    }

    /// Handles one command arriving from across the boundary.
    pub fn handle_command(&self, command: PageCommand) {
        match command {
            PageCommand::ExecuteTool {
                call_id,
                name,
                arguments,
            } => self.execute(call_id, &name, arguments),
            PageCommand::RePoll => self.broadcast(),
        }
    }

    /// Invokes a registered executable and reports exactly one outcome for
    /// `call_id`.
    fn execute(&self, call_id: u64, name: &str, arguments: Value) {
        let Some(tool) = self.tools.get(name) else {
            self.send(PageEvent::CallResult {
                call_id,
                result: None,
                error: Some(format!("tool '{name}' not found in this page")),
            });
            return;
        };

        let executable = tool.executable.clone();
        let reply = self.framed_sender();
        tokio::spawn(async move {
            let event = match executable(arguments).await {
                Ok(value) => PageEvent::CallResult {
                    call_id,
                    result: Some(value),
                    error: None,
                },
                Err(message) => PageEvent::CallResult {
                    call_id,
                    result: None,
                    error: Some(message),
                },
            };
            reply(event);
        });
    }

    /// Broadcasts the current serialized tool list; descriptors only, never
    /// the executables.
    fn broadcast(&self) {
        let tools: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor.clone()).collect();
        self.send(PageEvent::ToolsUpdated { tools });
    }

    fn send(&self, event: PageEvent) {
        let framed = Framed {
            origin: self.origin.clone(),
            nonce: self.nonce.clone(),
            payload: event,
        };
        if self.to_relay.send(framed).is_err() {
            log::debug!("isolation relay gone; dropping page event");
        }
    }

    fn framed_sender(&self) -> impl Fn(PageEvent) + Send + 'static {
        let origin = self.origin.clone();
        let nonce = self.nonce.clone();
        let tx = self.to_relay.clone();
        move |payload| {
            let _ = tx.send(Framed {
                origin: origin.clone(),
                nonce: nonce.clone(),
                payload,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::NoopCapability;
    use serde_json::json;
    use std::sync::Arc;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "", json!({"type": "object"}))
    }

    fn echo_fn() -> ToolFn {
        Arc::new(|args| Box::pin(async move { Ok(json!({"echo": args})) }))
    }

    fn failing_fn(message: &'static str) -> ToolFn {
        Arc::new(move |_| Box::pin(async move { Err(message.to_string()) }))
    }

    fn drain_tools(rx: &mut mpsc::UnboundedReceiver<Framed<PageEvent>>) -> Vec<String> {
        let mut last = None;
        while let Ok(framed) = rx.try_recv() {
            if let PageEvent::ToolsUpdated { tools } = framed.payload {
                last = Some(tools);
            }
        }
        last.expect("expected at least one broadcast")
            .into_iter()
            .map(|t| t.name)
            .collect()
    }

    #[tokio::test]
    async fn test_construction_broadcasts_empty_state() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _interceptor = InPageInterceptor::new(NoopCapability, "https://a.example", tx);
        let framed = rx.try_recv().unwrap();
        assert_eq!(framed.origin, "https://a.example");
        assert_eq!(framed.payload, PageEvent::ToolsUpdated { tools: vec![] });
    }

    #[tokio::test]
    async fn test_mutations_broadcast_descriptors_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut interceptor = InPageInterceptor::new(NoopCapability, "https://a.example", tx);

        interceptor.register(tool("one"), echo_fn());
        interceptor.register(tool("two"), echo_fn());
        assert_eq!(drain_tools(&mut rx), vec!["one", "two"]);

        interceptor.unregister("one");
        assert_eq!(drain_tools(&mut rx), vec!["two"]);

        interceptor.replace_all(vec![(tool("three"), echo_fn())]);
        assert_eq!(drain_tools(&mut rx), vec!["three"]);

        interceptor.clear_all();
        assert!(drain_tools(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_execute_reports_result() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut interceptor = InPageInterceptor::new(NoopCapability, "https://a.example", tx);
        interceptor.register(tool("echo"), echo_fn());

        interceptor.handle_command(PageCommand::ExecuteTool {
            call_id: 5,
            name: "echo".to_string(),
            arguments: json!({"q": "x"}),
        });

        loop {
            let framed = rx.recv().await.unwrap();
            if let PageEvent::CallResult {
                call_id,
                result,
                error,
            } = framed.payload
            {
                assert_eq!(call_id, 5);
                assert_eq!(result, Some(json!({"echo": {"q": "x"}})));
                assert_eq!(error, None);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_reports_not_found() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let interceptor = InPageInterceptor::new(NoopCapability, "https://a.example", tx);

        interceptor.handle_command(PageCommand::ExecuteTool {
            call_id: 1,
            name: "ghost".to_string(),
            arguments: json!({}),
        });

        loop {
            let framed = rx.recv().await.unwrap();
            if let PageEvent::CallResult { call_id, error, .. } = framed.payload {
                assert_eq!(call_id, 1);
                assert!(error.unwrap().contains("not found"));
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_execute_failure_carries_tool_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut interceptor = InPageInterceptor::new(NoopCapability, "https://a.example", tx);
        interceptor.register(tool("bad"), failing_fn("disk on fire"));

        interceptor.handle_command(PageCommand::ExecuteTool {
            call_id: 2,
            name: "bad".to_string(),
            arguments: json!({}),
        });

        loop {
            let framed = rx.recv().await.unwrap();
            if let PageEvent::CallResult { error, .. } = framed.payload {
                assert_eq!(error, Some("disk on fire".to_string()));
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_re_poll_rebroadcasts_without_mutating() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut interceptor = InPageInterceptor::new(NoopCapability, "https://a.example", tx);
        interceptor.register(tool("stable"), echo_fn());
        let _ = drain_tools(&mut rx);

        interceptor.handle_command(PageCommand::RePoll);
        assert_eq!(drain_tools(&mut rx), vec!["stable"]);
    }
}
