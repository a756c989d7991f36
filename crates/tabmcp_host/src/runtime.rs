//! Event loop of the privileged runtime: owns the context registry, routes
//! calls to their owning context, and mirrors the aggregate toward the
//! bridge.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use tabmcp_bridge::notify::Debouncer;
use tabmcp_bridge::wire::WireMessage;
use tabmcp_page::messages::{PageCommand, PageEvent};

use crate::registry::{ContextMeta, ContextRegistry};
use crate::store::{SessionStore, Snapshot};

/// Everything the runtime reacts to, from all three directions: context
/// lifecycle, page events, and bridge frames.
#[derive(Debug)]
pub enum HostEvent {
    /// A context came up and can receive commands.
    ContextOpened {
        context_id: String,
        meta: ContextMeta,
        commands: mpsc::UnboundedSender<PageCommand>,
    },
    /// The context started a navigation; its tools are stale but the
    /// context itself survives.
    ContextNavigating { context_id: String },
    ContextClosed { context_id: String },
    /// An event from the page side of a context.
    Page { context_id: String, event: PageEvent },
    /// A frame from the bridge connection.
    Bridge(WireMessage),
    BridgeConnected,
    BridgeDisconnected,
}

/// The privileged runtime. Single-threaded over its event stream; every
/// mutation funnels through [`HostRuntime::handle_event`].
pub struct HostRuntime {
    registry: Arc<Mutex<ContextRegistry>>,
    links: HashMap<String, mpsc::UnboundedSender<PageCommand>>,
    metas: HashMap<String, ContextMeta>,
    outbound: mpsc::UnboundedSender<WireMessage>,
    persist: Debouncer,
    connected: bool,
}

impl HostRuntime {
    /// Restores the registry from the store (degrading to empty when the
    /// snapshot is missing or unreadable) and wires up debounced
    /// persistence.
    pub fn new(
        store: Arc<dyn SessionStore>,
        outbound: mpsc::UnboundedSender<WireMessage>,
        persist_debounce: Duration,
    ) -> Self {
        let mut registry = ContextRegistry::new();
        match store.load() {
            Ok(Some(snapshot)) => registry.restore(snapshot.contexts),
            Ok(None) => {}
            Err(e) => log::warn!("session snapshot unreadable, starting empty: {e}"),
        }
        let registry = Arc::new(Mutex::new(registry));

        let persist = {
            let registry = Arc::clone(&registry);
            let store = Arc::clone(&store);
            Debouncer::spawn(persist_debounce, move || {
                let registry = Arc::clone(&registry);
                let store = Arc::clone(&store);
                async move {
                    let snapshot = Snapshot {
                        contexts: registry
                            .lock()
                            .expect("registry lock poisoned")
                            .records()
                            .cloned()
                            .collect(),
                    };
                    if let Err(e) = store.save(&snapshot) {
                        log::warn!("session snapshot save failed: {e}");
                    }
                }
            })
        };

        Self {
            registry,
            links: HashMap::new(),
            metas: HashMap::new(),
            outbound,
            persist,
            connected: false,
        }
    }

    /// Shared handle to the registry, for status reporting.
    pub fn registry(&self) -> Arc<Mutex<ContextRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Drops restored contexts that no longer exist. Called once after
    /// startup when the set of live context ids is known.
    pub fn reconcile(&mut self, live: &[String]) {
        self.registry
            .lock()
            .expect("registry lock poisoned")
            .reconcile(live);
        self.after_catalog_change();
    }

    /// Consumes the event stream until all senders drop.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<HostEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::ContextOpened {
                context_id,
                meta,
                commands,
            } => {
                log::debug!("context opened: {context_id} ({})", meta.origin_url);
                // Ask for current state; a restored context may already
                // have tools the registry does not know about.
                let _ = commands.send(PageCommand::RePoll);
                self.links.insert(context_id.clone(), commands);
                self.metas.insert(context_id, meta);
            }
            HostEvent::ContextNavigating { context_id } => {
                self.registry
                    .lock()
                    .expect("registry lock poisoned")
                    .clear_context_tools(&context_id);
                self.after_catalog_change();
            }
            HostEvent::ContextClosed { context_id } => {
                log::debug!("context closed: {context_id}");
                self.links.remove(&context_id);
                self.metas.remove(&context_id);
                self.registry
                    .lock()
                    .expect("registry lock poisoned")
                    .remove_context(&context_id);
                self.after_catalog_change();
            }
            HostEvent::Page { context_id, event } => self.handle_page_event(&context_id, event),
            HostEvent::Bridge(frame) => self.handle_bridge_frame(frame),
            HostEvent::BridgeConnected => {
                self.connected = true;
                self.advertise();
                // Contexts may have changed while disconnected.
                for commands in self.links.values() {
                    let _ = commands.send(PageCommand::RePoll);
                }
            }
            HostEvent::BridgeDisconnected => self.connected = false,
        }
    }

    fn handle_page_event(&mut self, context_id: &str, event: PageEvent) {
        match event {
            PageEvent::ToolsUpdated { tools } => {
                let Some(meta) = self.metas.get(context_id).cloned() else {
                    log::debug!("tools update from unknown context {context_id}, dropping");
                    return;
                };
                self.registry
                    .lock()
                    .expect("registry lock poisoned")
                    .update_context(context_id, meta, tools);
                self.after_catalog_change();
            }
            PageEvent::CallResult {
                call_id,
                result,
                error,
            } => {
                let is_error = error.is_some();
                self.send(WireMessage::ToolResult {
                    call_id,
                    result,
                    error,
                    is_error,
                });
            }
        }
    }

    fn handle_bridge_frame(&mut self, frame: WireMessage) {
        match frame {
            WireMessage::ExecuteTool {
                call_id,
                name,
                arguments,
            } => self.route_call(call_id, &name, arguments),
            WireMessage::GetTools { request_id } => {
                let tools = self
                    .registry
                    .lock()
                    .expect("registry lock poisoned")
                    .flat_tools();
                self.send(WireMessage::ToolsList { request_id, tools });
            }
            other => log::debug!("unexpected frame from bridge: {other:?}"),
        }
    }

    /// Resolves the owning context and forwards the call. A name with no
    /// live owner fails the call immediately.
    fn route_call(&mut self, call_id: u64, name: &str, arguments: serde_json::Value) {
        let owner = self
            .registry
            .lock()
            .expect("registry lock poisoned")
            .resolve_owner(name)
            .map(str::to_string);
        let link = owner.as_deref().and_then(|id| self.links.get(id));
        match link {
            Some(commands) => {
                let sent = commands.send(PageCommand::ExecuteTool {
                    call_id,
                    name: name.to_string(),
                    arguments,
                });
                if sent.is_err() {
                    self.fail_call(call_id, format!("context for tool '{name}' is gone"));
                }
            }
            None => self.fail_call(call_id, format!("no context owns tool '{name}'")),
        }
    }

    fn fail_call(&mut self, call_id: u64, error: String) {
        self.send(WireMessage::ToolResult {
            call_id,
            result: None,
            error: Some(error),
            is_error: true,
        });
    }

    /// Runs after any registry mutation: schedules persistence and pushes
    /// the new aggregate to the bridge.
    fn after_catalog_change(&mut self) {
        self.persist.poke();
        self.advertise();
    }

    fn advertise(&mut self) {
        if !self.connected {
            return;
        }
        let tools = self
            .registry
            .lock()
            .expect("registry lock poisoned")
            .flat_tools();
        self.send(WireMessage::RegisterTools { tools });
    }

    fn send(&mut self, frame: WireMessage) {
        if self.outbound.send(frame).is_err() {
            log::debug!("bridge channel closed, dropping outbound frame");
        }
    }

    /// Current aggregate as a JSON report, for the status surface.
    pub fn status_json(&self) -> serde_json::Value {
        let registry = self.registry.lock().expect("registry lock poisoned");
        let contexts: Vec<_> = registry
            .records()
            .map(|r| {
                json!({
                    "contextId": r.context_id,
                    "origin": r.origin_url,
                    "title": r.display_title,
                    "toolCount": r.tools.len(),
                })
            })
            .collect();
        json!({
            "bridgeConnected": self.connected,
            "contexts": contexts,
            "toolCount": registry.flat_tools().len(),
        })
    }
}
