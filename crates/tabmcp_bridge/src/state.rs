//! Shared bridge state: the catalog mirror, the single active extension
//! connection, and the pending-call table.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::BridgeError;
use crate::notify::Debouncer;
use crate::wire::{ToolDescriptor, WireMessage};

/// Timing knobs lifted out of [`tabmcp_config::Config`].
#[derive(Debug, Clone, Copy)]
pub struct BridgeTiming {
    pub call_timeout: Duration,
    pub grace_window: Duration,
    pub heartbeat_interval: Duration,
    pub notify_debounce: Duration,
}

impl From<&tabmcp_config::Config> for BridgeTiming {
    fn from(cfg: &tabmcp_config::Config) -> Self {
        Self {
            call_timeout: Duration::from_millis(cfg.call_timeout_ms),
            grace_window: Duration::from_millis(cfg.grace_window_ms),
            heartbeat_interval: Duration::from_millis(cfg.heartbeat_interval_ms),
            notify_debounce: Duration::from_millis(cfg.notify_debounce_ms),
        }
    }
}

impl Default for BridgeTiming {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            grace_window: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(15),
            notify_debounce: Duration::from_millis(300),
        }
    }
}

/// Outcome delivered to a pending call. At most one per call id.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CallReply {
    Value(Value),
    Failed(String),
}

struct Connection {
    id: u64,
    tx: mpsc::UnboundedSender<WireMessage>,
}

/// State shared by the transport, the call router, and the MCP adapter.
pub struct BridgeState {
    token: String,
    pub(crate) timing: BridgeTiming,
    catalog: Mutex<Vec<ToolDescriptor>>,
    conn: Mutex<Option<Connection>>,
    conn_seq: AtomicU64,
    next_call_id: AtomicU64,
    next_request_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<CallReply>>>,
    changes: Mutex<Option<Debouncer>>,
}

impl BridgeState {
    pub fn new(token: String, timing: BridgeTiming) -> Self {
        Self {
            token,
            timing,
            catalog: Mutex::new(Vec::new()),
            conn: Mutex::new(None),
            conn_seq: AtomicU64::new(0),
            next_call_id: AtomicU64::new(1),
            next_request_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            changes: Mutex::new(None),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn connected(&self) -> bool {
        self.conn.lock().expect("conn lock").is_some()
    }

    /// Installs the debouncer that drives `tools/list_changed` notifications.
    pub fn set_change_debouncer(&self, debouncer: Debouncer) {
        *self.changes.lock().expect("changes lock") = Some(debouncer);
    }

    fn mark_catalog_changed(&self) {
        if let Some(d) = self.changes.lock().expect("changes lock").as_ref() {
            d.poke();
        }
    }

    /// Current catalog mirror, in the order the extension advertised it.
    pub fn catalog(&self) -> Vec<ToolDescriptor> {
        self.catalog.lock().expect("catalog lock").clone()
    }

    pub fn catalog_has(&self, name: &str) -> bool {
        self.catalog
            .lock()
            .expect("catalog lock")
            .iter()
            .any(|t| t.name == name)
    }

    /// Full replace of the catalog mirror. A no-op replace (identical list)
    /// still counts as a mutation for notification purposes only when the
    /// contents actually changed.
    pub fn replace_catalog(&self, tools: Vec<ToolDescriptor>) {
        let changed = {
            let mut catalog = self.catalog.lock().expect("catalog lock");
            if *catalog == tools {
                false
            } else {
                *catalog = tools;
                true
            }
        };
        if changed {
            self.mark_catalog_changed();
        }
    }

    /// Registers a freshly authenticated socket as the one active
    /// connection. A previously active connection is dropped ("latest
    /// extension instance wins") and all of its pending calls fail.
    pub fn install_connection(&self, tx: mpsc::UnboundedSender<WireMessage>) -> u64 {
        let id = self.conn_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = {
            let mut conn = self.conn.lock().expect("conn lock");
            conn.replace(Connection { id, tx })
        };
        if let Some(prev) = previous {
            log::info!("extension connection {} replaced by {id}", prev.id);
            self.fail_all_pending();
        }
        id
    }

    /// Tears down connection `id` if it is still the active one. The
    /// catalog mirror is retained so the tool list does not flicker away
    /// during a brief reconnect.
    pub fn drop_connection(&self, id: u64) {
        let removed = {
            let mut conn = self.conn.lock().expect("conn lock");
            match conn.as_ref() {
                Some(current) if current.id == id => {
                    *conn = None;
                    true
                }
                _ => false,
            }
        };
        if removed {
            log::info!("extension connection {id} closed");
            self.fail_all_pending();
        }
    }

    /// Sends a frame over the active connection.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Disconnected`] when no connection is active.
    pub fn send(&self, msg: WireMessage) -> Result<(), BridgeError> {
        let conn = self.conn.lock().expect("conn lock");
        match conn.as_ref() {
            Some(c) if c.tx.send(msg).is_ok() => Ok(()),
            _ => Err(BridgeError::Disconnected),
        }
    }

    pub(crate) fn next_call_id(&self) -> u64 {
        self.next_call_id.fetch_add(1, Ordering::Relaxed)
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register_pending(&self, call_id: u64, tx: oneshot::Sender<CallReply>) {
        self.pending
            .lock()
            .expect("pending lock")
            .insert(call_id, tx);
    }

    pub(crate) fn remove_pending(&self, call_id: u64) {
        self.pending.lock().expect("pending lock").remove(&call_id);
    }

    /// Delivers a `tool_result` frame to its pending call. Late or
    /// duplicate results find no entry and are silently dropped.
    pub fn complete_call(&self, call_id: u64, result: Option<Value>, error: Option<String>, is_error: bool) {
        let Some(tx) = self.pending.lock().expect("pending lock").remove(&call_id) else {
            log::debug!("dropping result for unknown call {call_id}");
            return;
        };
        let reply = if let Some(message) = error {
            CallReply::Failed(message)
        } else if is_error {
            let message = result
                .as_ref()
                .map_or_else(|| "tool reported an error".to_string(), Value::to_string);
            CallReply::Failed(message)
        } else {
            CallReply::Value(result.unwrap_or(Value::Null))
        };
        // Receiver may already be gone (timeout fired); that is fine.
        let _ = tx.send(reply);
    }

    /// Fails every pending call with a disconnect. Dropping the senders
    /// surfaces as [`BridgeError::Disconnected`] on the awaiting side.
    pub fn fail_all_pending(&self) {
        let drained: Vec<_> = self
            .pending
            .lock()
            .expect("pending lock")
            .drain()
            .collect();
        if !drained.is_empty() {
            log::warn!("failing {} pending call(s): connection lost", drained.len());
        }
    }

    /// Handles one inbound frame from the extension socket.
    pub fn handle_frame(&self, msg: WireMessage) {
        match msg {
            WireMessage::RegisterTools { tools } => {
                log::debug!("extension registered {} tool(s)", tools.len());
                self.replace_catalog(tools);
            }
            WireMessage::ToolsChanged {} => {
                // Hint only: pull the authoritative list.
                let request_id = self.next_request_id();
                if let Err(e) = self.send(WireMessage::GetTools { request_id }) {
                    log::debug!("tools_changed with no active connection: {e}");
                }
            }
            WireMessage::ToolsList { tools, .. } => {
                self.replace_catalog(tools);
            }
            WireMessage::ToolResult {
                call_id,
                result,
                error,
                is_error,
            } => {
                self.complete_call(call_id, result, error, is_error);
            }
            // Bridge-to-extension frames echoed back; not ours to handle.
            WireMessage::GetTools { .. } | WireMessage::ExecuteTool { .. } => {
                log::debug!("ignoring frame sent in the wrong direction");
            }
        }
    }
}
