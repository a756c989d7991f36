//! Call routing: dispatches an MCP tool call over the extension socket and
//! awaits exactly one outcome per call.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::BridgeError;
use crate::state::{BridgeState, CallReply};
use crate::wire::WireMessage;

/// Poll step while waiting out the reconnect grace window.
const RECONNECT_POLL: Duration = Duration::from_millis(100);

impl BridgeState {
    /// Routes one call to the context that owns `name`.
    ///
    /// Waits up to the grace window for a connection when none is active
    /// (covers calls issued during a brief extension reconnect), then fails
    /// fast on unknown tool names, then awaits exactly one of: a matching
    /// `tool_result`, the call timeout, or connection loss.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Disconnected`], [`BridgeError::NotFound`],
    /// [`BridgeError::Timeout`], or [`BridgeError::Execution`] with the
    /// tool-supplied message.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value, BridgeError> {
        if !self.await_connection().await {
            return Err(BridgeError::Disconnected);
        }
        if !self.catalog_has(name) {
            return Err(BridgeError::NotFound(name.to_string()));
        }

        let call_id = self.next_call_id();
        let (tx, rx) = oneshot::channel::<CallReply>();
        self.register_pending(call_id, tx);

        let frame = WireMessage::ExecuteTool {
            call_id,
            name: name.to_string(),
            arguments,
        };
        if let Err(e) = self.send(frame) {
            self.remove_pending(call_id);
            return Err(e);
        }
        log::debug!("dispatched call {call_id} for tool '{name}'");

        match tokio::time::timeout(self.timing.call_timeout, rx).await {
            Err(_elapsed) => {
                // A result arriving after this point is a late result and
                // gets dropped by `complete_call`.
                self.remove_pending(call_id);
                Err(BridgeError::Timeout)
            }
            // Sender dropped: the connection failed out from under us.
            Ok(Err(_closed)) => Err(BridgeError::Disconnected),
            Ok(Ok(CallReply::Value(value))) => Ok(value),
            Ok(Ok(CallReply::Failed(message))) => Err(BridgeError::Execution(message)),
        }
    }

    /// Bounded poll for an active connection.
    async fn await_connection(&self) -> bool {
        if self.connected() {
            return true;
        }
        let deadline = Instant::now() + self.timing.grace_window;
        loop {
            tokio::time::sleep(RECONNECT_POLL.min(self.timing.grace_window)).await;
            if self.connected() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
        }
    }
}
