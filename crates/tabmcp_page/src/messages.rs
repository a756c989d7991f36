//! Messages crossing the page/privileged-runtime boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabmcp_bridge::ToolDescriptor;

/// Events the page side emits toward the privileged runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageEvent {
    /// Serialized view of the page's current tools. Never carries the
    /// executables.
    ToolsUpdated { tools: Vec<ToolDescriptor> },
    /// Outcome of one `execute_tool` request; exactly one per call id.
    CallResult {
        call_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Commands the privileged runtime sends into the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageCommand {
    ExecuteTool {
        call_id: u64,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    /// Force a re-broadcast of current state without re-registering.
    RePoll,
}

/// Envelope for anything crossing the page execution boundary. The nonce
/// proves the payload originated from code running in this specific page
/// load; the origin must match the page's own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Framed<T> {
    pub origin: String,
    pub nonce: String,
    pub payload: T,
}
