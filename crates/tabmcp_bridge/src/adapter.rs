//! MCP-facing surface: exposes the catalog mirror over rmcp and routes
//! `tools/call` back through the extension socket.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
        ToolsCapability,
    },
    service::{NotificationContext, Peer, RequestContext},
};
use serde_json::{Value, json};

use crate::notify::Debouncer;
use crate::state::BridgeState;

/// Synthetic, always-present status tool.
pub const STATUS_TOOL_NAME: &str = "tabmcp_status";

/// MCP sessions that should hear `tools/list_changed`.
pub type PeerRegistry = Arc<tokio::sync::Mutex<Vec<Peer<RoleServer>>>>;

/// Wires the debounced change notifier into `state` and returns the peer
/// registry new sessions add themselves to.
pub fn install_change_notifier(state: &Arc<BridgeState>) -> PeerRegistry {
    let peers: PeerRegistry = Arc::default();
    let notify_peers = Arc::clone(&peers);
    let debouncer = Debouncer::spawn(state.timing.notify_debounce, move || {
        let peers = Arc::clone(&notify_peers);
        async move {
            let mut peers = peers.lock().await;
            let mut kept = Vec::with_capacity(peers.len());
            for peer in peers.drain(..) {
                match peer.notify_tool_list_changed().await {
                    Ok(()) => kept.push(peer),
                    Err(e) => log::debug!("dropping MCP session after failed notify: {e}"),
                }
            }
            *peers = kept;
        }
    });
    state.set_change_debouncer(debouncer);
    peers
}

/// One MCP session's view of the bridge.
#[derive(Clone)]
pub struct BridgeTools {
    state: Arc<BridgeState>,
    peers: PeerRegistry,
}

impl BridgeTools {
    pub fn new(state: Arc<BridgeState>, peers: PeerRegistry) -> Self {
        Self { state, peers }
    }

    fn status_tool() -> Tool {
        let mut schema = serde_json::Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), json!({}));
        Tool::new(
            STATUS_TOOL_NAME,
            "Report bridge connection status and the aggregated tool count",
            Arc::new(schema),
        )
    }

    /// Builds the enumerable tool list: the synthetic status entry plus
    /// every aggregated tool, schemas normalized to object type.
    fn tool_list(state: &BridgeState) -> Vec<Tool> {
        let mut tools = vec![Self::status_tool()];
        for descriptor in state.catalog() {
            tools.push(Tool::new(
                descriptor.name.clone(),
                descriptor.description.clone(),
                Arc::new(descriptor.normalized_schema()),
            ));
        }
        tools
    }

    fn status_json(state: &BridgeState) -> Value {
        let names: Vec<String> = state.catalog().into_iter().map(|t| t.name).collect();
        json!({
            "connected": state.connected(),
            "toolCount": names.len(),
            "toolNames": names,
        })
    }
}

impl ServerHandler for BridgeTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(true),
                }),
                ..ServerCapabilities::default()
            },
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "This server bridges tools registered by open browser tabs. The tool list \
                 changes as tabs navigate; re-list after a list_changed notification."
                    .to_string(),
            ),
        }
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        self.peers.lock().await.push(context.peer);
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: Self::tool_list(&self.state),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        if request.name == STATUS_TOOL_NAME {
            let status = Self::status_json(&self.state);
            let text = serde_json::to_string_pretty(&status).unwrap_or_else(|_| status.to_string());
            return Ok(CallToolResult::success(vec![Content::text(text)]));
        }

        let arguments = request.arguments.map_or_else(|| json!({}), Value::Object);
        match self.state.dispatch(&request.name, arguments).await {
            Ok(value) => {
                let text =
                    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}
