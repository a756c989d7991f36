//! JSON wire protocol spoken between the bridge and the extension socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised by a browser context: name, description, and input
/// schema. Immutable once registered; replaced wholesale on re-registration
/// under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: schema,
        }
    }

    /// Returns the input schema normalized to declare an object type, even
    /// when the source omitted one.
    pub fn normalized_schema(&self) -> serde_json::Map<String, Value> {
        match &self.input_schema {
            Value::Object(map) => {
                let mut map = map.clone();
                map.entry("type".to_string())
                    .or_insert_with(|| Value::String("object".to_string()));
                map
            }
            _ => {
                let mut map = serde_json::Map::new();
                map.insert("type".to_string(), Value::String("object".to_string()));
                map
            }
        }
    }
}

/// Frames crossing the extension socket, tagged by a `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Full replace of the sender's advertised tools.
    RegisterTools { tools: Vec<ToolDescriptor> },
    /// Hint only: the receiver should assume tools may differ.
    ToolsChanged {},
    /// Pull-based supplement to the push path.
    GetTools {
        #[serde(rename = "requestId")]
        request_id: u64,
    },
    ToolsList {
        #[serde(rename = "requestId")]
        request_id: u64,
        tools: Vec<ToolDescriptor>,
    },
    /// Call dispatch toward the owning context.
    ExecuteTool {
        #[serde(rename = "callId")]
        call_id: u64,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
    /// Call outcome; exactly one of `result`/`error` is meaningful.
    ToolResult {
        #[serde(rename = "callId")]
        call_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, rename = "isError")]
        is_error: bool,
    },
}

/// Parses one inbound frame. Unrecognized `type` values and non-parseable
/// frames yield `None`; they are dropped by the caller, never fatal.
pub fn parse_frame(text: &str) -> Option<WireMessage> {
    match serde_json::from_str(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            log::debug!("dropping unparseable frame: {e}");
            None
        }
    }
}

/// Serializes an outbound frame.
///
/// # Errors
///
/// Returns an error if serialization fails (practically unreachable for
/// these types).
pub fn encode_frame(msg: &WireMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_tools_roundtrip() {
        let msg = WireMessage::RegisterTools {
            tools: vec![ToolDescriptor::new(
                "search",
                "Search",
                json!({"type": "object"}),
            )],
        };
        let text = encode_frame(&msg).unwrap();
        assert!(text.contains("\"type\":\"register_tools\""));
        assert!(text.contains("\"inputSchema\""));
        assert_eq!(parse_frame(&text).unwrap(), msg);
    }

    #[test]
    fn test_tool_result_field_names() {
        let text = r#"{"type":"tool_result","callId":7,"result":{"ok":true}}"#;
        let msg = parse_frame(text).unwrap();
        assert_eq!(
            msg,
            WireMessage::ToolResult {
                call_id: 7,
                result: Some(json!({"ok": true})),
                error: None,
                is_error: false,
            }
        );
    }

    #[test]
    fn test_unknown_type_is_dropped() {
        assert!(parse_frame(r#"{"type":"launch_missiles"}"#).is_none());
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        assert!(parse_frame("{not json").is_none());
        assert!(parse_frame("").is_none());
    }

    #[test]
    fn test_schema_normalization_adds_object_type() {
        let tool = ToolDescriptor::new("t", "", json!({"properties": {}}));
        let schema = tool.normalized_schema();
        assert_eq!(schema.get("type"), Some(&json!("object")));

        let untyped = ToolDescriptor::new("t", "", Value::Null);
        assert_eq!(untyped.normalized_schema().get("type"), Some(&json!("object")));

        let typed = ToolDescriptor::new("t", "", json!({"type": "string"}));
        assert_eq!(typed.normalized_schema().get("type"), Some(&json!("string")));
    }
}
