/// Error kinds for the bridge surface.
///
/// Everything that reaches the MCP boundary is converted into a structured
/// error result; none of these crash the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Bad or missing token/origin. Rejected before any state changes.
    #[error("unauthorized: {0}")]
    Auth(String),
    /// Tool name unknown to any live context.
    #[error("tool '{0}' not found")]
    NotFound(String),
    /// No result within the call deadline.
    #[error("tool call timed out")]
    Timeout,
    /// Owning connection lost mid-call, or absent beyond the grace window.
    #[error("extension disconnected")]
    Disconnected,
    /// Malformed frame. Dropped and logged, never surfaced to callers.
    #[error("malformed frame: {0}")]
    Transport(String),
    /// The tool's own logic failed; carries the tool-supplied message.
    #[error("{0}")]
    Execution(String),
}
