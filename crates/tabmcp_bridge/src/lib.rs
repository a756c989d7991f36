//! Native half of the tabmcp bridge.
//!
//! Hosts the loopback listener the browser extension connects to, mirrors
//! the extension's aggregated tool catalog, routes MCP tool calls back over
//! the extension socket, and exposes the catalog as an MCP endpoint.

pub mod adapter;
pub mod auth;
pub mod error;
pub mod notify;
pub mod router;
pub mod serve;
pub mod state;
pub mod transport;
pub mod wire;

pub use error::BridgeError;
pub use serve::Bridge;
pub use state::BridgeState;
pub use wire::{ToolDescriptor, WireMessage};
