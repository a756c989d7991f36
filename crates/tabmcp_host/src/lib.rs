//! Privileged-runtime half of the bridge: keeps the per-context tool
//! registry, routes calls to their owning context, and mirrors the
//! aggregate over the extension socket.

pub mod client;
pub mod registry;
pub mod runtime;
pub mod store;

pub use client::{BridgeClient, RetryPolicy};
pub use registry::{AggregatedTool, ContextMeta, ContextRecord, ContextRegistry};
pub use runtime::{HostEvent, HostRuntime};
pub use store::{JsonFileStore, SessionStore, Snapshot};
