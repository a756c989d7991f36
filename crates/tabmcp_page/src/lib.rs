//! Page half of the tabmcp bridge.
//!
//! Runs inside one browser context across two isolation boundaries: the
//! interceptor wraps the host's tool-registration capability in the page
//! execution world, and the relay forwards nonce-tagged messages between
//! that world and the privileged runtime.

pub mod capability;
pub mod interceptor;
pub mod messages;
pub mod relay;

pub use capability::{NoopCapability, ToolCapability, ToolFn};
pub use interceptor::InPageInterceptor;
pub use messages::{Framed, PageCommand, PageEvent};
pub use relay::IsolationRelay;
