//! The host-provided tool-registration capability, as an explicit
//! interface the interceptor decorates.

use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tabmcp_bridge::ToolDescriptor;

/// Future returned by a registered tool executable.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// A registered tool's executable. Shared so invocation can outlive the
/// registration borrow.
pub type ToolFn = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// The four registration operations of the host capability.
///
/// The interceptor wraps an implementation of this trait rather than
/// monkey-patching anything: interception is in place the moment the
/// wrapped capability is handed to page code.
pub trait ToolCapability: Send {
    fn register(&mut self, descriptor: &ToolDescriptor);
    fn unregister(&mut self, name: &str);
    fn replace_all(&mut self, descriptors: &[ToolDescriptor]);
    fn clear_all(&mut self);
}

/// Stand-in installed when the host capability is entirely absent, so page
/// code that unconditionally registers tools does not throw.
pub struct NoopCapability;

impl ToolCapability for NoopCapability {
    fn register(&mut self, _descriptor: &ToolDescriptor) {}
    fn unregister(&mut self, _name: &str) {}
    fn replace_all(&mut self, _descriptors: &[ToolDescriptor]) {}
    fn clear_all(&mut self) {}
}
