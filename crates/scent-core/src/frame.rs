//! Transport boundary.
//!
//! A [`Frame`] is a handle to one execution context in the tree. The routing
//! core only needs four things from the transport below it:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | [`parent`](Frame::parent) | root test and upward walk |
//! | [`post`](Frame::post) | fire-and-forget delivery to the frame's listener |
//! | [`listen`](Frame::listen) | install the inbound listener |
//! | [`on_teardown`](Frame::on_teardown) | best-effort hook when the frame goes away |
//!
//! Delivery is asynchronous and best-effort. Payloads posted between one
//! fixed pair of frames arrive in order; nothing is delivered once the
//! target has been torn down.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Shared handle to a frame.
pub type FrameRef = Arc<dyn Frame>;

/// Called with every payload delivered to a frame, plus the frame it came from.
pub type InboundListener = Arc<dyn Fn(Value, FrameRef) + Send + Sync>;

/// Hook run once when a frame is torn down.
pub type TeardownHook = Box<dyn FnOnce() + Send>;

/// A context reachable through the cross-context transport.
pub trait Frame: Send + Sync + fmt::Debug {
    /// Returns the enclosing frame, or `None` for the topmost frame.
    fn parent(&self) -> Option<FrameRef>;

    /// Returns `true` while the frame is still part of the tree.
    fn is_attached(&self) -> bool;

    /// Posts `data` to this frame's listener, tagging it with `origin`.
    fn post(&self, data: Value, origin: FrameRef);

    /// Installs the inbound listener, replacing any previous one.
    fn listen(&self, listener: InboundListener);

    /// Registers a hook to run when this frame is torn down.
    fn on_teardown(&self, hook: TeardownHook);

    /// Short label used in logs.
    fn label(&self) -> String {
        format!("{self:?}")
    }
}

/// Returns `true` if `frame` is its own topological root.
pub fn is_top(frame: &dyn Frame) -> bool {
    frame.parent().is_none()
}

/// Walks the parent chain of `frame` up to the frame with no parent.
///
/// Returns `frame` itself when it already is the top.
pub fn top_of(frame: &FrameRef) -> FrameRef {
    let mut current = Arc::clone(frame);
    while let Some(parent) = current.parent() {
        current = parent;
    }
    current
}

/// Returns `true` if both handles point at the same frame.
pub fn same_frame(a: &FrameRef, b: &FrameRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
