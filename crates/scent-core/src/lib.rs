//! # Scent Core
//!
//! The routing protocol behind scent: named events and request/response calls
//! exchanged between frames of a nested tree, without any frame knowing the
//! tree's shape.
//!
//! ## Layers
//!
//! - **Model**: identifiers ([`NodeId`], [`MsgId`]), the wire [`Envelope`] and
//!   the internal [`Message`] sum type
//! - **Local state**: the [`EventRegistry`] of handlers and the
//!   [`PendingCalls`] table behind every [`CallHandle`]
//! - **Routing**: the shared [`Node`] algorithm and its two [`Role`]s,
//!   [`Hub`] for the root frame and [`Nub`] for every other frame
//! - **Transport boundary**: the [`Frame`] trait implemented by transports
//!
//! ## Topology
//!
//! Every nub links directly to the topmost frame, however deeply it is
//! nested. The hub relays between them:
//!
//! ```text
//!            ┌──────────────┐
//!            │  Hub (top)   │
//!            └──────────────┘
//!             ▲      ▲     ▲
//!             │      │     │   ready / sync / broadcast / call / reply
//!       ┌─────┘      │     └──────┐
//!   ┌───────┐   ┌───────┐   ┌───────────────┐
//!   │ Nub A │   │ Nub B │   │ Nub C (B's    │
//!   └───────┘   └───────┘   │ nested frame) │
//!                           └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use scent_core::{EventRegistry, Node, NodeOptions};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let events = Arc::new(EventRegistry::new());
//! events.on("add-one", |v: serde_json::Value| json!(v.as_i64().unwrap_or(0) + 1));
//!
//! let node = Node::for_frame(frame, events, NodeOptions::default());
//! let answer = node.call("add-one", json!(1)).await?;
//! ```

pub mod error;
pub mod frame;
pub mod hub;
pub mod id;
pub mod message;
pub mod node;
pub mod nub;
pub mod pending;
pub mod registry;

pub use error::{RouteError, RouteResult};
pub use frame::{Frame, FrameRef, InboundListener, TeardownHook, is_top, same_frame, top_of};
pub use hub::{Child, Hub};
pub use id::{MsgId, NodeId, next_msg_id};
pub use message::{Envelope, MARKER, Message, READY, SYNC};
pub use node::{Node, NodeOptions, ReplyTo, Role, RoleKind};
pub use nub::Nub;
pub use pending::{CallHandle, PendingCalls};
pub use registry::{Callable, EventRegistry, Handler, HandlerOutput};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        CallHandle, EventRegistry, Frame, FrameRef, HandlerOutput, Node, NodeOptions, RouteError,
        RouteResult,
    };
}
