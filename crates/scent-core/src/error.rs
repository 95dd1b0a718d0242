//! Error types for the scent routing core.
//!
//! Only conditions a caller can observe are errors. Routing outcomes that the
//! protocol treats as policy (an unroutable target, an unhandled event, a
//! reply for an unknown call) are logged and dropped instead.

use thiserror::Error;

use crate::id::MsgId;

// =============================================================================
// Route Errors
// =============================================================================

/// Errors that can occur while routing events and calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A handler returned a callable, which cannot be sent as a reply payload.
    #[error("handler for '{name}' returned a callable; only data can be sent as a reply")]
    InvalidHandlerResult {
        /// The event whose handler misbehaved.
        name: String,
    },

    /// The pending call was dropped before a reply arrived.
    #[error("node dropped before the call was answered")]
    Disconnected,

    /// The configured call timeout elapsed.
    #[error("call {msg_id} timed out")]
    Timeout {
        /// The sequence number of the expired call.
        msg_id: MsgId,
    },

    /// An inbound envelope could not be turned into a message.
    #[error("malformed envelope: {0}")]
    Decode(String),
}

impl RouteError {
    /// Creates a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

impl From<serde_json::Error> for RouteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for routing operations.
pub type RouteResult<T> = Result<T, RouteError>;
