//! Node identifiers and call sequence numbers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Sequence number of a request/response call.
pub type MsgId = u64;

/// Process-wide call counter. Starts at 0 and is bumped before each use.
static MSG_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Allocates the next call sequence number.
///
/// Shared by every node in the process and never reset, so the first call
/// made anywhere in the process gets `1`.
pub fn next_msg_id() -> MsgId {
    MSG_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

/// Opaque address of a node within the frame tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generates a fresh, process-unique identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
