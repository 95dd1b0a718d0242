//! Pending-call table and the handle returned to callers.
//!
//! Each outgoing call registers a one-shot channel keyed on its [`MsgId`]
//! before the request leaves the node, so a reply can never overtake its own
//! registration. The reply path resolves the channel through
//! [`PendingCalls::resolve`]; the caller awaits the matching [`CallHandle`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{RouteError, RouteResult};
use crate::id::MsgId;

// =============================================================================
// PendingCalls
// =============================================================================

/// Outstanding calls of one node: msg_id → sender half of the reply channel.
#[derive(Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<MsgId, oneshot::Sender<Value>>>,
}

impl PendingCalls {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call and returns the receiver its reply will arrive on.
    pub fn register(&self, msg_id: MsgId) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.calls.lock().insert(msg_id, tx);
        rx
    }

    /// Resolves and removes the entry for `msg_id`.
    ///
    /// Returns `false` for ids with no entry (already answered, expired, or
    /// never issued here).
    pub fn resolve(&self, msg_id: MsgId, payload: Value) -> bool {
        let Some(tx) = self.calls.lock().remove(&msg_id) else {
            return false;
        };
        if tx.send(payload).is_err() {
            trace!(msg_id = %msg_id, "Caller stopped waiting before the reply arrived");
        }
        true
    }

    /// Drops the entry for `msg_id` without resolving it.
    pub fn cancel(&self, msg_id: MsgId) -> bool {
        self.calls.lock().remove(&msg_id).is_some()
    }

    /// Returns `true` if `msg_id` is still waiting for a reply.
    pub fn contains(&self, msg_id: MsgId) -> bool {
        self.calls.lock().contains_key(&msg_id)
    }

    /// Returns the number of outstanding calls.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns `true` if no call is outstanding.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

impl fmt::Debug for PendingCalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCalls")
            .field("outstanding", &self.len())
            .finish()
    }
}

// =============================================================================
// CallHandle
// =============================================================================

/// Future resolving to the payload of a call's reply.
///
/// Without a timeout the handle stays pending until a reply arrives, forever
/// if none does. With a timeout the clock starts on first poll; on expiry the
/// pending entry is removed and [`RouteError::Timeout`] is returned.
#[must_use = "a call handle does nothing unless awaited"]
pub struct CallHandle {
    msg_id: Option<MsgId>,
    inner: BoxFuture<'static, RouteResult<Value>>,
}

impl CallHandle {
    /// Creates a handle waiting on a registered pending entry.
    pub fn pending(
        msg_id: MsgId,
        rx: oneshot::Receiver<Value>,
        table: Weak<PendingCalls>,
        limit: Option<Duration>,
    ) -> Self {
        let inner = async move {
            let Some(limit) = limit else {
                return rx.await.map_err(|_| RouteError::Disconnected);
            };
            match timeout(limit, rx).await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(_)) => Err(RouteError::Disconnected),
                Err(_) => {
                    if let Some(table) = table.upgrade() {
                        table.cancel(msg_id);
                    }
                    debug!(msg_id = %msg_id, "Call timed out");
                    Err(RouteError::Timeout { msg_id })
                }
            }
        };
        Self {
            msg_id: Some(msg_id),
            inner: inner.boxed(),
        }
    }

    /// Creates a handle answered without leaving the node.
    pub fn local<F>(fut: F) -> Self
    where
        F: Future<Output = RouteResult<Value>> + Send + 'static,
    {
        Self {
            msg_id: None,
            inner: fut.boxed(),
        }
    }

    /// Creates an already-settled handle.
    pub fn ready(result: RouteResult<Value>) -> Self {
        Self::local(futures::future::ready(result))
    }

    /// Sequence number of the call, if it went onto the wire.
    pub fn msg_id(&self) -> Option<MsgId> {
        self.msg_id
    }
}

impl Future for CallHandle {
    type Output = RouteResult<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("msg_id", &self.msg_id)
            .finish_non_exhaustive()
    }
}
