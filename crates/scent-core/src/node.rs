//! Shared request/reply algorithm.
//!
//! A [`Node`] owns everything common to both positions in the tree: its
//! identity, the local [`EventRegistry`], and the [`PendingCalls`] table. How
//! messages actually leave and enter the node is delegated to a [`Role`]:
//!
//! ```text
//!            ┌──────────── Node ────────────┐
//!  emit ───▶ │ mail_to / trigger / reply /  │ ──▶ Role::broadcast ─┐
//!  call ───▶ │ fire                         │ ──▶ Role::send ──────┼──▶ Frame::post
//!            └──────────────────────────────┘                      │
//!  listener ───────────▶ Role::receive ◀────────────────────────────┘
//! ```
//!
//! [`Hub`](crate::hub::Hub) is the role of the root frame,
//! [`Nub`](crate::nub::Nub) the role of every other frame.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, debug_span, trace, warn};

use crate::error::{RouteError, RouteResult};
use crate::frame::{FrameRef, is_top};
use crate::hub::Hub;
use crate::id::{MsgId, NodeId, next_msg_id};
use crate::message::Message;
use crate::nub::Nub;
use crate::pending::{CallHandle, PendingCalls};
use crate::registry::{EventRegistry, HandlerOutput};

// =============================================================================
// Options
// =============================================================================

/// Tunables shared by both roles.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Expire unanswered calls after this long. `None` keeps them forever.
    pub call_timeout: Option<Duration>,
    /// Let the hub drop detached children before every broadcast.
    pub sweep_on_broadcast: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            call_timeout: None,
            sweep_on_broadcast: true,
        }
    }
}

// =============================================================================
// Role
// =============================================================================

/// Which position in the tree a node occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    /// The root frame.
    Hub,
    /// Any embedded frame.
    Nub,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hub => write!(f, "hub"),
            Self::Nub => write!(f, "nub"),
        }
    }
}

/// Position-specific transport behaviour of a node.
pub trait Role: Send + Sync {
    /// Which role this is.
    fn kind(&self) -> RoleKind;

    /// Delivers an untargeted message to every relevant peer.
    fn broadcast(&self, node: &Node, message: Message);

    /// Delivers a message towards one peer.
    fn send(&self, node: &Node, message: Message);

    /// Interprets an inbound message that arrived from `origin`.
    fn receive(&self, node: &Arc<Node>, message: Message, origin: FrameRef);

    /// Number of frames this role currently talks to.
    fn peer_count(&self) -> usize;

    /// Downcast to the hub role.
    fn as_hub(&self) -> Option<&Hub> {
        None
    }
}

/// Where a reply goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTo {
    /// Name of the event being answered.
    pub name: String,
    /// Sequence number of the call being answered.
    pub msg_id: MsgId,
    /// The node that made the call.
    pub target: NodeId,
}

// =============================================================================
// Node
// =============================================================================

/// One participant in the frame tree.
pub struct Node {
    id: NodeId,
    frame: FrameRef,
    events: Arc<EventRegistry>,
    pending: Arc<PendingCalls>,
    options: NodeOptions,
    role: Box<dyn Role>,
}

impl Node {
    /// Builds a node with an explicit role.
    ///
    /// Prefer [`Node::for_frame`], which also performs the role's startup
    /// work (a nub announces itself to the root).
    pub fn new(
        frame: FrameRef,
        events: Arc<EventRegistry>,
        options: NodeOptions,
        role: Box<dyn Role>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::generate(),
            frame,
            events,
            pending: Arc::new(PendingCalls::new()),
            options,
            role,
        })
    }

    /// Builds the node for `frame`: a hub when the frame is the top of its
    /// tree, a nub attached to that top otherwise.
    pub fn for_frame(
        frame: FrameRef,
        events: Arc<EventRegistry>,
        options: NodeOptions,
    ) -> Arc<Self> {
        if is_top(frame.as_ref()) {
            Hub::spawn(frame, events, options)
        } else {
            Nub::attach(frame, events, options)
        }
    }

    /// This node's address.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// The frame this node lives in.
    pub fn frame(&self) -> &FrameRef {
        &self.frame
    }

    /// The local event registry.
    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    /// The node's options.
    pub fn options(&self) -> &NodeOptions {
        &self.options
    }

    /// Which role this node plays.
    pub fn role_kind(&self) -> RoleKind {
        self.role.kind()
    }

    /// The hub role, if this node is the root.
    pub fn as_hub(&self) -> Option<&Hub> {
        self.role.as_hub()
    }

    /// Number of frames the role currently talks to.
    pub fn peer_count(&self) -> usize {
        self.role.peer_count()
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // =========================================================================
    // Shared algorithm
    // =========================================================================

    /// Broadcasts a call and returns a handle resolving with the reply.
    ///
    /// The pending entry is registered before anything is sent.
    pub fn mail_to(&self, name: impl Into<String>, payload: Value) -> CallHandle {
        let name = name.into();
        let msg_id = next_msg_id();
        let rx = self.pending.register(msg_id);
        debug!(node_id = %self.id, msg_id = %msg_id, event = %name, "Calling");

        self.broadcast(Message::Call {
            name,
            msg_id,
            source: self.id.clone(),
            payload,
        });

        CallHandle::pending(
            msg_id,
            rx,
            Arc::downgrade(&self.pending),
            self.options.call_timeout,
        )
    }

    /// Resolves the pending call `msg_id` with `payload`.
    ///
    /// Unknown ids are ignored and reported as `false`.
    pub fn trigger(&self, msg_id: MsgId, payload: Value) -> bool {
        let resolved = self.pending.resolve(msg_id, payload);
        if !resolved {
            trace!(node_id = %self.id, msg_id = %msg_id, "Reply for unknown call ignored");
        }
        resolved
    }

    /// Sends `output` back to the caller described by `to`.
    ///
    /// A deferred output is sent once it settles. A callable output is
    /// rejected and nothing is sent.
    pub fn reply(self: &Arc<Self>, to: ReplyTo, output: HandlerOutput) -> RouteResult<()> {
        match output {
            HandlerOutput::Value(payload) => {
                self.send(Self::reply_message(&self.id, to, payload));
                Ok(())
            }
            HandlerOutput::Deferred(fut) => {
                let node = Arc::downgrade(self);
                spawn_detached(async move {
                    let payload = fut.await;
                    if let Some(node) = node.upgrade() {
                        node.send(Self::reply_message(&node.id, to, payload));
                    }
                });
                Ok(())
            }
            HandlerOutput::Callable(_) => Err(RouteError::InvalidHandlerResult { name: to.name }),
        }
    }

    /// Runs the local handler for `name`; `None` when there is none.
    pub fn fire(&self, name: &str, payload: Value) -> Option<HandlerOutput> {
        self.events.fire(name, payload)
    }

    /// Hands a message to the role's fan-out.
    pub fn broadcast(&self, message: Message) {
        self.role.broadcast(self, message);
    }

    /// Hands a message to the role's point-to-point path.
    pub fn send(&self, message: Message) {
        self.role.send(self, message);
    }

    /// Routes an inbound message.
    pub fn receive(self: &Arc<Self>, message: Message, origin: FrameRef) {
        let span = debug_span!("receive", node_id = %self.id, event = %message.name());
        let _enter = span.enter();
        self.role.receive(self, message, origin);
    }

    // =========================================================================
    // Facade entry points
    // =========================================================================

    /// Broadcasts an event with no reply path.
    pub fn emit(&self, name: impl Into<String>, payload: Value) {
        self.broadcast(Message::broadcast(name, payload));
    }

    /// Makes a call.
    ///
    /// A hub that handles `name` itself answers locally, since none of its
    /// children would ever route the call back to it. A nub always puts the
    /// call on the wire, even when it has a handler of its own.
    pub fn call(&self, name: impl Into<String>, payload: Value) -> CallHandle {
        let name = name.into();
        if self.role_kind() == RoleKind::Nub {
            return self.mail_to(name, payload);
        }
        match self.fire(&name, payload.clone()) {
            None => self.mail_to(name, payload),
            Some(HandlerOutput::Value(value)) => CallHandle::ready(Ok(value)),
            Some(HandlerOutput::Deferred(fut)) => CallHandle::local(fut.map(Ok)),
            Some(HandlerOutput::Callable(_)) => {
                CallHandle::ready(Err(RouteError::InvalidHandlerResult { name }))
            }
        }
    }

    // =========================================================================
    // Helpers for roles
    // =========================================================================

    /// Tries local dispatch of an untargeted message.
    ///
    /// Returns `false` if no handler exists. When the message is a call, the
    /// handler output is sent back as a reply.
    pub fn dispatch(self: &Arc<Self>, message: &Message) -> bool {
        let (name, payload, reply_to) = match message {
            Message::Broadcast { name, payload, .. } => (name, payload, None),
            Message::Call {
                name,
                msg_id,
                source,
                payload,
            } => (
                name,
                payload,
                Some(ReplyTo {
                    name: name.clone(),
                    msg_id: *msg_id,
                    target: source.clone(),
                }),
            ),
            _ => return false,
        };

        let Some(output) = self.fire(name, payload.clone()) else {
            return false;
        };

        match reply_to {
            Some(to) => {
                if let Err(e) = self.reply(to, output) {
                    warn!(node_id = %self.id, error = %e, "Handler result could not be sent");
                }
            }
            None => {
                // Nobody waits for the value, but the handler's work still has to run.
                if let HandlerOutput::Deferred(fut) = output {
                    spawn_detached(async move {
                        fut.await;
                    });
                }
            }
        }
        true
    }

    /// Posts a message to `frame` with this node's frame as origin.
    pub fn post(&self, frame: &FrameRef, message: Message) {
        frame.post(message.into_wire(), Arc::clone(&self.frame));
    }

    /// Posts an already-encoded payload to `frame`.
    pub fn post_wire(&self, frame: &FrameRef, data: Value) {
        frame.post(data, Arc::clone(&self.frame));
    }

    fn reply_message(id: &NodeId, to: ReplyTo, payload: Value) -> Message {
        Message::Reply {
            name: to.name,
            msg_id: to.msg_id,
            target: to.target,
            payload,
            source: Some(id.clone()),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("role", &self.role.kind())
            .field("peers", &self.role.peer_count())
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Runs `fut` on the current tokio runtime without waiting for it.
fn spawn_detached<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(fut);
        }
        Err(_) => warn!("No tokio runtime available, deferred handler output dropped"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frame::{Frame, InboundListener, TeardownHook};
    use crate::message::Envelope;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Frame that records everything posted to it.
    #[derive(Default)]
    pub(crate) struct MockFrame {
        pub parent: Option<FrameRef>,
        pub detached: Mutex<bool>,
        pub inbox: Mutex<Vec<Value>>,
        pub hooks: Mutex<Vec<TeardownHook>>,
    }

    impl MockFrame {
        pub fn top() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn child_of(parent: &Arc<Self>) -> Arc<Self> {
            Arc::new(Self {
                parent: Some(parent.clone() as FrameRef),
                ..Default::default()
            })
        }

        pub fn messages(&self) -> Vec<Message> {
            self.inbox
                .lock()
                .iter()
                .map(|v| Message::try_from(Envelope::from_wire(v.clone()).unwrap()).unwrap())
                .collect()
        }

        pub fn tear_down(&self) {
            *self.detached.lock() = true;
            let hooks: Vec<TeardownHook> = self.hooks.lock().drain(..).collect();
            for hook in hooks {
                hook();
            }
        }
    }

    impl fmt::Debug for MockFrame {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("MockFrame")
        }
    }

    impl Frame for MockFrame {
        fn parent(&self) -> Option<FrameRef> {
            self.parent.clone()
        }

        fn is_attached(&self) -> bool {
            !*self.detached.lock()
        }

        fn post(&self, data: Value, _origin: FrameRef) {
            self.inbox.lock().push(data);
        }

        fn listen(&self, _listener: InboundListener) {}

        fn on_teardown(&self, hook: TeardownHook) {
            self.hooks.lock().push(hook);
        }
    }

    pub(crate) fn hub_node(events: Arc<EventRegistry>) -> (Arc<Node>, Arc<MockFrame>) {
        let frame = MockFrame::top();
        let node = Node::for_frame(frame.clone(), events, NodeOptions::default());
        (node, frame)
    }

    #[tokio::test]
    async fn test_local_call_short_circuits() {
        let events = Arc::new(EventRegistry::new());
        events.on("x", |_| 2i64);
        let (hub, _) = hub_node(events);

        assert_eq!(hub.call("x", json!(1)).await, Ok(json!(2)));
        assert_eq!(hub.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_local_call_with_callable_output_fails() {
        let events = Arc::new(EventRegistry::new());
        events.on("f", |_| HandlerOutput::callable(|v| v));
        let (hub, _) = hub_node(events);

        let err = hub.call("f", Value::Null).await.unwrap_err();
        assert_eq!(err, RouteError::InvalidHandlerResult { name: "f".into() });
    }

    #[test]
    fn test_reply_rejects_callable_and_sends_nothing() {
        let events = Arc::new(EventRegistry::new());
        let (hub, _) = hub_node(events);
        let child = MockFrame::child_of(&MockFrame::top());
        hub.as_hub().unwrap().push("c".into(), child.clone());

        let to = ReplyTo {
            name: "f".into(),
            msg_id: 1,
            target: "c".into(),
        };
        let result = hub.reply(to, HandlerOutput::callable(|v| v));
        assert!(matches!(result, Err(RouteError::InvalidHandlerResult { .. })));
        assert!(child.inbox.lock().is_empty());
    }

    #[tokio::test]
    async fn test_deferred_reply_sends_settled_value() {
        let events = Arc::new(EventRegistry::new());
        let (hub, _) = hub_node(events);
        let child = MockFrame::child_of(&MockFrame::top());
        hub.as_hub().unwrap().push("c".into(), child.clone());

        let (tx, rx) = tokio::sync::oneshot::channel::<Value>();
        let to = ReplyTo {
            name: "slow".into(),
            msg_id: 9,
            target: "c".into(),
        };
        hub.reply(
            to,
            HandlerOutput::deferred(async move { rx.await.unwrap_or(Value::Null) }),
        )
        .unwrap();

        tokio::task::yield_now().await;
        assert!(child.inbox.lock().is_empty());

        tx.send(json!({"done": true})).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let sent = child.messages();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Message::Reply {
                msg_id, payload, ..
            } => {
                assert_eq!(*msg_id, 9);
                assert_eq!(payload, &json!({"done": true}));
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_trigger_unknown_id_is_stale() {
        let events = Arc::new(EventRegistry::new());
        let (hub, _) = hub_node(events);
        assert!(!hub.trigger(12345, Value::Null));
    }
}
