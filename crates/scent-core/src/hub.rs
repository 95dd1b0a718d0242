//! Root role.
//!
//! The hub keeps the registration table of every frame that announced itself
//! with `ready`, fans broadcasts out to them, and relays targeted replies
//! between them. Children attach to the hub directly no matter how deeply
//! they are nested, so the table is flat.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, trace};

use crate::frame::{FrameRef, same_frame};
use crate::id::NodeId;
use crate::message::Message;
use crate::node::{Node, NodeOptions, Role, RoleKind};
use crate::registry::EventRegistry;

/// One attached child frame.
#[derive(Debug, Clone)]
pub struct Child {
    /// The child's node id.
    pub id: NodeId,
    /// Handle used to reach it.
    pub frame: FrameRef,
}

/// Role of the root frame.
#[derive(Debug, Default)]
pub struct Hub {
    children: RwLock<Vec<Child>>,
}

impl Hub {
    /// Creates a hub with an empty registration table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a node playing the hub role in `frame`.
    pub fn spawn(frame: FrameRef, events: Arc<EventRegistry>, options: NodeOptions) -> Arc<Node> {
        let node = Node::new(frame, events, options, Box::new(Self::new()));
        debug!(node_id = %node.id(), "Hub started");
        node
    }

    /// Registers a child. Returns `false` if `id` was already known.
    pub fn push(&self, id: NodeId, frame: FrameRef) -> bool {
        let mut children = self.children.write();
        if children.iter().any(|c| c.id == id) {
            return false;
        }
        children.push(Child { id, frame });
        true
    }

    /// Removes children and returns how many went away.
    ///
    /// With an id, removes that child. Without one, drops every child whose
    /// frame is no longer attached to the tree.
    pub fn sync(&self, id: Option<&NodeId>) -> usize {
        let mut children = self.children.write();
        let before = children.len();
        match id {
            Some(id) => children.retain(|c| &c.id != id),
            None => children.retain(|c| c.frame.is_attached()),
        }
        before - children.len()
    }

    /// Returns the frame registered under `id`.
    pub fn frame_of(&self, id: &NodeId) -> Option<FrameRef> {
        self.children
            .read()
            .iter()
            .find(|c| &c.id == id)
            .map(|c| Arc::clone(&c.frame))
    }

    /// Returns `true` if `id` is registered.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.children.read().iter().any(|c| &c.id == id)
    }

    /// Returns the registered ids in attach order.
    pub fn child_ids(&self) -> Vec<NodeId> {
        self.children.read().iter().map(|c| c.id.clone()).collect()
    }

    /// Returns the id registered for `frame`, if any.
    pub fn id_of(&self, frame: &FrameRef) -> Option<NodeId> {
        self.children
            .read()
            .iter()
            .find(|c| same_frame(&c.frame, frame))
            .map(|c| c.id.clone())
    }

    /// Returns the number of registered children.
    pub fn len(&self) -> usize {
        self.children.read().len()
    }

    /// Returns `true` if no child is registered.
    pub fn is_empty(&self) -> bool {
        self.children.read().is_empty()
    }
}

impl Role for Hub {
    fn kind(&self) -> RoleKind {
        RoleKind::Hub
    }

    fn broadcast(&self, node: &Node, mut message: Message) {
        if node.options().sweep_on_broadcast {
            let dropped = self.sync(None);
            if dropped > 0 {
                info!(node_id = %node.id(), dropped, "Dropped detached children");
            }
        }

        // Stamp messages originating here so receivers can answer calls.
        message.stamp_source_if_missing(node.id());
        let source = message.source().cloned();

        let targets: Vec<FrameRef> = self
            .children
            .read()
            .iter()
            .filter(|c| Some(&c.id) != source.as_ref())
            .map(|c| Arc::clone(&c.frame))
            .collect();

        trace!(
            node_id = %node.id(),
            event = %message.name(),
            recipients = targets.len(),
            "Broadcasting"
        );

        let wire = message.into_wire();
        for frame in &targets {
            node.post_wire(frame, wire.clone());
        }
    }

    fn send(&self, node: &Node, message: Message) {
        let Some(target) = message.target() else {
            debug!(event = %message.name(), "Untargeted message passed to send, dropped");
            return;
        };
        match self.frame_of(target) {
            Some(frame) => {
                trace!(node_id = %node.id(), target = %target, "Forwarding");
                node.post(&frame, message);
            }
            None => {
                debug!(target = %target, event = %message.name(), "Unroutable target, dropped");
            }
        }
    }

    fn receive(&self, node: &Arc<Node>, message: Message, origin: FrameRef) {
        match message {
            Message::Ready { source } => {
                if self.push(source.clone(), origin) {
                    info!(child = %source, children = self.len(), "Child attached");
                } else {
                    trace!(child = %source, "Duplicate ready ignored");
                }
            }
            Message::Sync { source } => {
                if self.sync(Some(&source)) > 0 {
                    info!(child = %source, children = self.len(), "Child detached");
                }
            }
            Message::Reply {
                target,
                msg_id,
                payload,
                ..
            } if &target == node.id() => {
                node.trigger(msg_id, payload);
            }
            reply @ Message::Reply { .. } => self.send(node, reply),
            message => {
                if !node.dispatch(&message) {
                    debug!(event = %message.name(), "No local handler, propagating");
                    self.broadcast(node, message);
                }
            }
        }
    }

    fn peer_count(&self) -> usize {
        self.len()
    }

    fn as_hub(&self) -> Option<&Hub> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::{MockFrame, hub_node};
    use crate::registry::HandlerOutput;
    use serde_json::{Value, json};

    fn setup() -> (Arc<Node>, Arc<MockFrame>, Arc<MockFrame>, Arc<MockFrame>) {
        let events = Arc::new(EventRegistry::new());
        let (hub, top) = hub_node(events);
        let a = MockFrame::child_of(&top);
        let b = MockFrame::child_of(&top);
        hub.receive(Message::Ready { source: "a".into() }, a.clone());
        hub.receive(Message::Ready { source: "b".into() }, b.clone());
        (hub, top, a, b)
    }

    #[test]
    fn test_push_is_idempotent() {
        let hub = Hub::new();
        let top = MockFrame::top();
        assert!(hub.push("a".into(), top.clone()));
        assert!(!hub.push("a".into(), top));
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_ready_registers_origin() {
        let events = Arc::new(EventRegistry::new());
        let (hub, top) = hub_node(events);
        assert_eq!(hub.peer_count(), 0);

        let child = MockFrame::child_of(&top);
        hub.receive(Message::Ready { source: "n".into() }, child.clone());

        let table = hub.as_hub().unwrap();
        assert_eq!(table.child_ids(), vec![NodeId::from("n")]);
        assert_eq!(table.id_of(&(child as FrameRef)), Some(NodeId::from("n")));
    }

    #[test]
    fn test_broadcast_skips_source() {
        let (hub, _, a, b) = setup();
        // No sender stamped: the hub claims it and every child gets a copy.
        hub.receive(Message::broadcast("y", json!(1)), a.clone());
        let mut from_a = Message::broadcast("y", json!(1));
        from_a.stamp_source(&"a".into());
        hub.receive(from_a, a.clone());

        assert_eq!(b.messages().len(), 2);
        assert_eq!(a.messages().len(), 1);
    }

    #[test]
    fn test_hub_originated_broadcast_carries_hub_id() {
        let (hub, _, a, _) = setup();
        hub.emit("note", json!("hi"));
        let got = a.messages();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].source(), Some(hub.id()));
    }

    #[test]
    fn test_handled_call_replies_to_caller() {
        let events = Arc::new(EventRegistry::new());
        events.on("sum", |v: Value| json!(v.as_i64().unwrap_or(0) + 1));
        let (hub, top) = hub_node(events);
        let a = MockFrame::child_of(&top);
        hub.receive(Message::Ready { source: "a".into() }, a.clone());

        hub.receive(
            Message::Call {
                name: "sum".into(),
                msg_id: 5,
                source: "a".into(),
                payload: json!(41),
            },
            a.clone(),
        );

        let got = a.messages();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].target(), Some(&NodeId::from("a")));
        assert_eq!(got[0].msg_id(), Some(5));
        assert!(matches!(&got[0], Message::Reply { payload, .. } if payload == &json!(42)));
    }

    #[test]
    fn test_inbound_call_with_callable_output_sends_nothing() {
        let events = Arc::new(EventRegistry::new());
        events.on("f", |_| HandlerOutput::callable(|v| v));
        let (hub, top) = hub_node(events);
        let a = MockFrame::child_of(&top);
        let b = MockFrame::child_of(&top);
        hub.receive(Message::Ready { source: "a".into() }, a.clone());
        hub.receive(Message::Ready { source: "b".into() }, b.clone());

        hub.receive(
            Message::Call {
                name: "f".into(),
                msg_id: 9,
                source: "a".into(),
                payload: Value::Null,
            },
            a.clone(),
        );

        // The call counts as handled: no reply goes back and nothing propagates.
        assert!(a.messages().is_empty());
        assert!(b.messages().is_empty());
        assert!(top.messages().is_empty());
        assert_eq!(hub.pending_count(), 0);
    }

    #[test]
    fn test_handled_broadcast_is_not_propagated() {
        let events = Arc::new(EventRegistry::new());
        events.on("y", |_| ());
        let (hub, top) = hub_node(events);
        let a = MockFrame::child_of(&top);
        let b = MockFrame::child_of(&top);
        hub.receive(Message::Ready { source: "a".into() }, a.clone());
        hub.receive(Message::Ready { source: "b".into() }, b.clone());

        let mut msg = Message::broadcast("y", Value::Null);
        msg.stamp_source(&"a".into());
        hub.receive(msg, a.clone());

        assert!(a.messages().is_empty());
        assert!(b.messages().is_empty());
    }

    #[test]
    fn test_reply_for_other_child_is_relayed() {
        let (hub, _, a, b) = setup();
        hub.receive(
            Message::Reply {
                name: "y".into(),
                msg_id: 1,
                target: "a".into(),
                payload: json!(42),
                source: Some("b".into()),
            },
            b.clone(),
        );
        let got = a.messages();
        assert_eq!(got.len(), 1);
        // Relays never rewrite the sender.
        assert_eq!(got[0].source(), Some(&NodeId::from("b")));
        assert!(b.messages().is_empty());
    }

    #[test]
    fn test_sync_removes_child_and_drops_later_sends() {
        let (hub, _, a, b) = setup();
        hub.receive(Message::Sync { source: "a".into() }, a.clone());
        assert!(!hub.as_hub().unwrap().contains(&"a".into()));

        hub.receive(
            Message::Reply {
                name: "y".into(),
                msg_id: 1,
                target: "a".into(),
                payload: json!(1),
                source: Some("b".into()),
            },
            b,
        );
        assert!(a.messages().is_empty());
    }

    #[test]
    fn test_liveness_sweep_drops_detached_frames() {
        let (hub, _, a, b) = setup();
        a.tear_down();
        let table = hub.as_hub().unwrap();
        assert_eq!(table.sync(None), 1);
        assert_eq!(table.child_ids(), vec![NodeId::from("b")]);

        // Broadcasting sweeps too.
        b.tear_down();
        hub.emit("x", Value::Null);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_call_from_hub_resolves_on_reply() {
        let (hub, _, a, _) = setup();
        let handle = hub.call("remote", json!(1));
        let msg_id = handle.msg_id().unwrap();

        let sent = a.messages();
        assert!(matches!(&sent[0], Message::Call { source, .. } if source == hub.id()));

        hub.receive(
            Message::Reply {
                name: "remote".into(),
                msg_id,
                target: hub.id().clone(),
                payload: json!("pong"),
                source: Some("a".into()),
            },
            a,
        );
        assert_eq!(handle.await, Ok(json!("pong")));
        assert_eq!(hub.pending_count(), 0);
    }
}
