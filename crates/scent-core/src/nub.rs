//! Non-root role.
//!
//! A nub talks to exactly one frame: the topmost frame of its tree, found by
//! walking the parent chain once at construction. Every outbound message,
//! broadcast or targeted, goes up that link stamped with the nub's own id.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::frame::{FrameRef, top_of};
use crate::message::Message;
use crate::node::{Node, NodeOptions, Role, RoleKind};
use crate::registry::EventRegistry;

/// Role of an embedded frame.
#[derive(Debug)]
pub struct Nub {
    upward: FrameRef,
}

impl Nub {
    /// Creates the role for `frame`, linked to the top of its tree.
    pub fn new(frame: &FrameRef) -> Self {
        Self {
            upward: top_of(frame),
        }
    }

    /// Builds a node playing the nub role in `frame` and announces it.
    ///
    /// Sends `ready` to the root right away and registers a teardown hook on
    /// `frame` that sends `sync`. The hook is best-effort: if the frame is
    /// already gone nothing is delivered and the root's liveness sweep cleans
    /// up instead.
    pub fn attach(frame: FrameRef, events: Arc<EventRegistry>, options: NodeOptions) -> Arc<Node> {
        let role = Self::new(&frame);
        let upward = role.upward.label();
        let node = Node::new(Arc::clone(&frame), events, options, Box::new(role));

        node.send(Message::Ready {
            source: node.id().clone(),
        });
        debug!(node_id = %node.id(), top = %upward, "Nub attached");

        let weak = Arc::downgrade(&node);
        frame.on_teardown(Box::new(move || {
            if let Some(node) = weak.upgrade() {
                debug!(node_id = %node.id(), "Frame torn down, detaching");
                node.send(Message::Sync {
                    source: node.id().clone(),
                });
            }
        }));

        node
    }

    /// The frame every message is sent to.
    pub fn upward(&self) -> &FrameRef {
        &self.upward
    }
}

impl Role for Nub {
    fn kind(&self) -> RoleKind {
        RoleKind::Nub
    }

    fn broadcast(&self, node: &Node, message: Message) {
        self.send(node, message);
    }

    fn send(&self, node: &Node, mut message: Message) {
        message.stamp_source(node.id());
        trace!(node_id = %node.id(), event = %message.name(), "Sending upward");
        node.post(&self.upward, message);
    }

    fn receive(&self, node: &Arc<Node>, message: Message, _origin: FrameRef) {
        match message {
            Message::Reply {
                target,
                msg_id,
                payload,
                ..
            } => {
                if &target == node.id() {
                    node.trigger(msg_id, payload);
                } else {
                    trace!(target = %target, "Reply for another node ignored");
                }
            }
            Message::Ready { .. } | Message::Sync { .. } => {
                trace!(event = %message.name(), "Control message ignored on nub");
            }
            message => {
                if !node.dispatch(&message) {
                    // Nothing below a nub to propagate into.
                    trace!(event = %message.name(), "No local handler, dropped");
                }
            }
        }
    }

    fn peer_count(&self) -> usize {
        1
    }
}
