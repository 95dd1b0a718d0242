//! Message model.
//!
//! Two representations exist:
//!
//! | Type | Where | Shape |
//! |------|-------|-------|
//! | [`Envelope`] | on the wire | optional-field bag carrying the [`MARKER`] tag |
//! | [`Message`] | inside a node | sum type, one variant per protocol shape |
//!
//! Routing code only ever matches on [`Message`]. Conversion happens once on
//! the way in ([`Message::try_from`]) and once on the way out
//! ([`Message::into_wire`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RouteError, RouteResult};
use crate::id::{MsgId, NodeId};

/// Field that marks a transport payload as belonging to this protocol.
pub const MARKER: &str = "_scent_";

/// Reserved name of the attach announcement.
pub const READY: &str = "ready";

/// Reserved name of the detach announcement.
pub const SYNC: &str = "sync";

// =============================================================================
// Envelope
// =============================================================================

/// Wire form of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Event or control name.
    pub name: String,
    /// Present iff the message belongs to a request/response exchange.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<MsgId>,
    /// Stamped by the sending node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<NodeId>,
    /// Present iff the message is addressed to one node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Envelope {
    /// Returns `true` if `data` is an object carrying the protocol marker.
    pub fn is_tagged(data: &Value) -> bool {
        data.as_object().is_some_and(|obj| obj.contains_key(MARKER))
    }

    /// Parses a tagged transport payload.
    pub fn from_wire(data: Value) -> RouteResult<Self> {
        Ok(serde_json::from_value(data)?)
    }

    /// Serializes the envelope and adds the marker field.
    pub fn into_wire(self) -> Value {
        let mut obj = Map::new();
        obj.insert("name".into(), Value::String(self.name));
        if let Some(msg_id) = self.msg_id {
            obj.insert("msgId".into(), Value::from(msg_id));
        }
        if let Some(source) = self.source_id {
            obj.insert("sourceId".into(), Value::String(source.to_string()));
        }
        if let Some(target) = self.target_id {
            obj.insert("targetId".into(), Value::String(target.to_string()));
        }
        if let Some(payload) = self.payload {
            obj.insert("payload".into(), payload);
        }
        obj.insert(MARKER.into(), Value::Bool(true));
        Value::Object(obj)
    }
}

// =============================================================================
// Message
// =============================================================================

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A child announces itself to the root.
    Ready { source: NodeId },
    /// A child announces that it is going away.
    Sync { source: NodeId },
    /// Untargeted event with no reply path.
    Broadcast {
        name: String,
        payload: Value,
        source: Option<NodeId>,
    },
    /// Untargeted event whose first handler must reply to `source`.
    Call {
        name: String,
        msg_id: MsgId,
        source: NodeId,
        payload: Value,
    },
    /// Answer to a call, addressed to the node that made it.
    Reply {
        name: String,
        msg_id: MsgId,
        target: NodeId,
        payload: Value,
        source: Option<NodeId>,
    },
}

impl Message {
    /// Creates an untargeted broadcast.
    pub fn broadcast(name: impl Into<String>, payload: Value) -> Self {
        Self::Broadcast {
            name: name.into(),
            payload,
            source: None,
        }
    }

    /// Returns the event or control name.
    pub fn name(&self) -> &str {
        match self {
            Self::Ready { .. } => READY,
            Self::Sync { .. } => SYNC,
            Self::Broadcast { name, .. } | Self::Call { name, .. } | Self::Reply { name, .. } => {
                name
            }
        }
    }

    /// Returns the sender's identifier, if stamped.
    pub fn source(&self) -> Option<&NodeId> {
        match self {
            Self::Ready { source } | Self::Sync { source } | Self::Call { source, .. } => {
                Some(source)
            }
            Self::Broadcast { source, .. } | Self::Reply { source, .. } => source.as_ref(),
        }
    }

    /// Returns the addressee, for targeted messages.
    pub fn target(&self) -> Option<&NodeId> {
        match self {
            Self::Reply { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Returns the call sequence number, for request/response messages.
    pub fn msg_id(&self) -> Option<MsgId> {
        match self {
            Self::Call { msg_id, .. } | Self::Reply { msg_id, .. } => Some(*msg_id),
            _ => None,
        }
    }

    /// Overwrites the sender with `id`.
    pub fn stamp_source(&mut self, id: &NodeId) {
        match self {
            Self::Ready { source } | Self::Sync { source } | Self::Call { source, .. } => {
                source.clone_from(id);
            }
            Self::Broadcast { source, .. } | Self::Reply { source, .. } => {
                *source = Some(id.clone());
            }
        }
    }

    /// Sets the sender to `id` only if none is present.
    pub fn stamp_source_if_missing(&mut self, id: &NodeId) {
        if self.source().is_none() {
            self.stamp_source(id);
        }
    }

    /// Converts into the wire envelope.
    pub fn into_envelope(self) -> Envelope {
        match self {
            Self::Ready { source } => Envelope {
                name: READY.into(),
                msg_id: None,
                source_id: Some(source),
                target_id: None,
                payload: None,
            },
            Self::Sync { source } => Envelope {
                name: SYNC.into(),
                msg_id: None,
                source_id: Some(source),
                target_id: None,
                payload: None,
            },
            Self::Broadcast {
                name,
                payload,
                source,
            } => Envelope {
                name,
                msg_id: None,
                source_id: source,
                target_id: None,
                payload: Some(payload),
            },
            Self::Call {
                name,
                msg_id,
                source,
                payload,
            } => Envelope {
                name,
                msg_id: Some(msg_id),
                source_id: Some(source),
                target_id: None,
                payload: Some(payload),
            },
            Self::Reply {
                name,
                msg_id,
                target,
                payload,
                source,
            } => Envelope {
                name,
                msg_id: Some(msg_id),
                source_id: source,
                target_id: Some(target),
                payload: Some(payload),
            },
        }
    }

    /// Converts into a tagged transport payload.
    pub fn into_wire(self) -> Value {
        self.into_envelope().into_wire()
    }
}

impl TryFrom<Envelope> for Message {
    type Error = RouteError;

    fn try_from(env: Envelope) -> RouteResult<Self> {
        let Envelope {
            name,
            msg_id,
            source_id,
            target_id,
            payload,
        } = env;
        let payload = payload.unwrap_or(Value::Null);

        if name == READY || name == SYNC {
            let source =
                source_id.ok_or_else(|| RouteError::decode(format!("'{name}' without sourceId")))?;
            return Ok(if name == READY {
                Self::Ready { source }
            } else {
                Self::Sync { source }
            });
        }

        match (target_id, msg_id, source_id) {
            (Some(target), Some(msg_id), source) => Ok(Self::Reply {
                name,
                msg_id,
                target,
                payload,
                source,
            }),
            (Some(_), None, _) => Err(RouteError::decode(format!(
                "targeted message '{name}' without msgId"
            ))),
            (None, Some(msg_id), Some(source)) => Ok(Self::Call {
                name,
                msg_id,
                source,
                payload,
            }),
            // Without a sender there is nobody to answer, so it degrades to a
            // plain broadcast.
            (None, _, source) => Ok(Self::Broadcast {
                name,
                payload,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(data: Value) -> RouteResult<Message> {
        Message::try_from(Envelope::from_wire(data)?)
    }

    #[test]
    fn test_wire_carries_marker_and_camel_case_fields() {
        let wire = Message::Call {
            name: "y".into(),
            msg_id: 7,
            source: "a".into(),
            payload: json!({"k": 1}),
        }
        .into_wire();

        assert_eq!(wire[MARKER], json!(true));
        assert_eq!(wire["msgId"], json!(7));
        assert_eq!(wire["sourceId"], json!("a"));
        assert!(wire.get("targetId").is_none());
        assert!(Envelope::is_tagged(&wire));
    }

    #[test]
    fn test_untagged_payloads_are_rejected() {
        assert!(!Envelope::is_tagged(&json!({"name": "x"})));
        assert!(!Envelope::is_tagged(&json!("ready")));
        assert!(!Envelope::is_tagged(&Value::Null));
    }

    #[test]
    fn test_decode_control_messages() {
        let ready = decode(json!({"name": "ready", "sourceId": "n1", MARKER: true})).unwrap();
        assert_eq!(ready, Message::Ready { source: "n1".into() });

        let sync = decode(json!({"name": "sync", "sourceId": "n1", MARKER: true})).unwrap();
        assert_eq!(sync, Message::Sync { source: "n1".into() });

        assert!(decode(json!({"name": "ready", MARKER: true})).is_err());
    }

    #[test]
    fn test_decode_reply_requires_msg_id() {
        let reply = decode(json!({
            "name": "y", "msgId": 3, "targetId": "a", "sourceId": "b",
            "payload": 42, MARKER: true
        }))
        .unwrap();
        assert_eq!(reply.target(), Some(&NodeId::from("a")));
        assert_eq!(reply.msg_id(), Some(3));

        let err = decode(json!({"name": "y", "targetId": "a", MARKER: true})).unwrap_err();
        assert!(matches!(err, RouteError::Decode(_)));
    }

    #[test]
    fn test_targeted_message_without_msg_id_is_rejected() {
        // No variant carries a target without a call id, so nothing is relayed.
        let err = decode(json!({
            "name": "note", "targetId": "b", "sourceId": "a",
            "payload": {"k": 1}, MARKER: true
        }))
        .unwrap_err();
        assert!(matches!(err, RouteError::Decode(msg) if msg.contains("note")));
    }

    #[test]
    fn test_call_without_source_degrades_to_broadcast() {
        let msg = decode(json!({"name": "y", "msgId": 3, MARKER: true})).unwrap();
        assert_eq!(
            msg,
            Message::Broadcast {
                name: "y".into(),
                payload: Value::Null,
                source: None,
            }
        );
    }

    #[test]
    fn test_stamp_source_if_missing_keeps_original_sender() {
        let mut msg = Message::Broadcast {
            name: "x".into(),
            payload: Value::Null,
            source: Some("origin".into()),
        };
        msg.stamp_source_if_missing(&"relay".into());
        assert_eq!(msg.source(), Some(&NodeId::from("origin")));

        let mut fresh = Message::broadcast("x", Value::Null);
        fresh.stamp_source_if_missing(&"hub".into());
        assert_eq!(fresh.source(), Some(&NodeId::from("hub")));
    }
}
