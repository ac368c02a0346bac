//! Event feed frames.
//!
//! The backend pushes JSON text frames tagged by `type`. Chat messages arrive
//! in one of two shapes:
//!
//! - legacy: `{"type": "message", "message": {...}}`
//! - canonical: `{"type": "message_received", "room_id": ..., "message": {...}}`
//!
//! [`InboundFrame`] decodes either shape and [`InboundFrame::normalize`] maps
//! both onto [`FeedEvent`]. Canonical frames pass through unchanged, including
//! message fields this crate does not model.

use crate::Post;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Backend identifier. The backend is not consistent about sending numbers or
/// strings, so both are kept as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Int(i64),
    Text(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(n) => write!(f, "{n}"),
            Id::Text(s) => f.write_str(s),
        }
    }
}

/// A chat message in canonical form.
///
/// The optional fields distinguish absent (`None`) from an explicit `null`
/// (`Some(None)`) so a frame re-encodes to exactly what was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Id,
    pub room_id: Id,
    pub sender_id: Id,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub sender_name: Option<Option<String>>,
    pub content: String,
    /// Timestamp as sent by the backend.
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn sender_name(&self) -> Option<&str> {
        self.sender_name.as_ref()?.as_deref()
    }

    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_ref()?.as_deref()
    }
}

/// A field that was present, possibly as `null`. Absent fields never reach
/// this and fall back to `None` through `#[serde(default)]`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Canonical feed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    /// A chat message was posted to a room.
    MessageReceived {
        room_id: Id,
        message: ChatMessage,
        /// Top-level fields beyond the ones above, kept as received.
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Someone started or stopped typing.
    Typing {
        room_id: Id,
        user_id: Id,
        #[serde(default)]
        is_typing: bool,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// A post changed (status, content, schedule).
    PostUpdated { post: Post },
    PostDeleted { post_id: u64 },
    /// Profile or assignment data of a user changed.
    UserDataChanged {
        user_id: Id,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        changes: Map<String, Value>,
    },
    /// Server-side error report.
    Error { message: String },
}

impl FeedEvent {
    /// Decode a text frame in either shape and normalize it.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        InboundFrame::decode(text).map(InboundFrame::normalize)
    }

    /// The chat room this event belongs to, if any.
    pub fn room_id(&self) -> Option<&Id> {
        match self {
            FeedEvent::MessageReceived { room_id, .. } | FeedEvent::Typing { room_id, .. } => {
                Some(room_id)
            }
            _ => None,
        }
    }
}

/// A decoded inbound frame, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Legacy(LegacyFrame),
    Canonical(FeedEvent),
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?;

        if kind == "message" {
            return Ok(InboundFrame::Legacy(serde_json::from_value(value)?));
        }

        serde_json::from_value(value)
            .map(InboundFrame::Canonical)
            .map_err(FrameError::from)
    }

    /// Map the frame onto its canonical event.
    pub fn normalize(self) -> FeedEvent {
        match self {
            InboundFrame::Canonical(event) => event,
            InboundFrame::Legacy(LegacyFrame { room_id, message }) => FeedEvent::MessageReceived {
                room_id: room_id.clone(),
                message: ChatMessage {
                    id: message.id,
                    room_id,
                    sender_id: message.sender_id,
                    sender_name: message.sender_name.map(Some),
                    content: message.content,
                    created_at: message.created_at.map(Some),
                    extra: message.extra,
                },
                extra: Map::new(),
            },
        }
    }
}

/// A legacy `{"type": "message"}` frame with its room and sender resolved.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawLegacyFrame")]
pub struct LegacyFrame {
    pub room_id: Id,
    pub message: LegacyMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyMessage {
    pub id: Id,
    pub content: String,
    pub sender_id: Id,
    pub sender_name: Option<String>,
    pub created_at: Option<String>,
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawLegacyFrame {
    room_id: Option<Id>,
    message: RawLegacyMessage,
}

#[derive(Deserialize)]
struct RawLegacyMessage {
    id: Id,
    content: Option<String>,
    text: Option<String>,
    sender: Option<LegacySender>,
    sender_id: Option<Id>,
    sender_name: Option<String>,
    room_id: Option<Id>,
    room: Option<Id>,
    created_at: Option<String>,
    timestamp: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Legacy senders are either a bare id or a small user object.
#[derive(Deserialize)]
#[serde(untagged)]
enum LegacySender {
    User {
        id: Id,
        #[serde(alias = "name")]
        username: Option<String>,
    },
    Id(Id),
}

impl TryFrom<RawLegacyFrame> for LegacyFrame {
    type Error = FrameError;

    fn try_from(raw: RawLegacyFrame) -> Result<Self, Self::Error> {
        let msg = raw.message;
        let room_id = raw
            .room_id
            .or(msg.room_id)
            .or(msg.room)
            .ok_or(FrameError::MissingRoom)?;
        let content = msg.content.or(msg.text).ok_or(FrameError::MissingContent)?;

        let (sender_id, sender_username) = match (msg.sender_id, msg.sender) {
            (Some(id), Some(LegacySender::User { username, .. })) => (id, username),
            (Some(id), _) => (id, None),
            (None, Some(LegacySender::User { id, username })) => (id, username),
            (None, Some(LegacySender::Id(id))) => (id, None),
            (None, None) => return Err(FrameError::MissingSender),
        };

        Ok(LegacyFrame {
            room_id,
            message: LegacyMessage {
                id: msg.id,
                content,
                sender_id,
                sender_name: msg.sender_name.or(sender_username),
                created_at: msg.created_at.or(msg.timestamp),
                extra: msg.extra,
            },
        })
    }
}

/// Commands the client sends on the chat socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatCommand {
    SendMessage { room_id: Id, content: String },
    Typing { room_id: Id, is_typing: bool },
    MarkRead { room_id: Id, message_id: Id },
}

/// Error decoding an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("legacy message frame has no room id")]
    MissingRoom,
    #[error("legacy message frame has no sender")]
    MissingSender,
    #[error("legacy message frame has no text")]
    MissingContent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_frame_is_normalized() {
        let text = json!({
            "type": "message",
            "message": {
                "id": 42,
                "text": "hello",
                "sender": {"id": 7, "username": "ana"},
                "room": 3,
                "timestamp": "2026-02-01T10:00:00Z",
                "is_read": false
            }
        })
        .to_string();

        let event = FeedEvent::decode(&text).unwrap();
        let FeedEvent::MessageReceived { room_id, message, .. } = event else {
            panic!("expected message_received");
        };
        assert_eq!(room_id, Id::Int(3));
        assert_eq!(message.id, Id::Int(42));
        assert_eq!(message.room_id, Id::Int(3));
        assert_eq!(message.sender_id, Id::Int(7));
        assert_eq!(message.sender_name(), Some("ana"));
        assert_eq!(message.content, "hello");
        assert_eq!(message.created_at(), Some("2026-02-01T10:00:00Z"));
        assert_eq!(message.extra["is_read"], false);
    }

    #[test]
    fn legacy_frame_room_at_top_level() {
        let text = json!({
            "type": "message",
            "room_id": "general",
            "message": {"id": "m1", "content": "hi", "sender_id": 9}
        })
        .to_string();

        let event = FeedEvent::decode(&text).unwrap();
        assert_eq!(event.room_id(), Some(&Id::Text("general".into())));
    }

    #[test]
    fn legacy_frame_without_room_is_rejected() {
        let text = json!({
            "type": "message",
            "message": {"id": 1, "content": "hi", "sender_id": 9}
        })
        .to_string();
        assert!(InboundFrame::decode(&text).is_err());
    }

    #[test]
    fn canonical_frame_passes_through() {
        let frame = json!({
            "type": "message_received",
            "room_id": 3,
            "message": {
                "id": 42,
                "room_id": 3,
                "sender_id": 7,
                "sender_name": "ana",
                "content": "hello",
                "created_at": "2026-02-01T10:00:00.000Z",
                "attachments": [{"url": "https://cdn.example/a.png"}]
            }
        });

        let event = InboundFrame::from_value(frame.clone()).unwrap().normalize();
        assert_eq!(serde_json::to_value(&event).unwrap(), frame);
    }

    #[test]
    fn canonical_nulls_and_unknown_keys_survive() {
        let frame = json!({
            "type": "message_received",
            "room_id": 3,
            "timestamp": "2026-01-01T00:00:00Z",
            "message": {
                "id": 1,
                "room_id": 3,
                "sender_id": 7,
                "sender_name": null,
                "content": "hi",
                "created_at": null
            }
        });

        let event = InboundFrame::from_value(frame.clone()).unwrap().normalize();
        assert_eq!(serde_json::to_value(&event).unwrap(), frame);

        let FeedEvent::MessageReceived { message, .. } = event else {
            panic!("expected message_received");
        };
        assert_eq!(message.sender_name, Some(None));
        assert_eq!(message.sender_name(), None);
    }

    #[test]
    fn typing_keeps_unknown_keys() {
        let frame = json!({"type": "typing", "room_id": 3, "user_id": 7, "is_typing": true, "seq": 12});
        let event = InboundFrame::from_value(frame.clone()).unwrap().normalize();
        assert_eq!(serde_json::to_value(&event).unwrap(), frame);
    }

    #[test]
    fn legacy_frame_with_both_text_and_content() {
        let text = json!({
            "type": "message",
            "room_id": 3,
            "message": {
                "id": 1,
                "text": "old",
                "content": "new",
                "sender_id": 7,
                "room": 3,
                "timestamp": "2026-01-01T00:00:00Z",
                "created_at": "2026-01-01T00:00:01Z"
            }
        })
        .to_string();

        let FeedEvent::MessageReceived { message, .. } = FeedEvent::decode(&text).unwrap() else {
            panic!("expected message_received");
        };
        assert_eq!(message.content, "new");
        assert_eq!(message.created_at(), Some("2026-01-01T00:00:01Z"));
    }

    #[test]
    fn legacy_frame_without_text_is_rejected() {
        let text = json!({
            "type": "message",
            "room_id": 3,
            "message": {"id": 1, "sender_id": 7}
        })
        .to_string();
        assert!(matches!(
            InboundFrame::decode(&text),
            Err(FrameError::Json(_))
        ));
    }

    #[test]
    fn normalization_is_idempotent() {
        let legacy = json!({
            "type": "message",
            "message": {"id": 1, "text": "x", "sender": 2, "room_id": 5}
        });
        let once = InboundFrame::from_value(legacy).unwrap().normalize();
        let encoded = serde_json::to_value(&once).unwrap();
        let twice = InboundFrame::from_value(encoded.clone()).unwrap().normalize();

        assert_eq!(once, twice);
        assert_eq!(serde_json::to_value(&twice).unwrap(), encoded);
    }

    #[test]
    fn post_updated_event() {
        let text = json!({
            "type": "post_updated",
            "post": {"id": 11, "status": "pending", "is_client_approved": true}
        })
        .to_string();
        let FeedEvent::PostUpdated { post } = FeedEvent::decode(&text).unwrap() else {
            panic!("expected post_updated");
        };
        assert_eq!(post.id, 11);
        assert!(post.is_client_approved);
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(FeedEvent::decode(r#"{"type":"presence","user":1}"#).is_err());
        assert!(matches!(
            FeedEvent::decode(r#"{"room_id":1}"#),
            Err(FrameError::MissingType)
        ));
    }

    #[test]
    fn chat_command_wire_shape() {
        let cmd = ChatCommand::SendMessage {
            room_id: Id::Int(3),
            content: "hi".into(),
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"type": "send_message", "room_id": 3, "content": "hi"})
        );
    }
}
