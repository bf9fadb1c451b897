//! Wire types for the Chairlink channel.
//!
//! Two closed families of messages travel over a channel:
//!
//! - [`ClientMessage`]: what this client may send to the server.
//! - [`ServerMessage`]: what the server may send to this client.
//!
//! They are deliberately separate enums. A `ping` exists in both, but a
//! `diagnosis_ready` only ever flows inbound, and the outbound contract has
//! no way to express it. Adding a variant to one family never forces the
//! other to change.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Contract;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way a payload is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client → server.
    Outbound,
    /// Server → client.
    Inbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound => write!(f, "outbound"),
            Self::Inbound => write!(f, "inbound"),
        }
    }
}

// ---------------------------------------------------------------------------
// Message: a body plus the timestamp every frame carries
// ---------------------------------------------------------------------------

/// A validated message: the typed body and its timestamp.
///
/// On the wire the body's fields (including its `type` tag) and the
/// `timestamp` sit side by side in one flat object:
///
/// ```text
/// { "type": "subscribe", "topic": "schedule", "timestamp": "2024-05-01T09:30:00.000Z" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message<B> {
    /// The typed payload, discriminated by `type`.
    #[serde(flatten)]
    pub body: B,

    /// When the message was created (RFC 3339 / ISO-8601 on the wire).
    pub timestamp: DateTime<Utc>,
}

impl<B> Message<B> {
    /// Wraps a body, stamping it with the current time.
    pub fn new(body: B) -> Self {
        Self::at(body, Utc::now())
    }

    /// Wraps a body with an explicit timestamp.
    pub fn at(body: B, timestamp: DateTime<Utc>) -> Self {
        Self { body, timestamp }
    }
}

impl<B: Contract> Message<B> {
    /// The `type` discriminator of the body.
    pub fn message_type(&self) -> &'static str {
        self.body.message_type()
    }
}

/// A message received from the server.
pub type InboundMessage = Message<ServerMessage>;

/// A message sent to the server.
pub type OutboundMessage = Message<ClientMessage>;

// ---------------------------------------------------------------------------
// ClientMessage: outbound family
// ---------------------------------------------------------------------------

/// Messages the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive probe. The server answers with `pong`.
    Ping,

    /// Start receiving server messages published on `topic`
    /// (e.g. `"schedule"`, `"patient:1234"`).
    Subscribe { topic: String },

    /// Stop receiving messages for `topic`.
    Unsubscribe { topic: String },

    /// A prompt for the clinical assistant within a conversation.
    AssistantQuery { session_id: String, prompt: String },
}

impl Contract for ClientMessage {
    const DIRECTION: Direction = Direction::Outbound;
    const TYPES: &'static [&'static str] =
        &["ping", "subscribe", "unsubscribe", "assistant_query"];

    fn message_type(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::AssistantQuery { .. } => "assistant_query",
        }
    }
}

// ---------------------------------------------------------------------------
// ServerMessage: inbound family
// ---------------------------------------------------------------------------

/// Messages the server sends to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Server-initiated keep-alive probe.
    Ping,

    /// Answer to a client `ping`.
    Pong,

    /// Sent once after the connection is accepted.
    Connected { client_id: String },

    /// Confirms a `subscribe`.
    Subscribed { topic: String },

    /// A user-facing notification.
    Notification {
        title: String,
        body: String,
        /// Severity hint such as `"info"` or `"warning"`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        level: Option<String>,
    },

    /// An analysis for a patient finished and can be fetched.
    DiagnosisReady {
        patient_id: String,
        diagnosis_id: String,
    },

    /// A (possibly partial) answer from the clinical assistant.
    /// `done` marks the last chunk of a streamed answer.
    AssistantResponse {
        session_id: String,
        content: String,
        #[serde(default)]
        done: bool,
    },

    /// The server rejected something this client did.
    Error { code: u16, message: String },
}

impl Contract for ServerMessage {
    const DIRECTION: Direction = Direction::Inbound;
    const TYPES: &'static [&'static str] = &[
        "ping",
        "pong",
        "connected",
        "subscribed",
        "notification",
        "diagnosis_ready",
        "assistant_response",
        "error",
    ];

    fn message_type(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Connected { .. } => "connected",
            Self::Subscribed { .. } => "subscribed",
            Self::Notification { .. } => "notification",
            Self::DiagnosisReady { .. } => "diagnosis_ready",
            Self::AssistantResponse { .. } => "assistant_response",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    //! The wire shapes here are what the server expects byte-for-byte, so
    //! the tests check JSON layout rather than round-tripping.

    use chrono::TimeZone;
    use serde_json::{Value, json};

    use super::*;

    fn all_client_messages() -> Vec<ClientMessage> {
        vec![
            ClientMessage::Ping,
            ClientMessage::Subscribe {
                topic: "schedule".into(),
            },
            ClientMessage::Unsubscribe {
                topic: "schedule".into(),
            },
            ClientMessage::AssistantQuery {
                session_id: "s-1".into(),
                prompt: "summarize chart".into(),
            },
        ]
    }

    fn all_server_messages() -> Vec<ServerMessage> {
        vec![
            ServerMessage::Ping,
            ServerMessage::Pong,
            ServerMessage::Connected {
                client_id: "c-9".into(),
            },
            ServerMessage::Subscribed {
                topic: "schedule".into(),
            },
            ServerMessage::Notification {
                title: "Reminder".into(),
                body: "Recall list updated".into(),
                level: None,
            },
            ServerMessage::DiagnosisReady {
                patient_id: "p-1".into(),
                diagnosis_id: "d-7".into(),
            },
            ServerMessage::AssistantResponse {
                session_id: "s-1".into(),
                content: "No caries detected.".into(),
                done: true,
            },
            ServerMessage::Error {
                code: 403,
                message: "forbidden".into(),
            },
        ]
    }

    // =====================================================================
    // Type lists stay in step with the enums
    // =====================================================================

    #[test]
    fn test_client_types_cover_every_variant() {
        let messages = all_client_messages();
        assert_eq!(messages.len(), ClientMessage::TYPES.len());
        for msg in &messages {
            assert!(ClientMessage::TYPES.contains(&msg.message_type()));
            let json = serde_json::to_value(msg).unwrap();
            assert_eq!(json["type"], msg.message_type());
        }
    }

    #[test]
    fn test_server_types_cover_every_variant() {
        let messages = all_server_messages();
        assert_eq!(messages.len(), ServerMessage::TYPES.len());
        for msg in &messages {
            assert!(ServerMessage::TYPES.contains(&msg.message_type()));
            let json = serde_json::to_value(msg).unwrap();
            assert_eq!(json["type"], msg.message_type());
        }
    }

    #[test]
    fn test_families_are_independent_sets() {
        assert!(!ClientMessage::TYPES.contains(&"diagnosis_ready"));
        assert!(!ServerMessage::TYPES.contains(&"assistant_query"));
        // `ping` is allowed both ways, independently.
        assert!(ClientMessage::TYPES.contains(&"ping"));
        assert!(ServerMessage::TYPES.contains(&"ping"));
    }

    // =====================================================================
    // JSON shapes
    // =====================================================================

    #[test]
    fn test_unit_variant_is_just_the_tag() {
        let json = serde_json::to_value(ClientMessage::Ping).unwrap();
        assert_eq!(json, json!({"type": "ping"}));
    }

    #[test]
    fn test_assistant_query_uses_snake_case_tag() {
        let msg = ClientMessage::AssistantQuery {
            session_id: "s-1".into(),
            prompt: "hi".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "assistant_query");
        assert_eq!(json["session_id"], "s-1");
        assert_eq!(json["prompt"], "hi");
    }

    #[test]
    fn test_notification_level_is_optional() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "notification",
            "title": "t",
            "body": "b"
        }))
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::Notification {
                title: "t".into(),
                body: "b".into(),
                level: None,
            }
        );

        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("level").is_none());
    }

    #[test]
    fn test_assistant_response_done_defaults_to_false() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "assistant_response",
            "session_id": "s",
            "content": "partial"
        }))
        .unwrap();
        assert!(matches!(
            msg,
            ServerMessage::AssistantResponse { done: false, .. }
        ));
    }

    #[test]
    fn test_message_flattens_body_next_to_timestamp() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let msg = Message::at(
            ClientMessage::Subscribe {
                topic: "schedule".into(),
            },
            timestamp,
        );
        let json: Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "subscribe");
        assert_eq!(json["topic"], "schedule");
        assert_eq!(json["timestamp"], "2024-05-01T09:30:00Z");
        assert_eq!(msg.message_type(), "subscribe");
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::Outbound.to_string(), "outbound");
        assert_eq!(Direction::Inbound.to_string(), "inbound");
    }
}
