//! Server-pushed events.
//!
//! Events share one envelope: `{type, conversationId?, timestamp, data}`.
//! They are encoded once and the same `Arc<String>` is handed to every
//! recipient.

use std::sync::Arc;

use carelink_core::time::now_micros;
use carelink_core::{ConnectionId, ConversationId, Message, Principal, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

/// A new message was persisted in a conversation.
pub const MESSAGE_RECEIVED: &str = "message.received";
/// A participant marked the conversation read.
pub const CONVERSATION_READ: &str = "conversation.read";
/// Sent once after a connection is admitted.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";

/// Envelope for every server-pushed event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    /// Event type, e.g. `message.received`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Conversation the event belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    /// When the event was produced.
    pub timestamp: String,
    /// Event payload.
    pub data: Value,
}

impl ChatEvent {
    fn new(event_type: &str, conversation_id: Option<ConversationId>, data: Value) -> Self {
        Self {
            event_type: event_type.to_owned(),
            conversation_id,
            timestamp: now_micros(),
            data,
        }
    }

    /// `message.received` carrying the full message.
    pub fn message_received(message: &Message) -> Self {
        Self::new(
            MESSAGE_RECEIVED,
            Some(message.conversation_id.clone()),
            json!({ "message": message }),
        )
    }

    /// `conversation.read` after `reader` flipped `count` messages.
    pub fn conversation_read(conversation_id: &ConversationId, reader: &UserId, count: u64) -> Self {
        Self::new(
            CONVERSATION_READ,
            Some(conversation_id.clone()),
            json!({
                "conversationId": conversation_id,
                "readerUserId": reader,
                "count": count,
            }),
        )
    }

    /// `connection.established` for a freshly admitted connection.
    pub fn connection_established(
        client_id: &ConnectionId,
        principal: &Principal,
        conversation_id: Option<&ConversationId>,
    ) -> Self {
        let mut data = json!({
            "clientId": client_id,
            "userId": principal.user_id,
            "role": principal.role,
        });
        if let Some(conv) = conversation_id {
            data["conversationId"] = json!(conv);
        }
        Self::new(CONNECTION_ESTABLISHED, conversation_id.cloned(), data)
    }

    /// Serialize once for fan-out.
    pub fn encode(&self) -> Option<Arc<String>> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Arc::new(json)),
            Err(e) => {
                warn!(event_type = self.event_type, error = %e, "failed to serialize event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink_core::MessageId;

    fn message() -> Message {
        Message {
            id: MessageId::from("msg_1"),
            conversation_id: ConversationId::from("conv_1"),
            sender_user_id: Some(UserId::from("u-p1")),
            text: "Hello".into(),
            attachment_ref: None,
            is_read: false,
            created_at: "2026-10-15T09:30:00.000000Z".into(),
            sequence: 1,
        }
    }

    #[test]
    fn message_received_envelope() {
        let event = ChatEvent::message_received(&message());
        let value: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "message.received");
        assert_eq!(value["conversationId"], "conv_1");
        assert_eq!(value["data"]["message"]["senderUserId"], "u-p1");
        assert_eq!(value["data"]["message"]["isRead"], false);
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn conversation_read_payload() {
        let event = ChatEvent::conversation_read(
            &ConversationId::from("conv_9"),
            &UserId::from("u-c1"),
            3,
        );
        assert_eq!(event.data["readerUserId"], "u-c1");
        assert_eq!(event.data["count"], 3);
        assert_eq!(event.conversation_id.as_deref(), Some("conv_9"));
    }

    #[test]
    fn established_omits_conversation_when_unbound() {
        let principal = Principal::caregiver("u-c1");
        let event =
            ChatEvent::connection_established(&ConnectionId::from("conn_1"), &principal, None);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["role"], "caregiver");
        assert!(value.get("conversationId").is_none());
        assert!(value["data"].get("conversationId").is_none());
    }

    #[test]
    fn established_carries_bound_conversation() {
        let principal = Principal::patient("u-p1");
        let conv = ConversationId::from("conv_2");
        let event = ChatEvent::connection_established(
            &ConnectionId::from("conn_1"),
            &principal,
            Some(&conv),
        );
        assert_eq!(event.data["conversationId"], "conv_2");
        assert_eq!(event.data["clientId"], "conn_1");
    }
}
