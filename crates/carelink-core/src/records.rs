//! Conversation and message records.
//!
//! These are the shapes exchanged between the store, the chat core, and the
//! transports. Wire JSON is camelCase.

use serde::{Deserialize, Serialize};

use crate::errors::{ChatError, ChatResult};
use crate::ids::{CaregiverId, ConversationId, MessageId, PatientId, UserId};

/// Stable reference to a stored attachment (relative path or URL).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentRef(String);

impl AttachmentRef {
    /// Wrap a reference returned by an attachment service.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<AttachmentRef> for String {
    fn from(r: AttachmentRef) -> Self {
        r.0
    }
}

/// The single permitted channel between one caregiver and one patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Server-generated ID.
    pub id: ConversationId,
    /// Patient side.
    pub patient_id: PatientId,
    /// Caregiver side.
    pub caregiver_id: CaregiverId,
    /// Creation time (RFC 3339, microseconds).
    pub created_at: String,
}

/// An immutable communication event inside a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-generated ID.
    pub id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author. `None` marks a system message.
    pub sender_user_id: Option<UserId>,
    /// Text body, possibly empty.
    pub text: String,
    /// Optional attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<AttachmentRef>,
    /// Flips false→true once, via mark-read.
    pub is_read: bool,
    /// Server timestamp, strictly increasing per conversation.
    pub created_at: String,
    /// Per-conversation persistence order, starting at 1.
    #[serde(skip)]
    pub sequence: i64,
}

/// A validated message ready to be persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMessage {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Author (`None` for system messages).
    pub sender_user_id: Option<UserId>,
    /// Normalised text body.
    pub text: String,
    /// Optional attachment.
    pub attachment_ref: Option<AttachmentRef>,
}

/// Raw send input as it arrives from a transport.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    /// Text body.
    #[serde(default)]
    pub text: Option<String>,
    /// Attachment reference previously returned by the attachment service.
    #[serde(default)]
    pub attachment_ref: Option<String>,
}

impl MessageDraft {
    /// Draft with text only.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachment_ref: None,
        }
    }

    /// Trim and validate the draft.
    ///
    /// Whitespace-only values count as absent. At least one of text and
    /// attachment must remain, and text may not exceed `max_text_chars`.
    pub fn normalize(&self, max_text_chars: usize) -> ChatResult<(String, Option<AttachmentRef>)> {
        let text = self.text.as_deref().map(str::trim).unwrap_or_default();
        let attachment = self
            .attachment_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(AttachmentRef::new);

        if text.is_empty() && attachment.is_none() {
            return Err(ChatError::Validation(
                "message requires text or an attachment".into(),
            ));
        }
        let chars = text.chars().count();
        if chars > max_text_chars {
            return Err(ChatError::Validation(format!(
                "text is {chars} characters, limit is {max_text_chars}"
            )));
        }
        Ok((text.to_owned(), attachment))
    }
}

/// One entry of a conversation list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// The conversation.
    pub conversation: Conversation,
    /// Most recent message, if any.
    pub last_message: Option<Message>,
    /// Messages from the counterparty not yet read by the viewer.
    pub unread_count: u64,
}

/// Directory entry for a patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    /// Patient ID.
    pub id: PatientId,
    /// Owning user account, if the patient has a login.
    pub user_id: Option<UserId>,
    /// Display name.
    pub display_name: String,
}

/// Page request for history reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Canonical RFC 3339 cutoff; only strictly older messages are returned.
    pub before: Option<String>,
    /// Maximum number of messages.
    pub limit: u32,
}
