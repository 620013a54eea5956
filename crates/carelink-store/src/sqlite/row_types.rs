//! Raw database rows and their conversion to core records.
//!
//! Rows mirror table columns one-to-one. Conversion into the public
//! `carelink_core` records happens here so repositories stay SQL-only.

use carelink_core::{
    AttachmentRef, CaregiverId, Conversation, ConversationId, Message, MessageId, PatientId,
    PatientRecord, UserId,
};

/// Raw row from the `conversations` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationRow {
    /// Conversation ID.
    pub id: String,
    /// Patient ID.
    pub patient_id: String,
    /// Caregiver ID.
    pub caregiver_id: String,
    /// Creation timestamp.
    pub created_at: String,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: ConversationId::from(row.id),
            patient_id: PatientId::from(row.patient_id),
            caregiver_id: CaregiverId::from(row.caregiver_id),
            created_at: row.created_at,
        }
    }
}

/// Raw row from the `messages` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRow {
    /// Message ID.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Per-conversation sequence.
    pub sequence: i64,
    /// Author, null for system messages.
    pub sender_user_id: Option<String>,
    /// Text body.
    pub text: String,
    /// Attachment reference.
    pub attachment_ref: Option<String>,
    /// Read flag.
    pub is_read: bool,
    /// Creation timestamp.
    pub created_at: String,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId::from(row.id),
            conversation_id: ConversationId::from(row.conversation_id),
            sender_user_id: row.sender_user_id.map(UserId::from),
            text: row.text,
            attachment_ref: row.attachment_ref.map(AttachmentRef::new),
            is_read: row.is_read,
            created_at: row.created_at,
            sequence: row.sequence,
        }
    }
}

/// Raw row from the `patients` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientRow {
    /// Patient ID.
    pub id: String,
    /// Owning user account.
    pub user_id: Option<String>,
    /// Display name.
    pub display_name: String,
}

impl From<PatientRow> for PatientRecord {
    fn from(row: PatientRow) -> Self {
        Self {
            id: PatientId::from(row.id),
            user_id: row.user_id.map(UserId::from),
            display_name: row.display_name,
        }
    }
}

/// Raw row from the `caregivers` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaregiverRow {
    /// Caregiver ID.
    pub id: String,
    /// Login account.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
}
