//! Collaborator seams consumed by the chat core.
//!
//! The core never talks to a database, a token verifier, or a filesystem
//! directly; it goes through these traits. `carelink-store`,
//! `carelink-auth`, and `carelink-chat::attachments` provide the production
//! implementations. All implementations must be `Send + Sync` because the
//! core shares them across connection tasks.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::ChatResult;
use crate::ids::{CaregiverId, ConversationId, PatientId, UserId};
use crate::records::{AttachmentRef, Conversation, HistoryQuery, Message, NewMessage, PatientRecord};
use crate::roles::Principal;

/// Verifies a bearer credential.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Return the verified principal, or `ChatError::Authentication`.
    async fn authenticate(&self, credential: &str) -> ChatResult<Principal>;
}

/// Read-only patient and caregiver directory.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    /// Look up a patient record.
    async fn find_patient(&self, patient_id: &PatientId) -> ChatResult<Option<PatientRecord>>;

    /// Map a caregiver user account to its caregiver identity.
    async fn caregiver_for_user(&self, user_id: &UserId) -> ChatResult<Option<CaregiverId>>;

    /// Patient records owned by a user account.
    async fn patients_for_user(&self, user_id: &UserId) -> ChatResult<Vec<PatientId>>;
}

/// Source of truth for which caregivers may talk to a patient.
#[async_trait]
pub trait AssignmentRegistry: Send + Sync {
    /// Caregivers assigned to the patient, in assignment order.
    async fn assigned_caregivers(&self, patient_id: &PatientId) -> ChatResult<Vec<CaregiverId>>;
}

/// Conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Return the conversation for the pair, creating it if absent.
    ///
    /// Must be idempotent under concurrent calls for the same pair.
    async fn find_or_create(
        &self,
        caregiver_id: &CaregiverId,
        patient_id: &PatientId,
    ) -> ChatResult<Conversation>;

    /// Fetch a conversation by ID.
    async fn get(&self, conversation_id: &ConversationId) -> ChatResult<Option<Conversation>>;

    /// All conversations of a caregiver.
    async fn for_caregiver(&self, caregiver_id: &CaregiverId) -> ChatResult<Vec<Conversation>>;

    /// All conversations of the given patients.
    async fn for_patients(&self, patient_ids: &[PatientId]) -> ChatResult<Vec<Conversation>>;
}

/// Message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning ID, sequence, and a strictly increasing
    /// `createdAt`. The write is a single atomic transaction.
    async fn insert_message(&self, message: NewMessage) -> ChatResult<Message>;

    /// Messages newest first, strictly older than `query.before` if set.
    async fn history(
        &self,
        conversation_id: &ConversationId,
        query: &HistoryQuery,
    ) -> ChatResult<Vec<Message>>;

    /// Mark every unread message not authored by `viewer` as read.
    /// Returns how many messages changed.
    async fn mark_read(&self, conversation_id: &ConversationId, viewer: &UserId) -> ChatResult<u64>;

    /// Unread messages not authored by `viewer`.
    async fn count_unread(&self, conversation_id: &ConversationId, viewer: &UserId)
    -> ChatResult<u64>;

    /// Most recent message in the conversation.
    async fn last_message(&self, conversation_id: &ConversationId) -> ChatResult<Option<Message>>;
}

/// Stores uploaded attachment bytes.
#[async_trait]
pub trait AttachmentService: Send + Sync {
    /// Persist the payload and return a stable reference to it.
    async fn store(&self, payload: Bytes, content_type: &str) -> ChatResult<AttachmentRef>;
}
