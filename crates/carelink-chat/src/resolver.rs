//! Conversation resolver.
//!
//! Every role and assignment rule of the messaging core lives here. Other
//! components ask the resolver for a [`Conversation`] and never inspect the
//! principal's role themselves.
//!
//! Resolution order for `(principal, patient_id)`:
//!
//! 1. unknown patient: `NotFound`
//! 2. caregiver: must map to a caregiver record that is on the patient's
//!    assignment list, otherwise `Forbidden`
//! 3. patient: must own the patient record, and the patient must have at
//!    least one assigned caregiver; the first one is the counterparty
//! 4. any other role: `Forbidden`
//!
//! The store's `find_or_create` is idempotent under concurrency, so racing
//! resolutions for one pair all observe the same conversation.

use std::sync::Arc;

use carelink_core::traits::{AssignmentRegistry, ConversationStore, PatientDirectory};
use carelink_core::{
    CaregiverId, ChatError, ChatResult, Conversation, ConversationId, PatientId, Principal, Role,
};
use tracing::debug;

/// What a request names when it addresses a conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationTarget {
    /// The conversation with this patient (resolved, created if needed).
    Patient(PatientId),
    /// An existing conversation (participant check only).
    Conversation(ConversationId),
}

/// Finds or creates the unique conversation for an authorised pair.
#[derive(Clone)]
pub struct ConversationResolver {
    directory: Arc<dyn PatientDirectory>,
    assignments: Arc<dyn AssignmentRegistry>,
    conversations: Arc<dyn ConversationStore>,
}

impl ConversationResolver {
    /// Create a resolver over the directory, assignment, and conversation
    /// collaborators.
    pub fn new(
        directory: Arc<dyn PatientDirectory>,
        assignments: Arc<dyn AssignmentRegistry>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            directory,
            assignments,
            conversations,
        }
    }

    /// Authorise `principal` for `patient_id` and return the pair's
    /// conversation, creating it on first use.
    pub async fn resolve(
        &self,
        principal: &Principal,
        patient_id: &PatientId,
    ) -> ChatResult<Conversation> {
        let Some(patient) = self.directory.find_patient(patient_id).await? else {
            return Err(ChatError::NotFound(format!("patient {patient_id}")));
        };

        let caregiver_id = match &principal.role {
            Role::Caregiver => {
                let caregiver = self.caregiver_identity(principal).await?;
                let assigned = self.assignments.assigned_caregivers(patient_id).await?;
                if !assigned.contains(&caregiver) {
                    return Err(ChatError::Forbidden(format!(
                        "caregiver {caregiver} is not assigned to patient {patient_id}"
                    )));
                }
                caregiver
            }
            Role::Patient => {
                if patient.user_id.as_ref() != Some(&principal.user_id) {
                    return Err(ChatError::Forbidden(format!(
                        "user {} is not patient {patient_id}",
                        principal.user_id
                    )));
                }
                let assigned = self.assignments.assigned_caregivers(patient_id).await?;
                let Some(first) = assigned.into_iter().next() else {
                    return Err(ChatError::Forbidden(format!(
                        "patient {patient_id} has no assigned caregiver"
                    )));
                };
                first
            }
            Role::Other(role) => return Err(role_forbidden(role)),
        };

        let conversation = self
            .conversations
            .find_or_create(&caregiver_id, patient_id)
            .await?;
        debug!(
            conversation_id = %conversation.id,
            user_id = %principal.user_id,
            "conversation resolved"
        );
        Ok(conversation)
    }

    /// Resolve a target: by patient through [`Self::resolve`], or by
    /// conversation ID through a participant check.
    pub async fn authorize(
        &self,
        principal: &Principal,
        target: &ConversationTarget,
    ) -> ChatResult<Conversation> {
        match target {
            ConversationTarget::Patient(patient_id) => self.resolve(principal, patient_id).await,
            ConversationTarget::Conversation(conversation_id) => {
                self.authorize_conversation(principal, conversation_id).await
            }
        }
    }

    /// Check that `principal` participates in an existing conversation.
    ///
    /// A caregiver must be the conversation's caregiver and still assigned to
    /// the patient; a patient must own the patient record.
    pub async fn authorize_conversation(
        &self,
        principal: &Principal,
        conversation_id: &ConversationId,
    ) -> ChatResult<Conversation> {
        let Some(conversation) = self.conversations.get(conversation_id).await? else {
            return Err(ChatError::NotFound(format!("conversation {conversation_id}")));
        };

        let allowed = match &principal.role {
            Role::Caregiver => {
                let caregiver = self.caregiver_identity(principal).await?;
                caregiver == conversation.caregiver_id
                    && self
                        .assignments
                        .assigned_caregivers(&conversation.patient_id)
                        .await?
                        .contains(&caregiver)
            }
            Role::Patient => self
                .directory
                .find_patient(&conversation.patient_id)
                .await?
                .is_some_and(|p| p.user_id.as_ref() == Some(&principal.user_id)),
            Role::Other(_) => false,
        };

        if allowed {
            Ok(conversation)
        } else {
            Err(ChatError::Forbidden(format!(
                "user {} is not a participant of conversation {conversation_id}",
                principal.user_id
            )))
        }
    }

    /// Every conversation the principal participates in.
    ///
    /// A caregiver login without a caregiver record has none.
    pub async fn conversations_for(&self, principal: &Principal) -> ChatResult<Vec<Conversation>> {
        match &principal.role {
            Role::Caregiver => {
                match self.directory.caregiver_for_user(&principal.user_id).await? {
                    Some(caregiver) => self.conversations.for_caregiver(&caregiver).await,
                    None => Ok(Vec::new()),
                }
            }
            Role::Patient => {
                let owned = self.directory.patients_for_user(&principal.user_id).await?;
                if owned.is_empty() {
                    return Ok(Vec::new());
                }
                self.conversations.for_patients(&owned).await
            }
            Role::Other(role) => Err(role_forbidden(role)),
        }
    }

    /// Refuse principals whose role takes no part in messaging.
    ///
    /// For operations that are not tied to one conversation, such as
    /// attachment upload.
    pub fn ensure_messaging_role(&self, principal: &Principal) -> ChatResult<()> {
        match &principal.role {
            Role::Caregiver | Role::Patient => Ok(()),
            Role::Other(role) => Err(role_forbidden(role)),
        }
    }

    async fn caregiver_identity(&self, principal: &Principal) -> ChatResult<CaregiverId> {
        self.directory
            .caregiver_for_user(&principal.user_id)
            .await?
            .ok_or_else(|| {
                ChatError::Forbidden(format!(
                    "user {} has no caregiver record",
                    principal.user_id
                ))
            })
    }
}

fn role_forbidden(role: &str) -> ChatError {
    ChatError::Forbidden(format!("role {role} cannot use messaging"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
