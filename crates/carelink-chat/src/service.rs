//! The facade transports call.
//!
//! [`ChatService`] wires the gate, resolver, registry, pipeline, and read
//! state together over one set of collaborators. WebSocket and REST adapters
//! hold an `Arc<ChatService>` and nothing else from this crate, so both
//! transports share one authorization path.

use std::sync::Arc;

use bytes::Bytes;
use carelink_core::traits::{
    AssignmentRegistry, AttachmentService, ConversationStore, IdentityService, MessageStore,
    PatientDirectory,
};
use carelink_core::{
    AttachmentRef, ChatError, ChatResult, ConnectionId, Conversation, ConversationId,
    ConversationSummary, HistoryQuery, Message, MessageDraft, PatientId, Principal, time,
};
use tracing::debug;

use crate::gate::IdentityGate;
use crate::pipeline::MessagePipeline;
use crate::read_state::ReadStateAggregator;
use crate::registry::{ConnectionRegistry, RegistryError};
use crate::resolver::{ConversationResolver, ConversationTarget};

/// Limits applied by the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// Maximum text length in characters.
    pub max_text_chars: usize,
    /// History page size when the caller gives none.
    pub history_default_limit: u32,
    /// Upper bound for history page size.
    pub history_max_limit: u32,
    /// Live connection limit; 0 is unlimited.
    pub max_connections: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 4000,
            history_default_limit: 50,
            history_max_limit: 100,
            max_connections: 0,
        }
    }
}

/// External collaborators.
#[derive(Clone)]
pub struct ChatDeps {
    /// Credential verification.
    pub identity: Arc<dyn IdentityService>,
    /// Patient and caregiver records.
    pub directory: Arc<dyn PatientDirectory>,
    /// Patient → caregivers.
    pub assignments: Arc<dyn AssignmentRegistry>,
    /// Conversation persistence.
    pub conversations: Arc<dyn ConversationStore>,
    /// Message persistence.
    pub messages: Arc<dyn MessageStore>,
    /// Attachment bytes.
    pub attachments: Arc<dyn AttachmentService>,
}

/// The messaging core behind every transport.
pub struct ChatService {
    gate: IdentityGate,
    resolver: ConversationResolver,
    registry: Arc<ConnectionRegistry>,
    pipeline: MessagePipeline,
    reads: ReadStateAggregator,
    messages: Arc<dyn MessageStore>,
    attachments: Arc<dyn AttachmentService>,
    config: ChatConfig,
}

impl ChatService {
    /// Wire the core over its collaborators.
    pub fn new(deps: ChatDeps, config: ChatConfig) -> Self {
        let resolver =
            ConversationResolver::new(deps.directory, deps.assignments, deps.conversations);
        let registry = Arc::new(ConnectionRegistry::with_capacity(config.max_connections));
        let pipeline = MessagePipeline::new(
            resolver.clone(),
            Arc::clone(&deps.messages),
            Arc::clone(&registry),
            config.max_text_chars,
        );
        let reads = ReadStateAggregator::new(
            resolver.clone(),
            Arc::clone(&deps.messages),
            Arc::clone(&registry),
        );
        Self {
            gate: IdentityGate::new(deps.identity),
            resolver,
            registry,
            pipeline,
            reads,
            messages: deps.messages,
            attachments: deps.attachments,
            config,
        }
    }

    /// Limits in effect.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// The live connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Verify a credential (optionally `Bearer`-prefixed).
    pub async fn authenticate(&self, credential: Option<&str>) -> ChatResult<Principal> {
        self.gate.authenticate(credential).await
    }

    /// Resolve the conversation with `patient_id` without joining it.
    pub async fn resolve(
        &self,
        principal: &Principal,
        patient_id: &PatientId,
    ) -> ChatResult<Conversation> {
        self.resolver.resolve(principal, patient_id).await
    }

    /// Resolve the conversation with `patient_id` and bind the connection to
    /// it. The principal is the one the connection was admitted with.
    pub async fn join(
        &self,
        connection_id: &ConnectionId,
        principal: &Principal,
        patient_id: &PatientId,
    ) -> ChatResult<Conversation> {
        let conversation = self.resolver.resolve(principal, patient_id).await?;
        let _ = self
            .registry
            .join(connection_id, &conversation.id)
            .map_err(registry_error)?;
        Ok(conversation)
    }

    /// Unbind a connection from a conversation.
    pub fn leave(
        &self,
        connection_id: &ConnectionId,
        conversation_id: &ConversationId,
    ) -> ChatResult<bool> {
        self.registry
            .leave(connection_id, conversation_id)
            .map_err(registry_error)
    }

    /// Send a message to the conversation with `patient_id`.
    pub async fn send(
        &self,
        principal: &Principal,
        patient_id: &PatientId,
        draft: &MessageDraft,
    ) -> ChatResult<Message> {
        self.pipeline.send(principal, patient_id, draft).await
    }

    /// A page of history, newest first.
    ///
    /// `limit` defaults to the configured default and is clamped to
    /// `[1, history_max_limit]`. `before` must be an RFC 3339 timestamp.
    pub async fn history(
        &self,
        principal: &Principal,
        patient_id: &PatientId,
        limit: Option<u32>,
        before: Option<&str>,
    ) -> ChatResult<Vec<Message>> {
        let before = before
            .map(|raw| {
                time::normalize(raw).ok_or_else(|| {
                    ChatError::Validation(format!("before is not an RFC 3339 timestamp: {raw}"))
                })
            })
            .transpose()?;
        let limit = limit
            .unwrap_or(self.config.history_default_limit)
            .clamp(1, self.config.history_max_limit.max(1));

        let conversation = self.resolver.resolve(principal, patient_id).await?;
        let page = self
            .messages
            .history(&conversation.id, &HistoryQuery { before, limit })
            .await?;
        debug!(conversation_id = %conversation.id, limit, returned = page.len(), "history");
        Ok(page)
    }

    /// Mark counterparty messages read; returns how many flipped.
    pub async fn mark_read(
        &self,
        principal: &Principal,
        target: &ConversationTarget,
    ) -> ChatResult<u64> {
        self.reads.mark_read(principal, target).await
    }

    /// Unread counterparty messages.
    pub async fn unread_count(
        &self,
        principal: &Principal,
        target: &ConversationTarget,
    ) -> ChatResult<u64> {
        self.reads.unread_count(principal, target).await
    }

    /// Conversation summaries, most recent activity first.
    pub async fn list_conversations(
        &self,
        principal: &Principal,
    ) -> ChatResult<Vec<ConversationSummary>> {
        self.reads.list_conversations(principal).await
    }

    /// Store attachment bytes for a later send. Any messaging participant
    /// may upload.
    pub async fn store_attachment(
        &self,
        principal: &Principal,
        payload: Bytes,
        content_type: &str,
    ) -> ChatResult<AttachmentRef> {
        self.resolver.ensure_messaging_role(principal)?;
        self.attachments.store(payload, content_type).await
    }
}

fn registry_error(err: RegistryError) -> ChatError {
    match err {
        RegistryError::UnknownConnection(id) => ChatError::NotFound(format!("connection {id}")),
        other => ChatError::Validation(other.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::attachments::LocalMediaStore;
    use crate::test_support::{MemoryBackend, StaticIdentity, connection};
    use assert_matches::assert_matches;
    use carelink_core::Role;

    fn service_with(backend: &Arc<MemoryBackend>, media: &std::path::Path) -> ChatService {
        ChatService::new(
            ChatDeps {
                identity: Arc::new(StaticIdentity),
                directory: backend.clone(),
                assignments: backend.clone(),
                conversations: backend.clone(),
                messages: backend.clone(),
                attachments: Arc::new(LocalMediaStore::new(media, None)),
            },
            ChatConfig {
                history_default_limit: 2,
                history_max_limit: 3,
                ..ChatConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn join_binds_connection_to_resolved_room() {
        let backend = MemoryBackend::seeded();
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&backend, dir.path());
        let principal = service.authenticate(Some("token-u-c1-doctor")).await.unwrap();
        let (conn, _rx) = connection(principal.clone(), 4);
        service.registry().admit(conn.clone()).unwrap();

        let conv = service.join(&conn.id, &principal, &PatientId::from("p1")).await.unwrap();
        assert!(service.registry().is_joined(&conn.id, &conv.id));
        assert!(service.leave(&conn.id, &conv.id).unwrap());
        assert!(!service.registry().is_joined(&conn.id, &conv.id));
    }

    #[tokio::test]
    async fn forbidden_join_creates_no_membership() {
        let backend = MemoryBackend::seeded();
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&backend, dir.path());
        let outsider = Principal::caregiver("u-c3");
        let (conn, _rx) = connection(outsider.clone(), 4);
        service.registry().admit(conn.clone()).unwrap();

        assert_matches!(
            service.join(&conn.id, &outsider, &PatientId::from("p1")).await,
            Err(ChatError::Forbidden(_))
        );
        assert!(service.registry().rooms_of(&conn.id).is_empty());
    }

    #[tokio::test]
    async fn join_without_admission_is_not_found() {
        let backend = MemoryBackend::seeded();
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&backend, dir.path());
        assert_matches!(
            service
                .join(
                    &ConnectionId::from("conn_ghost"),
                    &Principal::caregiver("u-c1"),
                    &PatientId::from("p1")
                )
                .await,
            Err(ChatError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn history_limit_defaults_and_clamps() {
        let backend = MemoryBackend::seeded();
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&backend, dir.path());
        let patient = Principal::patient("u-p1");
        let p1 = PatientId::from("p1");
        for i in 0..5 {
            service.send(&patient, &p1, &MessageDraft::text(format!("m{i}"))).await.unwrap();
        }

        assert_eq!(service.history(&patient, &p1, None, None).await.unwrap().len(), 2);
        assert_eq!(service.history(&patient, &p1, Some(50), None).await.unwrap().len(), 3);
        assert_eq!(service.history(&patient, &p1, Some(0), None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_before_is_exclusive_and_validated() {
        let backend = MemoryBackend::seeded();
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&backend, dir.path());
        let patient = Principal::patient("u-p1");
        let p1 = PatientId::from("p1");
        let mut sent = Vec::new();
        for i in 0..3 {
            sent.push(service.send(&patient, &p1, &MessageDraft::text(format!("m{i}"))).await.unwrap());
        }

        let older = service
            .history(&patient, &p1, Some(3), Some(&sent[2].created_at))
            .await
            .unwrap();
        let texts: Vec<_> = older.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m1", "m0"]);

        assert_matches!(
            service.history(&patient, &p1, None, Some("yesterday")).await,
            Err(ChatError::Validation(_))
        );
    }

    #[tokio::test]
    async fn other_roles_cannot_upload() {
        let backend = MemoryBackend::seeded();
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(&backend, dir.path());
        let admin = Principal::new("u-admin", Role::Other("admin".into()));
        assert_matches!(
            service
                .store_attachment(&admin, Bytes::from_static(b"x"), "image/png")
                .await,
            Err(ChatError::Forbidden(_))
        );
        let reference = service
            .store_attachment(&Principal::patient("u-p1"), Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        assert!(reference.as_str().starts_with("chat/"));
    }
}
