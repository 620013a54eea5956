//! Message pipeline: validate, resolve, persist, broadcast.
//!
//! Persistence and broadcast are sequential, not transactional. A failed
//! insert broadcasts nothing; a partially failed broadcast leaves the stored
//! message recoverable through history.
//!
//! Persist and broadcast for one conversation run under that conversation's
//! async mutex, so live observers receive messages in persistence order even
//! when senders race. Other conversations are unaffected.

use std::sync::Arc;

use carelink_core::traits::MessageStore;
use carelink_core::{ChatResult, ConversationId, Message, MessageDraft, NewMessage, PatientId, Principal};
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument};

use crate::events::ChatEvent;
use crate::metrics::MESSAGES_SENT_TOTAL;
use crate::registry::ConnectionRegistry;
use crate::resolver::ConversationResolver;

/// Sends messages into conversations.
pub struct MessagePipeline {
    resolver: ConversationResolver,
    messages: Arc<dyn MessageStore>,
    registry: Arc<ConnectionRegistry>,
    locks: Arc<DashMap<ConversationId, Arc<Mutex<()>>>>,
    max_text_chars: usize,
}

impl MessagePipeline {
    /// Create a pipeline.
    pub fn new(
        resolver: ConversationResolver,
        messages: Arc<dyn MessageStore>,
        registry: Arc<ConnectionRegistry>,
        max_text_chars: usize,
    ) -> Self {
        Self {
            resolver,
            messages,
            registry,
            locks: Arc::new(DashMap::new()),
            max_text_chars,
        }
    }

    /// Send a message from `principal` to the conversation with `patient_id`.
    ///
    /// Returns the stored message once persisted. Broadcast failures to
    /// individual connections never fail the send.
    #[instrument(skip_all, fields(user_id = %principal.user_id, patient_id = %patient_id))]
    pub async fn send(
        &self,
        principal: &Principal,
        patient_id: &PatientId,
        draft: &MessageDraft,
    ) -> ChatResult<Message> {
        let (text, attachment_ref) = draft.normalize(self.max_text_chars)?;
        let conversation = self.resolver.resolve(principal, patient_id).await?;

        let _slot = self.acquire(&conversation.id).await;
        let message = self
            .messages
            .insert_message(NewMessage {
                conversation_id: conversation.id.clone(),
                sender_user_id: Some(principal.user_id.clone()),
                text,
                attachment_ref,
            })
            .await?;
        counter!(MESSAGES_SENT_TOTAL).increment(1);

        let report = ChatEvent::message_received(&message)
            .encode()
            .map(|payload| self.registry.broadcast(&conversation.id, &payload))
            .unwrap_or_default();
        info!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            recipients = report.recipients,
            dropped = report.dropped,
            "message sent"
        );
        Ok(message)
    }

    /// Number of conversations with a send in flight.
    pub fn active_conversations(&self) -> usize {
        self.locks.len()
    }

    async fn acquire(&self, conversation_id: &ConversationId) -> SendSlot {
        let lock = self
            .locks
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        SendSlot {
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
            conversation_id: conversation_id.clone(),
        }
    }
}

/// Holds a conversation's send lock; prunes the lock map on release.
struct SendSlot {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<ConversationId, Arc<Mutex<()>>>>,
    conversation_id: ConversationId,
}

impl Drop for SendSlot {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map itself still holds the mutex: nobody is waiting.
        let _ = self
            .locks
            .remove_if(&self.conversation_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
