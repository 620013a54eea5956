//! Read state and conversation list.
//!
//! Read state is derived from persisted messages only. A message is unread
//! for a viewer when someone else (or nobody: system messages) sent it and
//! it has not been marked read.

use std::cmp::Ordering;
use std::sync::Arc;

use carelink_core::traits::MessageStore;
use carelink_core::{ChatResult, Conversation, ConversationSummary, Principal};
use futures::future::try_join_all;
use metrics::counter;
use tracing::debug;

use crate::events::ChatEvent;
use crate::metrics::MESSAGES_READ_TOTAL;
use crate::registry::ConnectionRegistry;
use crate::resolver::{ConversationResolver, ConversationTarget};

/// Mark-read, unread counts, and conversation summaries.
pub struct ReadStateAggregator {
    resolver: ConversationResolver,
    messages: Arc<dyn MessageStore>,
    registry: Arc<ConnectionRegistry>,
}

impl ReadStateAggregator {
    /// Create an aggregator. The registry is only used to push
    /// `conversation.read` events.
    pub fn new(
        resolver: ConversationResolver,
        messages: Arc<dyn MessageStore>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            resolver,
            messages,
            registry,
        }
    }

    /// Mark every counterparty message in the conversation read.
    ///
    /// Returns how many messages flipped; 0 on repeat.
    pub async fn mark_read(
        &self,
        principal: &Principal,
        target: &ConversationTarget,
    ) -> ChatResult<u64> {
        let conversation = self.resolver.authorize(principal, target).await?;
        let changed = self
            .messages
            .mark_read(&conversation.id, &principal.user_id)
            .await?;

        if changed > 0 {
            counter!(MESSAGES_READ_TOTAL).increment(changed);
            if let Some(payload) =
                ChatEvent::conversation_read(&conversation.id, &principal.user_id, changed).encode()
            {
                let _ = self.registry.broadcast(&conversation.id, &payload);
            }
        }
        debug!(
            conversation_id = %conversation.id,
            user_id = %principal.user_id,
            changed,
            "marked read"
        );
        Ok(changed)
    }

    /// Counterparty messages the principal has not read.
    pub async fn unread_count(
        &self,
        principal: &Principal,
        target: &ConversationTarget,
    ) -> ChatResult<u64> {
        let conversation = self.resolver.authorize(principal, target).await?;
        self.messages
            .count_unread(&conversation.id, &principal.user_id)
            .await
    }

    /// One summary per conversation the principal participates in, most
    /// recent activity first. Conversations without messages come last,
    /// newest conversation first.
    pub async fn list_conversations(
        &self,
        principal: &Principal,
    ) -> ChatResult<Vec<ConversationSummary>> {
        let conversations = self.resolver.conversations_for(principal).await?;
        let mut summaries =
            try_join_all(conversations.into_iter().map(|c| self.summarize(principal, c))).await?;
        summaries.sort_by(by_activity);
        Ok(summaries)
    }

    async fn summarize(
        &self,
        principal: &Principal,
        conversation: Conversation,
    ) -> ChatResult<ConversationSummary> {
        let last_message = self.messages.last_message(&conversation.id).await?;
        let unread_count = self
            .messages
            .count_unread(&conversation.id, &principal.user_id)
            .await?;
        Ok(ConversationSummary {
            conversation,
            last_message,
            unread_count,
        })
    }
}

/// Timestamps are canonical RFC 3339 with fixed precision, so string order
/// is time order.
fn by_activity(a: &ConversationSummary, b: &ConversationSummary) -> Ordering {
    match (&a.last_message, &b.last_message) {
        (Some(x), Some(y)) => y.created_at.cmp(&x.created_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.conversation.created_at.cmp(&a.conversation.created_at),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
