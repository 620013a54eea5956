//! Conversation handlers: join, leave, list, mark read, unread count.

use async_trait::async_trait;
use carelink_core::{ConversationId, PatientId};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::rpc::context::RpcContext;
use crate::rpc::errors::RpcError;
use crate::rpc::handlers::{conversation_target, require_string_param, to_json};
use crate::rpc::registry::MethodHandler;

/// Resolve the conversation with a patient and bind this connection to it.
pub struct JoinHandler;

#[async_trait]
impl MethodHandler for JoinHandler {
    #[instrument(skip(self, ctx), fields(method = "conversation.join"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let patient_id = PatientId::from(require_string_param(params.as_ref(), "patientId")?);
        let conversation = ctx
            .chat
            .join(&ctx.connection_id, &ctx.principal, &patient_id)
            .await?;
        debug!(connection_id = %ctx.connection_id, conversation_id = %conversation.id, "joined");
        to_json(&conversation)
    }
}

/// Unbind this connection from a conversation.
pub struct LeaveHandler;

#[async_trait]
impl MethodHandler for LeaveHandler {
    #[instrument(skip(self, ctx), fields(method = "conversation.leave"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let conversation_id =
            ConversationId::from(require_string_param(params.as_ref(), "conversationId")?);
        let left = ctx.chat.leave(&ctx.connection_id, &conversation_id)?;
        Ok(json!({ "left": left }))
    }
}

/// Conversation summaries for the caller, most recent activity first.
pub struct ListHandler;

#[async_trait]
impl MethodHandler for ListHandler {
    #[instrument(skip(self, ctx), fields(method = "conversation.list"))]
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let summaries = ctx.chat.list_conversations(&ctx.principal).await?;
        to_json(&summaries)
    }
}

/// Mark counterparty messages read.
pub struct MarkReadHandler;

#[async_trait]
impl MethodHandler for MarkReadHandler {
    #[instrument(skip(self, ctx), fields(method = "conversation.markRead"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let target = conversation_target(params.as_ref())?;
        let marked = ctx.chat.mark_read(&ctx.principal, &target).await?;
        Ok(json!({ "marked": marked }))
    }
}

/// Count counterparty messages the caller has not read.
pub struct UnreadCountHandler;

#[async_trait]
impl MethodHandler for UnreadCountHandler {
    #[instrument(skip(self, ctx), fields(method = "conversation.unreadCount"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let target = conversation_target(params.as_ref())?;
        let count = ctx.chat.unread_count(&ctx.principal, &target).await?;
        Ok(json!({ "count": count }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
