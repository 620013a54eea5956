//! Message handlers: send and history.

use async_trait::async_trait;
use carelink_core::{MessageDraft, PatientId};
use serde_json::{Value, json};
use tracing::instrument;

use crate::rpc::context::RpcContext;
use crate::rpc::errors::RpcError;
use crate::rpc::handlers::{optional_string_param, optional_u32_param, to_json};
use crate::rpc::registry::MethodHandler;

/// `patientId` from params, falling back to the socket's own patient.
fn patient_param(params: Option<&Value>, ctx: &RpcContext) -> Result<PatientId, RpcError> {
    optional_string_param(params, "patientId")?
        .map(PatientId::from)
        .or_else(|| ctx.default_patient.clone())
        .ok_or_else(|| RpcError::InvalidParams {
            message: "Missing required parameter: patientId".into(),
        })
}

/// Persist a message and push it to the conversation's live connections.
pub struct SendHandler;

#[async_trait]
impl MethodHandler for SendHandler {
    #[instrument(skip(self, ctx), fields(method = "message.send"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let patient_id = patient_param(params.as_ref(), ctx)?;
        let draft: MessageDraft = serde_json::from_value(params.unwrap_or_else(|| json!({})))
            .map_err(|e| RpcError::InvalidParams {
                message: format!("Invalid message: {e}"),
            })?;
        let message = ctx.chat.send(&ctx.principal, &patient_id, &draft).await?;
        to_json(&message)
    }
}

/// A page of history, newest first.
pub struct HistoryHandler;

#[async_trait]
impl MethodHandler for HistoryHandler {
    #[instrument(skip(self, ctx), fields(method = "message.history"))]
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let patient_id = patient_param(params.as_ref(), ctx)?;
        let limit = optional_u32_param(params.as_ref(), "limit")?;
        let before = optional_string_param(params.as_ref(), "before")?;
        let page = ctx
            .chat
            .history(&ctx.principal, &patient_id, limit, before.as_deref())
            .await?;
        to_json(&page)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
