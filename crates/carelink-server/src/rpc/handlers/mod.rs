//! RPC method handlers and parameter helpers.

pub mod conversation;
pub mod message;
pub mod system;

use carelink_chat::ConversationTarget;
use carelink_core::{ConversationId, PatientId};
use serde::Serialize;
use serde_json::Value;

use crate::rpc::errors::RpcError;
use crate::rpc::registry::MethodRegistry;

/// Register every chat method.
pub fn register_all(registry: &mut MethodRegistry) {
    registry.register("system.ping", system::PingHandler);

    registry.register("conversation.join", conversation::JoinHandler);
    registry.register("conversation.leave", conversation::LeaveHandler);
    registry.register("conversation.list", conversation::ListHandler);
    registry.register("conversation.markRead", conversation::MarkReadHandler);
    registry.register("conversation.unreadCount", conversation::UnreadCountHandler);

    registry.register("message.send", message::SendHandler);
    registry.register("message.history", message::HistoryHandler);
}

/// Extract a required string parameter.
pub(crate) fn require_string_param(params: Option<&Value>, key: &str) -> Result<String, RpcError> {
    optional_string_param(params, key)?.ok_or_else(|| RpcError::InvalidParams {
        message: format!("Missing required parameter: {key}"),
    })
}

/// Extract an optional string parameter. `null` counts as absent.
pub(crate) fn optional_string_param(
    params: Option<&Value>,
    key: &str,
) -> Result<Option<String>, RpcError> {
    match params.and_then(|p| p.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RpcError::InvalidParams {
            message: format!("Parameter '{key}' must be a string"),
        }),
    }
}

/// Extract an optional non-negative integer parameter.
pub(crate) fn optional_u32_param(params: Option<&Value>, key: &str) -> Result<Option<u32>, RpcError> {
    match params.and_then(|p| p.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| RpcError::InvalidParams {
                message: format!("Parameter '{key}' must be a non-negative integer"),
            }),
    }
}

/// `patientId` or `conversationId`, patient first.
pub(crate) fn conversation_target(params: Option<&Value>) -> Result<ConversationTarget, RpcError> {
    if let Some(patient) = optional_string_param(params, "patientId")? {
        return Ok(ConversationTarget::Patient(PatientId::from(patient)));
    }
    if let Some(conversation) = optional_string_param(params, "conversationId")? {
        return Ok(ConversationTarget::Conversation(ConversationId::from(conversation)));
    }
    Err(RpcError::InvalidParams {
        message: "Missing required parameter: patientId or conversationId".into(),
    })
}

/// Serialize a handler result.
pub(crate) fn to_json(value: &impl Serialize) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal {
        message: format!("failed to serialize result: {e}"),
    })
}
