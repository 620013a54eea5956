//! Frame dispatch: parses incoming text as an `RpcRequest` and routes it
//! through the `MethodRegistry`.

use tracing::{debug, error, instrument, warn};

use crate::rpc::context::RpcContext;
use crate::rpc::errors;
use crate::rpc::registry::MethodRegistry;
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Result of handling one inbound frame.
pub struct HandleResult {
    /// Serialized JSON response to send back.
    pub response_json: String,
    /// The RPC method that was called (empty if parse failed).
    pub method: String,
    /// Typed response.
    pub response: RpcResponse,
}

/// Handle an incoming text frame.
#[instrument(skip_all, fields(method))]
pub async fn handle_message(message: &str, registry: &MethodRegistry, ctx: &RpcContext) -> HandleResult {
    let request: RpcRequest = match serde_json::from_str(message) {
        Ok(r) => r,
        Err(e) => {
            warn!(connection_id = %ctx.connection_id, "invalid JSON received");
            let response =
                RpcResponse::error("unknown", errors::INVALID_PARAMS, format!("Invalid JSON: {e}"));
            return finish(String::new(), response);
        }
    };

    let method = request.method.clone();
    let _ = tracing::Span::current().record("method", method.as_str());
    debug!(method, id = %request.id, connection_id = %ctx.connection_id, "dispatching RPC");
    if !registry.has_method(&method) {
        warn!(method, "unknown RPC method");
    }

    let response = registry.dispatch(request, ctx).await;
    finish(method, response)
}

fn finish(method: String, response: RpcResponse) -> HandleResult {
    let response_json = serde_json::to_string(&response).unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize response");
        String::new()
    });
    HandleResult {
        response_json,
        method,
        response,
    }
}
