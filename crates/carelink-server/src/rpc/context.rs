//! Per-connection context handed to every RPC handler.

use std::sync::Arc;

use carelink_chat::ChatService;
use carelink_core::{ConnectionId, PatientId, Principal};

/// Everything a handler may touch: the messaging core plus the identity of
/// the connection the request arrived on.
#[derive(Clone)]
pub struct RpcContext {
    /// The messaging core.
    pub chat: Arc<ChatService>,
    /// Connection the request arrived on.
    pub connection_id: ConnectionId,
    /// Principal authenticated at upgrade; never re-derived from params.
    pub principal: Principal,
    /// Patient the socket was opened for, if any (`/ws/chat/{patientId}`).
    pub default_patient: Option<PatientId>,
}
