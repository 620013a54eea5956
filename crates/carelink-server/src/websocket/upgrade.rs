//! Upgrade routes: authenticate, resolve, admit, and join before the
//! session starts.
//!
//! The upgrade always completes; refusals are delivered as a close frame so
//! browser clients can read the code. Nothing is admitted for a connection
//! that fails authentication or authorization.
//!
//! Every upgraded socket holds a shutdown ticket until it has left the
//! registry, so graceful shutdown waits for the close frame and cleanup.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use carelink_chat::{ClientConnection, RegistryError};
use carelink_core::errors::{CLOSE_INTERNAL, CLOSE_TRY_AGAIN};
use carelink_core::{ConnectionId, PatientId};
use metrics::counter;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use super::session::{Heartbeat, Session, run_ws_session};
use crate::metrics::WS_REJECTIONS_TOTAL;
use crate::rpc::context::RpcContext;
use crate::server::AppState;

/// Close reasons are limited to 123 bytes by RFC 6455.
const MAX_CLOSE_REASON: usize = 123;

/// Query string accepted on upgrade routes.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Credential for clients that cannot set headers.
    pub token: Option<String>,
}

/// `GET /ws`: authenticate and admit; rooms are joined over RPC.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let credential = credential(query, &headers);
    ws.on_upgrade(move |socket| accept(socket, state, credential, None))
}

/// `GET /ws/chat/{patientId}`: authenticate, resolve, admit, and join.
pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let credential = credential(query, &headers);
    let patient_id = PatientId::from(patient_id);
    ws.on_upgrade(move |socket| accept(socket, state, credential, Some(patient_id)))
}

/// `?token=` wins over an `Authorization: Bearer` header.
fn credential(query: WsQuery, headers: &HeaderMap) -> Option<String> {
    query.token.or_else(|| {
        headers
            .typed_get::<Authorization<Bearer>>()
            .map(|auth| auth.token().to_owned())
    })
}

#[instrument(skip_all, fields(patient_id = patient_id.as_ref().map(|p| p.as_str())))]
async fn accept(
    socket: WebSocket,
    state: AppState,
    credential: Option<String>,
    patient_id: Option<PatientId>,
) {
    let _ticket = state.shutdown.track_session();
    let chat = &state.chat;
    let principal = match chat.authenticate(credential.as_deref()).await {
        Ok(principal) => principal,
        Err(e) => return reject(socket, e.close_code(), e.detail()).await,
    };

    let conversation = match &patient_id {
        Some(patient_id) => match chat.resolve(&principal, patient_id).await {
            Ok(conversation) => Some(conversation),
            Err(e) => return reject(socket, e.close_code(), e.detail()).await,
        },
        None => None,
    };

    let (tx, rx) = mpsc::channel(state.config.outbound_buffer);
    let connection = Arc::new(ClientConnection::new(ConnectionId::new(), principal.clone(), tx));
    let guard = match chat.registry().admit_guarded(Arc::clone(&connection)) {
        Ok(guard) => guard,
        Err(RegistryError::AtCapacity(limit)) => {
            return reject(socket, CLOSE_TRY_AGAIN, &format!("server at capacity ({limit})")).await;
        }
        Err(e) => return reject(socket, CLOSE_INTERNAL, &e.to_string()).await,
    };

    if let Some(conversation) = &conversation {
        if let Err(e) = chat.registry().join(&connection.id, &conversation.id) {
            drop(guard);
            return reject(socket, CLOSE_INTERNAL, &e.to_string()).await;
        }
    }

    let ctx = RpcContext {
        chat: Arc::clone(chat),
        connection_id: connection.id.clone(),
        principal,
        default_patient: patient_id,
    };
    let session = Session {
        connection,
        outbound: rx,
        guard,
        conversation_id: conversation.map(|c| c.id),
    };
    run_ws_session(
        socket,
        session,
        ctx,
        Arc::clone(&state.rpc),
        Heartbeat::from(state.config.as_ref()),
        state.shutdown.token(),
    )
    .await;
}

async fn reject(mut socket: WebSocket, code: u16, reason: &str) {
    info!(code, reason, "connection refused");
    counter!(WS_REJECTIONS_TOTAL, "code" => code.to_string()).increment(1);
    let frame = CloseFrame {
        code,
        reason: truncate_reason(reason).into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn query_token_wins_over_header() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("authorization", HeaderValue::from_static("Bearer from-header"));
        let query = WsQuery {
            token: Some("from-query".into()),
        };
        assert_eq!(credential(query, &headers).as_deref(), Some("from-query"));
        assert_eq!(
            credential(WsQuery::default(), &headers).as_deref(),
            Some("from-header")
        );
        assert_eq!(credential(WsQuery::default(), &HeaderMap::new()), None);
    }

    #[test]
    fn close_reason_is_truncated_on_char_boundary() {
        let long = "é".repeat(100);
        let cut = truncate_reason(&long);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(truncate_reason("short"), "short");
    }
}
