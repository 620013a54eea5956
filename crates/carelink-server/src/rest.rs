//! REST routes under `/api/chat` for clients without a live socket.
//!
//! Every route authenticates with `Authorization: Bearer` and calls the same
//! [`carelink_chat::ChatService`] operations as the RPC handlers.

use axum::extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State};
use axum::http::header::{CONTENT_TYPE, RETRY_AFTER};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use bytes::Bytes;
use carelink_chat::ConversationTarget;
use carelink_core::{
    ChatError, ConversationSummary, Message, MessageDraft, PatientId, Principal,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::debug;

use crate::server::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// REST routes. Attachment uploads are capped at `max_upload_bytes` (413
/// beyond that).
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/api/chat/conversations", get(list_conversations))
        .route(
            "/api/chat/attachments",
            post(upload_attachment)
                .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_upload_bytes)),
        )
        .route(
            "/api/chat/{patient_id}/messages",
            get(message_history).post(send_message),
        )
        .route("/api/chat/{patient_id}/read", post(mark_read))
        .route("/api/chat/{patient_id}/unread", get(unread_count))
}

/// A [`ChatError`] rendered as an HTTP response with a `{code, message}` body.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ChatError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ChatError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "code": self.0.rpc_code(),
            "message": self.0.detail(),
        }));
        if self.0.is_retryable() {
            (status, [(RETRY_AFTER, "1")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

/// The authenticated caller of a REST route.
pub struct Caller(pub Principal);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let bearer = parts.headers.typed_get::<Authorization<Bearer>>();
        let principal = state
            .chat
            .authenticate(bearer.as_ref().map(|auth| auth.token()))
            .await?;
        Ok(Self(principal))
    }
}

/// `?limit=&before=` for history reads.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    /// Page size (clamped by the core).
    pub limit: Option<u32>,
    /// RFC 3339 cutoff.
    pub before: Option<String>,
}

async fn list_conversations(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(state.chat.list_conversations(&principal).await?))
}

async fn message_history(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(patient_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let page = state
        .chat
        .history(
            &principal,
            &PatientId::from(patient_id),
            params.limit,
            params.before.as_deref(),
        )
        .await?;
    Ok(Json(page))
}

async fn send_message(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(patient_id): Path<String>,
    Json(draft): Json<MessageDraft>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .chat
        .send(&principal, &PatientId::from(patient_id), &draft)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(patient_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let target = ConversationTarget::Patient(PatientId::from(patient_id));
    let marked = state.chat.mark_read(&principal, &target).await?;
    debug!(user_id = %principal.user_id, marked, "marked read over REST");
    Ok(StatusCode::NO_CONTENT)
}

async fn unread_count(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let target = ConversationTarget::Patient(PatientId::from(patient_id));
    let count = state.chat.unread_count(&principal, &target).await?;
    Ok(Json(json!({ "count": count })))
}

async fn upload_attachment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let reference = state
        .chat
        .store_attachment(&principal, body, content_type)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "attachmentRef": reference }))))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
