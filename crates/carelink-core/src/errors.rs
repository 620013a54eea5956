//! The chat error taxonomy.
//!
//! Every component of the chat core fails with a [`ChatError`]. Transports
//! translate it: WebSocket close codes via [`ChatError::close_code`], RPC
//! error codes via [`ChatError::rpc_code`], HTTP statuses in the REST adapter.

use thiserror::Error;

/// Result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Close code: credential missing, malformed, expired, or unverifiable.
pub const CLOSE_UNAUTHENTICATED: u16 = 4401;
/// Close code: role or assignment mismatch.
pub const CLOSE_FORBIDDEN: u16 = 4403;
/// Close code: unknown patient or conversation.
pub const CLOSE_NOT_FOUND: u16 = 4404;
/// Close code: policy violation (RFC 6455).
pub const CLOSE_POLICY: u16 = 1008;
/// Close code: internal error (RFC 6455).
pub const CLOSE_INTERNAL: u16 = 1011;
/// Close code: try again later (RFC 6455).
pub const CLOSE_TRY_AGAIN: u16 = 1013;

/// Errors surfaced by the messaging core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Bad, expired, or missing credential. Never retried silently.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Unknown patient or conversation.
    #[error("not found: {0}")]
    NotFound(String),

    /// Role or assignment mismatch.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Caller input must be corrected.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Persistence unavailable; the single failed operation may be retried.
    #[error("store unavailable: {0}")]
    TransientStore(String),
}

impl ChatError {
    /// WebSocket close code for a connection-time failure.
    #[must_use]
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Authentication(_) => CLOSE_UNAUTHENTICATED,
            Self::Forbidden(_) => CLOSE_FORBIDDEN,
            Self::NotFound(_) => CLOSE_NOT_FOUND,
            Self::Validation(_) => CLOSE_POLICY,
            Self::TransientStore(_) => CLOSE_INTERNAL,
        }
    }

    /// Machine-readable RPC error code.
    #[must_use]
    pub fn rpc_code(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "UNAUTHENTICATED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::TransientStore(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Whether the failed operation is safe to retry unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// Human-readable detail without the category prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Authentication(m)
            | Self::NotFound(m)
            | Self::Forbidden(m)
            | Self::Validation(m)
            | Self::TransientStore(m) => m,
        }
    }
}
