//! Auth error types.

use carelink_core::ChatError;

/// Errors raised while configuring the verifier or checking a credential.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No signing secret configured.
    #[error("JWT secret is not configured")]
    MissingSecret,

    /// Only HMAC algorithms are supported.
    #[error("unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The credential was empty after stripping the scheme.
    #[error("credential is empty")]
    EmptyCredential,

    /// A required claim was present but blank.
    #[error("claim `{0}` is empty")]
    EmptyClaim(&'static str),

    /// Signature, expiry, or decoding failure.
    #[error("invalid token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl From<AuthError> for ChatError {
    fn from(err: AuthError) -> Self {
        Self::Authentication(err.to_string())
    }
}
