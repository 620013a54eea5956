//! HMAC JWT verification and issuing.

use async_trait::async_trait;
use carelink_core::traits::IdentityService;
use carelink_core::{ChatResult, Principal, Role, UserId, strip_bearer};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AuthError;

/// Claims carried by a Carelink token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// Role name (`caregiver`, `doctor`, `patient`, ...).
    pub role: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Issued-at, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Map a configured algorithm name to an HMAC [`Algorithm`].
pub fn parse_algorithm(name: &str) -> Result<Algorithm, AuthError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(AuthError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Verifies (and issues) shared-secret JWTs.
pub struct JwtIdentityService {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtIdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIdentityService")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl JwtIdentityService {
    /// Build a verifier from a secret and an algorithm name.
    pub fn new(secret: &str, algorithm: &str, leeway_secs: u64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        let algorithm = parse_algorithm(algorithm)?;
        let mut validation = Validation::new(algorithm);
        validation.leeway = leeway_secs;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            algorithm,
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Verify a credential and return the principal it names.
    pub fn verify(&self, credential: &str) -> Result<Principal, AuthError> {
        let token = strip_bearer(credential);
        if token.is_empty() {
            return Err(AuthError::EmptyCredential);
        }
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::EmptyClaim("sub"));
        }
        if claims.role.trim().is_empty() {
            return Err(AuthError::EmptyClaim("role"));
        }
        Ok(Principal::new(
            UserId::from(claims.sub),
            Role::from_claim(&claims.role),
        ))
    }

    /// Sign a token for `user_id` with the given role, valid for `ttl_secs`.
    pub fn issue(&self, user_id: &str, role: &str, ttl_secs: i64) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            exp: now + ttl_secs,
            iat: Some(now),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(self.algorithm),
            &claims,
            &self.encoding_key,
        )?)
    }
}

#[async_trait]
impl IdentityService for JwtIdentityService {
    async fn authenticate(&self, credential: &str) -> ChatResult<Principal> {
        self.verify(credential).map_err(|e| {
            debug!(error = %e, "token rejected");
            e.into()
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use carelink_core::ChatError;

    use super::*;

    fn service() -> JwtIdentityService {
        JwtIdentityService::new("test-secret", "HS256", 0).unwrap()
    }

    #[test]
    fn algorithm_names() {
        assert_eq!(parse_algorithm("hs512").unwrap(), Algorithm::HS512);
        assert_matches!(parse_algorithm("RS256"), Err(AuthError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn empty_secret_rejected() {
        assert_matches!(
            JwtIdentityService::new("", "HS256", 0),
            Err(AuthError::MissingSecret)
        );
    }

    #[test]
    fn issued_token_verifies() {
        let svc = service();
        let token = svc.issue("u1", "doctor", 60).unwrap();
        let principal = svc.verify(&format!("Bearer {token}")).unwrap();
        assert_eq!(principal, Principal::caregiver("u1"));
    }

    #[test]
    fn unknown_role_is_other() {
        let svc = service();
        let token = svc.issue("u1", "admin", 60).unwrap();
        assert_eq!(svc.verify(&token).unwrap().role, Role::Other("admin".into()));
    }

    #[test]
    fn expired_token_rejected() {
        let svc = service();
        let token = svc.issue("u1", "patient", -120).unwrap();
        assert_matches!(svc.verify(&token), Err(AuthError::Jwt(_)));
    }

    #[test]
    fn wrong_secret_rejected() {
        let other = JwtIdentityService::new("other-secret", "HS256", 0).unwrap();
        let token = other.issue("u1", "patient", 60).unwrap();
        assert_matches!(service().verify(&token), Err(AuthError::Jwt(_)));
    }

    #[test]
    fn algorithm_mismatch_rejected() {
        let hs512 = JwtIdentityService::new("test-secret", "HS512", 0).unwrap();
        let token = hs512.issue("u1", "patient", 60).unwrap();
        assert_matches!(service().verify(&token), Err(AuthError::Jwt(_)));
    }

    #[test]
    fn malformed_and_empty_rejected() {
        assert_matches!(service().verify("not.a.jwt"), Err(AuthError::Jwt(_)));
        assert_matches!(service().verify("Bearer "), Err(AuthError::EmptyCredential));
    }

    #[test]
    fn blank_subject_rejected() {
        let svc = service();
        let token = svc.issue("  ", "patient", 60).unwrap();
        assert_matches!(svc.verify(&token), Err(AuthError::EmptyClaim("sub")));
    }

    #[tokio::test]
    async fn trait_maps_to_authentication_error() {
        let err = service().authenticate("garbage").await.unwrap_err();
        assert_matches!(err, ChatError::Authentication(_));
    }
}
