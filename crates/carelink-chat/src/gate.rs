//! Identity gate.
//!
//! Wraps the external identity service. Called once per connection (or once
//! per REST request); the resulting principal is cached by the caller.

use std::sync::Arc;

use carelink_core::traits::IdentityService;
use carelink_core::{ChatError, ChatResult, Principal, strip_bearer};
use metrics::counter;
use tracing::{debug, warn};

use crate::metrics::{AUTH_FAILURES_TOTAL, AUTH_SUCCESSES_TOTAL};

/// Produces verified principals from bearer credentials.
#[derive(Clone)]
pub struct IdentityGate {
    service: Arc<dyn IdentityService>,
}

impl IdentityGate {
    /// Wrap an identity service.
    pub fn new(service: Arc<dyn IdentityService>) -> Self {
        Self { service }
    }

    /// Verify a credential. A missing or blank credential fails without
    /// reaching the identity service.
    pub async fn authenticate(&self, credential: Option<&str>) -> ChatResult<Principal> {
        let token = credential.map(strip_bearer).unwrap_or_default();
        if token.is_empty() {
            counter!(AUTH_FAILURES_TOTAL, "reason" => "missing").increment(1);
            warn!("connection refused: missing credential");
            return Err(ChatError::Authentication("missing credential".into()));
        }

        match self.service.authenticate(token).await {
            Ok(principal) => {
                counter!(AUTH_SUCCESSES_TOTAL).increment(1);
                debug!(user_id = %principal.user_id, role = %principal.role, "authenticated");
                Ok(principal)
            }
            Err(err @ ChatError::Authentication(_)) => {
                counter!(AUTH_FAILURES_TOTAL, "reason" => "rejected").increment(1);
                warn!(error = %err, "credential rejected");
                Err(err)
            }
            Err(other) => {
                counter!(AUTH_FAILURES_TOTAL, "reason" => "unavailable").increment(1);
                warn!(error = %other, "identity service failed");
                Err(other)
            }
        }
    }
}
