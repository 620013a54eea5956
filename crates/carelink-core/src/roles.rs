//! Roles and the authenticated principal.
//!
//! Messaging only distinguishes caregivers from patients. Every other role an
//! identity service may report is carried as [`Role::Other`] and is refused
//! by the conversation resolver.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::UserId;

/// Closed set of roles relevant to messaging.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Clinician side of a conversation (`caregiver` or legacy `doctor`).
    Caregiver,
    /// Patient side of a conversation.
    Patient,
    /// Any other role (admin, staff, ...). Never authorised for messaging.
    Other(String),
}

impl Role {
    /// Parse a role claim. Matching is case-insensitive.
    #[must_use]
    pub fn from_claim(claim: &str) -> Self {
        let lowered = claim.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "caregiver" | "doctor" => Self::Caregiver,
            "patient" => Self::Patient,
            _ => Self::Other(lowered),
        }
    }

    /// Wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Caregiver => "caregiver",
            Self::Patient => "patient",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_claim(&raw))
    }
}

/// A verified `(userId, role)` pair, cached for a connection's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Authenticated user.
    pub user_id: UserId,
    /// Role reported by the identity service.
    pub role: Role,
}

impl Principal {
    /// Create a principal.
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Convenience constructor for a caregiver principal.
    #[must_use]
    pub fn caregiver(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, Role::Caregiver)
    }

    /// Convenience constructor for a patient principal.
    #[must_use]
    pub fn patient(user_id: impl Into<UserId>) -> Self {
        Self::new(user_id, Role::Patient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doctor_claim_maps_to_caregiver() {
        assert_eq!(Role::from_claim("doctor"), Role::Caregiver);
        assert_eq!(Role::from_claim("Caregiver"), Role::Caregiver);
    }

    #[test]
    fn patient_claim() {
        assert_eq!(Role::from_claim(" PATIENT "), Role::Patient);
    }

    #[test]
    fn unknown_claim_is_other() {
        assert_eq!(Role::from_claim("admin"), Role::Other("admin".into()));
        assert_eq!(Role::Other("admin".into()).as_str(), "admin");
    }

    #[test]
    fn role_serializes_as_string() {
        let p = Principal::caregiver("u1");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json, serde_json::json!({"userId": "u1", "role": "caregiver"}));
        let back: Principal = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
