//! Branded ID newtypes.
//!
//! Each entity carries its own ID type so a `PatientId` can never be passed
//! where a `ConversationId` is expected. Generated IDs are UUID v7 with a
//! short entity prefix (`conv_0192...`), which keeps them time-ordered and
//! recognisable in logs. IDs handed to us by the directory or by clients are
//! accepted verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_v7(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7().simple())
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix used for freshly generated IDs.
            pub const PREFIX: &'static str = $prefix;

            /// Create a new random ID (prefixed UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7($prefix))
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Authenticated user account (the `sub` claim of a token).
    UserId, "usr"
}

branded_id! {
    /// Patient directory record.
    PatientId, "pat"
}

branded_id! {
    /// Caregiver directory record. Distinct from the caregiver's `UserId`.
    CaregiverId, "cg"
}

branded_id! {
    /// Conversation between one caregiver and one patient.
    ConversationId, "conv"
}

branded_id! {
    /// Persisted chat message.
    MessageId, "msg"
}

branded_id! {
    /// A single live transport connection.
    ConnectionId, "conn"
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
