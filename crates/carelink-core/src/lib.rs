//! # carelink-core
//!
//! Foundation types, errors, branded IDs, and collaborator traits for Carelink.
//!
//! Every other Carelink crate depends on the vocabulary defined here:
//!
//! - **Branded IDs**: `UserId`, `PatientId`, `ConversationId`, ... as newtypes
//! - **Credentials**: `Bearer` scheme stripping
//! - **Roles**: `Role` and the authenticated `Principal`
//! - **Time**: canonical RFC 3339 microsecond timestamps
//! - **Records**: `Conversation`, `Message`, `ConversationSummary`
//! - **Errors**: the `ChatError` taxonomy shared by every transport
//! - **Traits**: storage, directory, identity, and attachment seams

#![deny(unsafe_code)]

pub mod credentials;
pub mod errors;
pub mod ids;
pub mod records;
pub mod roles;
pub mod time;
pub mod traits;

pub use credentials::strip_bearer;
pub use errors::{ChatError, ChatResult};
pub use ids::{CaregiverId, ConnectionId, ConversationId, MessageId, PatientId, UserId};
pub use records::{
    AttachmentRef, Conversation, ConversationSummary, HistoryQuery, Message, MessageDraft,
    NewMessage, PatientRecord,
};
pub use roles::{Principal, Role};
