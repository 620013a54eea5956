//! # carelink-chat
//!
//! The real-time messaging core. Transports (WebSocket, REST) talk only to
//! [`ChatService`]; everything below it is transport-agnostic.
//!
//! - [`gate::IdentityGate`]: turns a credential into a [`Principal`]
//! - [`resolver::ConversationResolver`]: the one place role and assignment
//!   rules live; finds or creates the conversation for a pair
//! - [`registry::ConnectionRegistry`]: live connections, room membership,
//!   best-effort broadcast
//! - [`pipeline::MessagePipeline`]: validate, persist, then broadcast
//! - [`read_state::ReadStateAggregator`]: mark-read, unread counts,
//!   conversation list
//! - [`attachments::LocalMediaStore`]: filesystem attachment storage
//!
//! [`Principal`]: carelink_core::Principal

#![deny(unsafe_code)]

pub mod attachments;
pub mod connection;
pub mod events;
pub mod gate;
pub mod metrics;
pub mod pipeline;
pub mod read_state;
pub mod registry;
pub mod resolver;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use attachments::LocalMediaStore;
pub use connection::ClientConnection;
pub use events::ChatEvent;
pub use gate::IdentityGate;
pub use pipeline::MessagePipeline;
pub use read_state::ReadStateAggregator;
pub use registry::{AdmissionGuard, BroadcastReport, ConnectionRegistry, RegistryError};
pub use resolver::{ConversationResolver, ConversationTarget};
pub use service::{ChatConfig, ChatDeps, ChatService};
