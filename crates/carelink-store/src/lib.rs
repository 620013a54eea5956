//! # carelink-store
//!
//! `SQLite` durable store for Carelink.
//!
//! - **[`sqlite`]**: connection pool, embedded migrations, row types, and
//!   stateless repositories (`&Connection` in, rows out)
//! - **[`store`]**: [`SqliteChatStore`], the async facade implementing the
//!   core's `ConversationStore`, `MessageStore`, `PatientDirectory`, and
//!   `AssignmentRegistry` traits on top of the pool
//!
//! Every write is a single `BEGIN IMMEDIATE` transaction, so concurrent
//! writers serialize at the database and callers never observe partial state.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use sqlite::{ConnectionConfig, ConnectionPool, new_file, new_in_memory, run_migrations};
pub use store::SqliteChatStore;
