//! Stateless repositories.
//!
//! Each repository is a unit struct whose methods take a `&Connection`, so
//! every operation is a plain function of (connection, input) and composes
//! inside a caller-owned transaction.

pub mod conversation;
pub mod directory;
pub mod message;
