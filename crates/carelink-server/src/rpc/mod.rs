//! RPC over `WebSocket` frames: wire types, errors, per-connection context,
//! method registry, and the chat method handlers.

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod types;
