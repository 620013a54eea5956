//! # carelink-server
//!
//! Transport adapters over the Carelink messaging core.
//!
//! - `WebSocket` gateway: authenticate on upgrade, admit, optional one-step
//!   join, RPC-style request frames, heartbeat, live event push
//! - REST routes for clients that cannot hold a socket (Bearer auth)
//! - `/health` and Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken`
//!
//! Both transports call the same [`carelink_chat::ChatService`], so
//! authorization decisions never diverge between them.

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod rest;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, CarelinkServer};
pub use shutdown::ShutdownCoordinator;
