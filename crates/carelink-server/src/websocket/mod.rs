//! `WebSocket` gateway: upgrade, admission, session loop, frame dispatch.

pub mod handler;
pub mod session;
pub mod upgrade;
