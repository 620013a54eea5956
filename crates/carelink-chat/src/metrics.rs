//! Metric names recorded by the chat core.
//!
//! The recorder itself is installed by the server binary; without one these
//! calls are no-ops.

/// Credentials rejected by the identity gate (label: `reason`).
pub const AUTH_FAILURES_TOTAL: &str = "auth_failures_total";
/// Credentials accepted by the identity gate.
pub const AUTH_SUCCESSES_TOTAL: &str = "auth_successes_total";
/// Broadcast payloads that could not be enqueued for a connection.
pub const BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Messages persisted by the pipeline.
pub const MESSAGES_SENT_TOTAL: &str = "chat_messages_sent_total";
/// Messages flipped to read.
pub const MESSAGES_READ_TOTAL: &str = "chat_messages_read_total";
