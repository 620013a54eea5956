//! Server configuration.

use std::time::Duration;

use carelink_settings::CarelinkSettings;

/// Transport-level configuration for [`crate::CarelinkServer`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port (0 picks a free port).
    pub port: u16,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// Silence after which a client is disconnected.
    pub heartbeat_timeout: Duration,
    /// Per-connection outbound queue depth.
    pub outbound_buffer: usize,
    /// Upper bound on a single RPC handler.
    pub rpc_timeout: Duration,
    /// Largest accepted attachment upload.
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Derive transport settings from the loaded settings tree.
    pub fn from_settings(settings: &CarelinkSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            heartbeat_interval: Duration::from_millis(server.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(server.heartbeat_timeout_ms),
            outbound_buffer: server.outbound_buffer.max(1),
            rpc_timeout: Duration::from_millis(server.rpc_timeout_ms),
            max_upload_bytes: settings.media.max_upload_bytes,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            outbound_buffer: 256,
            rpc_timeout: Duration::from_secs(30),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}
