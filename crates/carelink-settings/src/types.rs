//! Settings types.
//!
//! Every section deserializes with `#[serde(default)]` so a settings file only
//! needs the keys it changes.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object (`~/.carelink/settings.json`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CarelinkSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Token verification settings.
    pub auth: AuthSettings,
    /// Database settings.
    pub storage: StorageSettings,
    /// Messaging limits.
    pub chat: ChatSettings,
    /// Attachment storage.
    pub media: MediaSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl CarelinkSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chat.history_max_limit == 0 {
            return Err(SettingsError::InvalidValue(
                "chat.historyMaxLimit must be at least 1".into(),
            ));
        }
        if self.chat.history_default_limit > self.chat.history_max_limit {
            return Err(SettingsError::InvalidValue(format!(
                "chat.historyDefaultLimit ({}) exceeds chat.historyMaxLimit ({})",
                self.chat.history_default_limit, self.chat.history_max_limit
            )));
        }
        if self.server.heartbeat_timeout_ms < self.server.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatTimeoutMs must not be shorter than heartbeatIntervalMs".into(),
            ));
        }
        if self.storage.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "storage.poolSize must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (HTTP and WebSocket share it).
    pub port: u16,
    /// Maximum live connections. `0` disables the limit.
    pub max_connections: usize,
    /// Interval between server pings.
    pub heartbeat_interval_ms: u64,
    /// Disconnect clients that have not answered a ping for this long.
    pub heartbeat_timeout_ms: u64,
    /// Per-connection outbound queue depth.
    pub outbound_buffer: usize,
    /// RPC handler timeout.
    pub rpc_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            outbound_buffer: 256,
            rpc_timeout_ms: 30_000,
        }
    }
}

/// Token verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Shared HMAC secret. Must be set before serving.
    pub jwt_secret: String,
    /// `HS256`, `HS384`, or `HS512`.
    pub jwt_algorithm: String,
    /// Clock skew tolerance for `exp`.
    pub leeway_secs: u64,
    /// Lifetime of tokens issued by `carelink token`.
    pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_algorithm: "HS256".to_string(),
            leeway_secs: 30,
            token_ttl_secs: 86_400,
        }
    }
}

/// Database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite file (relative paths resolve under `~/.carelink`).
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
    /// SQLite busy timeout.
    pub busy_timeout_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "carelink.db".to_string(),
            pool_size: 16,
            busy_timeout_ms: 30_000,
        }
    }
}

/// Messaging limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Longest accepted text body, in characters.
    pub max_text_chars: usize,
    /// History page size when the client does not ask for one.
    pub history_default_limit: u32,
    /// Upper bound for a history page.
    pub history_max_limit: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_text_chars: 4000,
            history_default_limit: 50,
            history_max_limit: 100,
        }
    }
}

/// Attachment storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaSettings {
    /// Upload root (relative paths resolve under `~/.carelink`).
    pub directory: String,
    /// Prefix prepended to stored paths, e.g. `https://cdn.example/media`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
    /// Largest accepted upload.
    pub max_upload_bytes: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            directory: "media".to_string(),
            public_base_url: None,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
