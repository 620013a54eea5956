//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CarelinkSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `CARELINK_*` environment overrides
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::CarelinkSettings;

/// The Carelink home directory (`~/.carelink`).
pub fn carelink_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".carelink")
}

/// Resolve the path to the settings file (`~/.carelink/settings.json`).
pub fn settings_path() -> PathBuf {
    carelink_home().join("settings.json")
}

/// Resolve a configured path: absolute paths are kept, relative ones land
/// under [`carelink_home`].
pub fn resolve_in_home(path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        carelink_home().join(p)
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CarelinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CarelinkSettings> {
    let defaults = serde_json::to_value(CarelinkSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: CarelinkSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CARELINK_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut CarelinkSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary key lookup.
///
/// Invalid values are ignored with a warning, leaving the file/default value.
pub fn apply_overrides<F>(settings: &mut CarelinkSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CARELINK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u16("CARELINK_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.usize("CARELINK_MAX_CONNECTIONS", 0, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.u64("CARELINK_HEARTBEAT_INTERVAL_MS", 1000, 600_000) {
        settings.server.heartbeat_interval_ms = v;
        settings.server.heartbeat_timeout_ms = settings.server.heartbeat_timeout_ms.max(v);
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("CARELINK_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = env.string("CARELINK_JWT_ALGORITHM") {
        settings.auth.jwt_algorithm = v;
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CARELINK_DB_PATH") {
        settings.storage.db_path = v;
    }
    if let Some(v) = env.usize("CARELINK_DB_POOL_SIZE", 1, 256) {
        // bounded above by 256, always fits
        settings.storage.pool_size = u32::try_from(v).unwrap_or(settings.storage.pool_size);
    }

    // ── Chat ────────────────────────────────────────────────────────
    if let Some(v) = env.u64("CARELINK_HISTORY_MAX_LIMIT", 1, 10_000) {
        settings.chat.history_max_limit = u32::try_from(v).unwrap_or(settings.chat.history_max_limit);
        settings.chat.history_default_limit = settings
            .chat
            .history_default_limit
            .min(settings.chat.history_max_limit);
    }

    // ── Media ───────────────────────────────────────────────────────
    if let Some(v) = env.string("CARELINK_MEDIA_DIR") {
        settings.media.directory = v;
    }
    if let Some(v) = env.string("CARELINK_MEDIA_PUBLIC_BASE") {
        settings.media.public_base_url = Some(v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CARELINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("CARELINK_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Lookup readers ──────────────────────────────────────────────────────────

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    fn string(&self, name: &str) -> Option<String> {
        self.raw(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.raw(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.raw(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.raw(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.raw(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
