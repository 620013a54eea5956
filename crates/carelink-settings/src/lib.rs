//! # carelink-settings
//!
//! Configuration for the Carelink messaging server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CarelinkSettings::default()`]
//! 2. **Settings file**: `~/.carelink/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CARELINK_*` overrides (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, carelink_home, deep_merge, load_settings,
    load_settings_from_path, resolve_in_home, settings_path,
};
pub use types::*;
