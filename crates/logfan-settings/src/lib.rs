//! # logfan-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LogfanSettings::default()`]
//! 2. **User file**: `~/.logfan/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LOGFAN_*` overrides (highest priority)
//!
//! The loaded value is validated before it is returned, so a bad ping
//! interval or an empty queue fails at startup rather than mid-session.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{EmitterSettings, LogfanSettings, LoggingSettings, ServerSettings, SessionSettings};
