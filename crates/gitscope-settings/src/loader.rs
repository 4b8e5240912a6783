//! Settings loading: defaults ← user file ← environment overrides.

use std::env;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::ScopeSettings;

/// Path to the user settings file: `~/.gitscope/settings.json`.
#[must_use]
pub fn settings_path() -> PathBuf {
    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join(".gitscope").join("settings.json")
}

/// Deep-merge `overlay` into `base`.
///
/// Objects merge recursively; any other value type in the overlay replaces
/// the base value wholesale.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(k) {
                    Some(slot) => deep_merge(slot, v),
                    None => {
                        let _ = base_map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (slot, v) => *slot = v.clone(),
    }
}

/// Load settings from the default path with env overrides applied.
pub fn load_settings() -> Result<ScopeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific file path.
///
/// A missing file is not an error — defaults plus env overrides apply.
/// A present-but-malformed file is an error, so a typo does not silently
/// revert the user to defaults.
pub fn load_settings_from_path(path: &Path) -> Result<ScopeSettings> {
    let mut merged = serde_json::to_value(ScopeSettings::default())
        .map_err(|e| SettingsError::Serialize(e.to_string()))?;

    if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let overlay: Value = serde_json::from_str(&raw).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        deep_merge(&mut merged, &overlay);
    }

    let mut settings: ScopeSettings = serde_json::from_value(merged)
        .map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Apply `GITSCOPE_*` environment overrides (highest priority layer).
fn apply_env_overrides(settings: &mut ScopeSettings) {
    if let Some(v) = env_bool("GITSCOPE_IGNORE_WHITESPACE") {
        settings.blame.ignore_whitespace = v;
    }
    if let Some(v) = env_bool("GITSCOPE_CACHING_ENABLED") {
        settings.advanced.caching_enabled = v;
    }
    if let Ok(raw) = env::var("GITSCOPE_DIRTY_IDLE_MS") {
        match raw.parse::<u64>() {
            Ok(ms) => settings.tracker.dirty_idle_ms = ms,
            Err(_) => tracing::warn!(value = %raw, "ignoring non-numeric GITSCOPE_DIRTY_IDLE_MS"),
        }
    }
    if let Ok(level) = env::var("GITSCOPE_LOG_LEVEL") {
        settings.logging.level = level;
    }
}

fn env_bool(name: &str) -> Option<bool> {
    let raw = env::var(name).ok()?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(var = name, value = %raw, "ignoring non-boolean env override");
            None
        }
    }
}
