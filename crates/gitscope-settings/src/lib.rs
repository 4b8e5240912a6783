//! # gitscope-settings
//!
//! Configuration management with layered sources for GitScope.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`ScopeSettings::default()`]
//! 2. **User file** — `~/.gitscope/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `GITSCOPE_*` overrides (highest priority)
//!
//! The global singleton is reloadable: when the host reports a settings
//! change, [`reload_settings_from_path`] swaps the cached value so all
//! subsequent [`get_settings`] calls return fresh data. The
//! [`affects_tracker`] helper tells the tracker whether a change
//! invalidates cached per-document state.
//!
//! # Usage
//!
//! ```no_run
//! use gitscope_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("dirty idle: {}ms", settings.tracker.dirty_idle_ms);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::path::Path;
use std::sync::{Arc, RwLock};

/// Global settings singleton.
///
/// Uses `RwLock<Option<Arc<ScopeSettings>>>` instead of `OnceLock` so the
/// cached value can be swapped on reload. Reads are cheap (shared lock +
/// `Arc::clone`), writes only happen on reload which is rare.
static SETTINGS: RwLock<Option<Arc<ScopeSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.gitscope/settings.json` with env
/// var overrides. On subsequent calls, returns the cached value. If loading
/// fails, returns compiled defaults.
///
/// Returns an `Arc` so callers can hold a consistent snapshot even if
/// another thread reloads settings concurrently.
pub fn get_settings() -> Arc<ScopeSettings> {
    // Fast path: read lock
    {
        let guard = SETTINGS.read().expect("settings lock poisoned");
        if let Some(ref s) = *guard {
            return Arc::clone(s);
        }
    }

    // Slow path: first access, take write lock
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    // Double-check after acquiring write lock (another thread may have initialized)
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            ScopeSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Initialize the global settings with a specific value.
///
/// Replaces any previously cached settings. Useful for tests and host
/// startup where the settings are already known.
pub fn init_settings(settings: ScopeSettings) {
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(Arc::new(settings));
}

/// Reload settings from a specific file path.
///
/// Reads the file, deep-merges over defaults, applies env overrides, and
/// atomically swaps the global cache. All subsequent [`get_settings`] calls
/// return the new values. On failure the previous cache is kept.
pub fn reload_settings_from_path(path: &Path) {
    match load_settings_from_path(path) {
        Ok(s) => {
            let mut guard = SETTINGS.write().expect("settings lock poisoned");
            *guard = Some(Arc::new(s));
        }
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "settings reload failed, keeping previous values");
        }
    }
}
