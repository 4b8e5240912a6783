//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the host's
//! JSON wire format. Each type implements [`Default`] with production
//! default values. `#[serde(default)]` allows partial JSON — missing fields
//! get their default value during deserialization.

use serde::{Deserialize, Serialize};

/// Root settings type for GitScope.
///
/// Loaded from `~/.gitscope/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
///
/// # JSON Format
///
/// ```json
/// {
///   "version": "0.1.0",
///   "blame": { "ignoreWhitespace": true },
///   "tracker": { "dirtyIdleMs": 250 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopeSettings {
    /// Settings schema version.
    pub version: String,
    /// Blame derivation settings.
    pub blame: BlameSettings,
    /// Advanced/caching settings.
    pub advanced: AdvancedSettings,
    /// Tracker timing settings.
    pub tracker: TrackerIdleSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            blame: BlameSettings::default(),
            advanced: AdvancedSettings::default(),
            tracker: TrackerIdleSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Blame derivation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlameSettings {
    /// Ignore whitespace-only changes when attributing lines.
    pub ignore_whitespace: bool,
}

impl Default for BlameSettings {
    fn default() -> Self {
        Self {
            ignore_whitespace: false,
        }
    }
}

/// Advanced settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedSettings {
    /// Whether per-document derived state may be cached between edits.
    pub caching_enabled: bool,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            caching_enabled: true,
        }
    }
}

/// Tracker timing settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerIdleSettings {
    /// Quiet period before a dirty→clean transition is published, in ms.
    /// Becoming dirty is always published immediately.
    pub dirty_idle_ms: u64,
}

impl Default for TrackerIdleSettings {
    fn default() -> Self {
        Self { dirty_idle_ms: 250 }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default tracing filter directive when `GITSCOPE_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ScopeSettings {
    /// Correct invalid values in place rather than rejecting the file.
    ///
    /// Called automatically during loading. A zero debounce window would
    /// turn every keystroke into a publish, so it is clamped up with a
    /// warning.
    pub fn validate(&mut self) {
        if self.tracker.dirty_idle_ms == 0 {
            tracing::warn!("tracker.dirtyIdleMs of 0 disables coalescing, clamped to 250");
            self.tracker.dirty_idle_ms = 250;
        }
    }
}

/// Settings keys that, when changed, invalidate every document's cached
/// derived state.
const TRACKER_SENSITIVE_KEYS: &[&str] = &["blame.ignoreWhitespace", "advanced.cachingEnabled"];

/// Whether a configuration change requires a tracker-wide reset.
///
/// Matches either the exact key or a section prefix (a host reporting
/// `blame` as changed covers `blame.ignoreWhitespace`).
#[must_use]
pub fn affects_tracker(changed_keys: &[String]) -> bool {
    changed_keys.iter().any(|changed| {
        TRACKER_SENSITIVE_KEYS
            .iter()
            .any(|k| k == changed || k.starts_with(&format!("{changed}.")))
    })
}
