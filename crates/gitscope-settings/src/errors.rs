//! Settings error types.

use thiserror::Error;

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Could not read the settings file.
    #[error("Failed to read settings file '{path}': {message}")]
    Io {
        /// File path that failed.
        path: String,
        /// Underlying error message.
        message: String,
    },

    /// The settings file is not valid JSON or has invalid field types.
    #[error("Failed to parse settings file '{path}': {message}")]
    Parse {
        /// File path that failed.
        path: String,
        /// Parser error message.
        message: String,
    },

    /// Internal serialization error.
    #[error("Settings serialization error: {0}")]
    Serialize(String),
}
