//! Error types for the projection engine.

use crate::record::Key;

/// Result type alias for projection operations.
pub type Result<T> = std::result::Result<T, DisplayError>;

/// Errors raised while building or configuring a projection.
///
/// Per-item data anomalies (dangling parent keys, duplicate keys) are not
/// errors; they are logged and the projection degrades gracefully.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    /// A required option was not provided.
    #[error("Missing required option '{option}'")]
    MissingOption { option: &'static str },

    /// An option was provided with an unusable value.
    #[error("Invalid value for option '{option}': {message}")]
    InvalidOption { option: &'static str, message: String },

    /// A record's parent chain leads back to itself.
    #[error("Record {key} is its own ancestor")]
    ParentCycle { key: Key },

    /// Records could not be decoded from JSON.
    #[error("Invalid records: {message}")]
    InvalidRecords { message: String },

    /// Options file could not be parsed.
    #[error("Failed to parse display options: {0}")]
    Toml(#[from] toml::de::Error),

    /// Options could not be written as TOML.
    #[error("Failed to serialize display options: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON decoding failed.
    #[error("Failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Options file could not be read.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DisplayError {
    /// Create a missing-option error.
    pub fn missing_option(option: &'static str) -> Self {
        Self::MissingOption { option }
    }

    /// Create an invalid-option error.
    pub fn invalid_option(option: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            message: message.into(),
        }
    }

    /// Create an invalid-records error.
    pub fn invalid_records(message: impl Into<String>) -> Self {
        Self::InvalidRecords {
            message: message.into(),
        }
    }

    /// Create an I/O error.
    pub fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
