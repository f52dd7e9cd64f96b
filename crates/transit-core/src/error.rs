//! Error types for the transit simulation

use thiserror::Error;

/// The main error type for simulation operations
#[derive(Debug, Error)]
pub enum TransitError {
    #[error("Malformed path {id}: {reason}")]
    MalformedPath { id: String, reason: String },

    #[error("Reconciliation conflict: {0}")]
    ReconciliationConflict(String),

    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid time string: {0:?}")]
    InvalidTime(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("JSON error: {0}")]
    JsonError(String),
}

impl TransitError {
    pub fn malformed_path(id: impl Into<String>, reason: impl Into<String>) -> Self {
        TransitError::MalformedPath {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for simulation operations
pub type Result<T> = std::result::Result<T, TransitError>;

impl From<toml::de::Error> for TransitError {
    fn from(err: toml::de::Error) -> Self {
        TransitError::TomlParseError(err.to_string())
    }
}

impl From<serde_json::Error> for TransitError {
    fn from(err: serde_json::Error) -> Self {
        TransitError::JsonError(err.to_string())
    }
}
