//! Error types for schema_delta

use std::path::PathBuf;

use thiserror::Error;

/// Result type for schema_delta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for schema_delta
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Malformed changelog {}: {message}", .path.display())]
    MalformedChangelog { path: PathBuf, message: String },

    #[error("External engine failure running `{command}`: {message}")]
    ExternalEngineFailure { command: String, message: String },

    #[error("Stale temporary changelog from an aborted run: {}", .0.display())]
    StaleTempFile(PathBuf),

    #[error("Transaction failure: {0}")]
    TransactionFailure(String),

    #[error("Model compilation error: {0}")]
    ModelCompilation(String),

    #[error("Unclassified statement: {0}")]
    UnclassifiedStatement(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Build a `MalformedChangelog` error for the document at `path`
    pub fn malformed(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::MalformedChangelog {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Build an `ExternalEngineFailure` error for `command`
    pub fn engine(command: impl ToString, message: impl ToString) -> Self {
        Error::ExternalEngineFailure {
            command: command.to_string(),
            message: message.to_string(),
        }
    }
}

/// Convert Serde JSON errors to schema_delta errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert Serde YAML errors to schema_delta errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to schema_delta errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
