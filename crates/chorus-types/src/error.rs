use thiserror::Error;

/// Errors from repository operations (used by trait definitions in chorus-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,
}

/// Errors from messaging platform operations.
///
/// The core treats every variant as recoverable: it falls back or skips.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Request(String),

    #[error("platform returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("platform authentication failed")]
    Unauthorized,

    #[error("unexpected platform payload: {0}")]
    Decode(String),
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
