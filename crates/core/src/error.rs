//! Core error types

use thiserror::Error;

/// Core error type for FieldMesh
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration value out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unknown node type discriminant
    #[error("Unknown node type: {0}")]
    UnknownNodeType(u8),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
