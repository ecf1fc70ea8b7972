use std::io;

use thiserror::Error;

/// Result type used across the Cascade core crate.
pub type Result<T> = std::result::Result<T, CascadeError>;

/// Canonical error representation shared by all services.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("i/o error: {0}")]
    IoError(#[from] io::Error),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("event validation error: {0}")]
    EventValidationError(String),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("rule violation: {0}")]
    RuleViolation(String),

    #[error("execution log error: {0}")]
    ExecutionLogError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("general error: {0}")]
    GeneralError(String),
}

impl From<serde_json::Error> for CascadeError {
    fn from(err: serde_json::Error) -> Self {
        CascadeError::DeserializationError(err.to_string())
    }
}

impl From<anyhow::Error> for CascadeError {
    fn from(err: anyhow::Error) -> Self {
        CascadeError::GeneralError(err.to_string())
    }
}

/// Dedicated configuration error used by the configuration module.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {key}: {message}")]
    InvalidEnvVar { key: String, message: String },
}

impl From<ConfigError> for CascadeError {
    fn from(value: ConfigError) -> Self {
        CascadeError::ConfigError(value.to_string())
    }
}
