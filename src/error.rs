//! Error types for AuraLog
//!
//! This module defines the error types returned by the fallible setup surface of
//! the pipeline: configuration loading, validation, construction and shutdown.
//! Record submission itself never returns an error.

use thiserror::Error;

use crate::sinks::SinkError;

/// Main error type for AuraLog operations
#[derive(Error, Debug)]
pub enum AuraLogError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigFileMissing(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Initialization errors
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// 停机相关错误
    #[error("Shutdown in progress")]
    ShutdownInProgress,

    #[error("Already shutdown")]
    AlreadyShutdown,

    #[error("Shutdown timeout")]
    ShutdownTimeout,

    /// I/O errors (file operations, network, etc.)
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    /// TOML parsing errors
    #[error("TOML parsing error: {source}")]
    TomlError {
        #[from]
        source: toml::de::Error,
    },

    /// Sink construction or delivery errors
    #[error("Sink error: {source}")]
    SinkError {
        #[from]
        source: SinkError,
    },

    /// Validation errors
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for AuraLog operations
pub type Result<T> = std::result::Result<T, AuraLogError>;

impl AuraLogError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a new initialization error
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        Self::InitializationError(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::IoError { .. } => true,
            Self::SinkError { source } => source.is_transient(),
            Self::ShutdownTimeout => false,
            _ => false,
        }
    }

    /// Get the error category for logging purposes
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigError(_) | Self::ConfigFileMissing(_) | Self::InvalidLogLevel(_) => {
                "config"
            }
            Self::InitializationError(_) => "initialization",
            Self::ShutdownInProgress | Self::AlreadyShutdown | Self::ShutdownTimeout => {
                "shutdown"
            }
            Self::IoError { .. } => "io",
            Self::SerializationError { .. } => "serialization",
            Self::TomlError { .. } => "toml",
            Self::SinkError { .. } => "sink",
            Self::ValidationError(_) => "validation",
            Self::InternalError(_) => "internal",
        }
    }
}
