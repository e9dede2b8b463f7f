//! Error types for configuration and domain construction.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors raised while loading or validating the controller configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path that was looked up.
        path: String,
    },

    /// The configuration could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A field holds a value the controller cannot run with.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// Human readable explanation.
        reason: String,
    },

    /// The backend table is empty.
    #[error("at least one backend server must be configured")]
    NoBackends,

    /// Two backends share the same address.
    #[error("backend address {0} is configured more than once")]
    DuplicateBackend(Ipv4Addr),

    /// An environment override could not be applied.
    #[error("environment variable {name}: {reason}")]
    EnvError {
        /// Variable name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// IO error while reading or writing a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
