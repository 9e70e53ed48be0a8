//! Error types for the AERIS node.

use thiserror::Error;

/// Errors that can occur while configuring the node or processing a poll.
///
/// Only `Configuration` stops a poll outright. Everything from `Transport`
/// down is contained at the query or field where it happened.
#[derive(Debug, Error)]
pub enum AerisError {
    /// Required parameter unset or a parameter holds an unusable value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP call failed or the body was not JSON
    #[error("Transport error: {0}")]
    Transport(String),

    /// Expected key absent from an otherwise valid payload
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Coded weather string without three `:` separated segments
    #[error("Malformed weather code: {0:?}")]
    MalformedCode(String),

    /// Value present but not a finite number
    #[error("Cannot coerce {field} to a number: {value}")]
    Coercion { field: String, value: String },

    /// Failed to parse configuration YAML/JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Entity create/delete rejected by the registry
    #[error("Entity error: {0}")]
    Entity(String),

    /// Zenoh communication error
    #[error("Zenoh error: {0}")]
    Zenoh(String),

    /// Generic I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AerisError>;

impl From<serde_yaml::Error> for AerisError {
    fn from(err: serde_yaml::Error) -> Self {
        AerisError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for AerisError {
    fn from(err: reqwest::Error) -> Self {
        AerisError::Transport(err.to_string())
    }
}

impl From<zenoh::Error> for AerisError {
    fn from(err: zenoh::Error) -> Self {
        AerisError::Zenoh(err.to_string())
    }
}
