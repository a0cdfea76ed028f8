//! Error types for the linecheck system

use thiserror::Error;

use crate::item::ItemId;

/// Core error type for linecheck operations
#[derive(Error, Debug)]
pub enum LineCheckError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hardware access errors (sysfs nodes, device files)
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// A kernel-exposed resource is missing
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// External tool invocation failed
    #[error("Tool '{tool}' failed: {reason}")]
    Tool { tool: String, reason: String },

    /// Network collaborator errors (companion server, MAC server, log server)
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parsing errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// A writer handle for this item was already handed out
    #[error("Item {0} already has a writer")]
    ItemClaimed(ItemId),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for linecheck operations
pub type Result<T> = std::result::Result<T, LineCheckError>;

impl From<serde_json::Error> for LineCheckError {
    fn from(err: serde_json::Error) -> Self {
        LineCheckError::Serialization(err.to_string())
    }
}
