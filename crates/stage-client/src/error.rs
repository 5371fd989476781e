//! Error types for stage-client

use thiserror::Error;

/// Result type for stage client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by a [`StageClient`](crate::StageClient) implementation
#[derive(Error, Debug)]
pub enum ClientError {
    /// Reading a metadata key failed
    #[error("failed to read metadata {key}: {reason}")]
    MetadataRead { key: String, reason: String },

    /// Writing a metadata key failed
    #[error("failed to write metadata {key}: {reason}")]
    MetadataWrite { key: String, reason: String },

    /// An element of the command stream could not be delivered
    #[error("command stream failed: {0}")]
    CommandStream(String),

    /// Marking commands as handled failed
    #[error("failed to acknowledge commands: {0}")]
    Acknowledge(String),

    /// Backend I/O error
    #[error("stage state I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}
