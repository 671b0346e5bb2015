//! Error types for Swifter governance operations

use std::path::PathBuf;

/// Result type for Swifter operations
pub type Result<T> = std::result::Result<T, SwifterError>;

/// Error types for the governance layer.
///
/// A tool that is blocked by policy or by a usage limit is not an error;
/// those outcomes are reported as values so callers can tell them apart
/// from persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum SwifterError {
    /// Process settings could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Month key is not a valid `YYYY-MM` value
    #[error("Invalid month: {0} (expected YYYY-MM)")]
    InvalidMonth(String),

    /// Client identity carries neither a user id nor an IP address
    #[error("Invalid client identity: {0}")]
    InvalidClient(String),

    /// A document could not be written to durable storage
    #[error("Persistence error for {}: {source}", path.display())]
    Persistence {
        /// Document path being written
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
