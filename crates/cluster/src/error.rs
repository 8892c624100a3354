//! Error types for the cluster crate.

use thiserror::Error;

/// Result type alias for the cluster crate.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Failures reported by a [`Store`](crate::store::Store).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store '{store}' failed: {reason}")]
    Failed { store: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ClusterError {
    /// The placement layer rejected the parameters of a new table.
    #[error(transparent)]
    Placement(#[from] corelib::Error),

    /// Local processing of a cache could not be stopped.
    #[error("failed to stop cache '{cache}': {reason}")]
    StopFailed { cache: String, reason: String },

    #[error("failed to start cache '{cache}': {reason}")]
    StartFailed { cache: String, reason: String },

    #[error("cache '{0}' is not running")]
    NotRunning(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("management registration failed: {0}")]
    Management(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A command frame could not be decoded.
    #[error("malformed command: {0}")]
    Malformed(String),
}
