//! Error types for the conflict engine

use offsync_core::ports::RemoteError;
use thiserror::Error;

/// Errors that can occur during conflict detection and resolution
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The conflict record carries no server snapshot to resolve against
    #[error("conflict for {0} has no server snapshot")]
    MissingRemote(String),

    /// The payloads cannot be combined by the merger registered for the key
    #[error("payloads for {0} cannot be merged")]
    NotMergeable(String),

    /// Pushing the resolved payload to the server failed
    #[error("push to server failed: {0}")]
    PushFailed(#[from] RemoteError),

    /// Invalid glob pattern in a strategy rule
    #[error("invalid glob pattern: {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
