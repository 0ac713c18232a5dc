//! Error types for the Word Duel sync client.

use thiserror::Error;

use crate::api::ApiError;

/// Errors that can occur when using the sync client.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Opening the push channel failed.
    #[error("connect error: {0}")]
    Connect(String),

    /// The push endpoint could not be parsed into a URI.
    #[error("invalid push endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// The endpoint as supplied by the caller.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Failed to serialize or deserialize a message or snapshot.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request/response API returned a structured error.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The offline store could not be read or written.
    #[error("offline store error: {0}")]
    Store(String),

    /// The game view was unmounted; no further work is performed.
    #[error("game view has been unmounted")]
    Unmounted,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for sync client operations.
pub type Result<T> = std::result::Result<T, SyncError>;
