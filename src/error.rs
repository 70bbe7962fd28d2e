//! Error taxonomy for the sharded client.

use std::io;

/// Result type used across the crate.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sharded client.
///
/// `Config` is fatal and only raised while building a client. `PoolExhausted`
/// and `Connection` are recoverable from the caller's point of view (retry at
/// the application layer if desired). `Server` carries an error the backend
/// itself raised, propagated unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Missing or malformed configuration; aborts construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// No connection became available within the configured wait.
    #[error("connection pool exhausted for {endpoint}")]
    PoolExhausted { endpoint: String },

    /// Backend unreachable, or the pool serving it has been closed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Network or IO failure while talking to a backend.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Error reply raised by the backend store.
    #[error("server error: {0}")]
    Server(String),

    /// RESP framing violation in a backend reply.
    #[error("protocol error")]
    Protocol,

    /// Reply type did not match what the issued command expects.
    #[error("unexpected reply type")]
    UnexpectedReply,
}

impl ClientError {
    /// True for errors that indicate the underlying connection can no longer
    /// be trusted and must not be returned to the idle set.
    pub(crate) fn poisons_connection(&self) -> bool {
        matches!(self, ClientError::Io(_) | ClientError::Protocol)
    }
}
