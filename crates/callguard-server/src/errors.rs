//! Server error types.

use crate::agent::DispatchError;

/// Errors surfaced while building or starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address attempted.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Other socket I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The agent dispatch client could not be built.
    #[error("agent client: {0}")]
    Agent(#[from] DispatchError),
}
