//! Server errors.

use std::io;
use thiserror::Error;

/// Failure of the HTTP server itself, as opposed to a failed query.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
