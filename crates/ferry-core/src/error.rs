//! Error types for ferry-core

use ferry_router::RouteError;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type alias for ferry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the ferry server core
///
/// Every variant has a stable negative status code (see [`Error::code`]) so
/// that failures can be reported through the C boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid pattern or duplicate route
    #[error(transparent)]
    Route(#[from] RouteError),

    /// Port unavailable or address not bindable
    #[error("Failed to bind {addr}: {source}")]
    BindFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Server was already stopped
    #[error("Server already stopped")]
    AlreadyStopped,

    /// Handle is stale, freed, or was never issued
    #[error("Unknown handle: {0:#x}")]
    UnknownHandle(u64),

    /// Method code outside the wire contract
    #[error("Invalid HTTP method code: {0}")]
    InvalidMethod(u8),

    /// Null pointer, invalid UTF-8, malformed address
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No handler side available to take the request
    #[error("Dispatcher unavailable: {0}")]
    Unavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status code reported across the boundary (0 is success)
    pub fn code(&self) -> i32 {
        match self {
            Error::Route(RouteError::InvalidPattern { .. }) => -1,
            Error::Route(RouteError::DuplicateRoute { .. }) => -2,
            Error::BindFailure { .. } => -3,
            Error::AlreadyStopped => -4,
            Error::UnknownHandle(_) => -5,
            Error::InvalidMethod(_) => -6,
            Error::InvalidArgument(_) => -7,
            Error::Io(_) | Error::Internal(_) => -8,
            Error::Unavailable(_) => -9,
        }
    }
}
