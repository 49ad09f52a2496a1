//! Client error types.
//!
//! Three kinds of failure reach the caller:
//!
//! - [`ArgumentError`]: the call itself was malformed. Returned synchronously
//!   by the [`Driver`](crate::Driver); no task is created.
//! - [`Error`] other than `ConnectionBroken`: a single task failed but the
//!   connection is still usable.
//! - [`Error::ConnectionBroken`]: the session is gone. The in-flight task and
//!   every task queued behind it fail with this error.

use std::time::Duration;

use pgq_protocol::{ConnInfoError, ProtocolError, ServerError};
use thiserror::Error;

use crate::connection::ConnectionId;

/// Errors raised synchronously by the binding surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    /// The handle does not name a live connection.
    #[error("invalid connection handle {0}")]
    InvalidHandle(ConnectionId),

    /// `connect` was called without a connection string.
    #[error("connection string must not be empty")]
    MissingConnectionString,

    /// `exec` was called without a query.
    #[error("query must not be empty")]
    MissingQuery,

    /// `release` was called while a task is still in flight.
    #[error("connection {0} still has a task in flight")]
    ConnectionInUse(ConnectionId),
}

/// Why a connection became unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokenReason {
    /// Socket-level failure.
    #[error("IO error: {0}")]
    Io(String),
    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,
    /// The client library hit a protocol violation.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The startup handshake was rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The server reported a session-terminating error.
    #[error("server error {0}")]
    Server(ServerError),
    /// The in-flight task did not finish before its deadline.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    /// The connection string could not be parsed.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(ConnInfoError),
}

impl From<ProtocolError> for BrokenReason {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(io) => Self::Io(io.to_string()),
            ProtocolError::Server(server) => Self::Server(server),
            ProtocolError::Authentication(msg) => Self::Authentication(msg),
            ProtocolError::Protocol(msg) => Self::Protocol(msg),
            ProtocolError::ConnectionClosed => Self::Closed,
        }
    }
}

impl From<ConnInfoError> for BrokenReason {
    fn from(err: ConnInfoError) -> Self {
        Self::InvalidConnectionString(err)
    }
}

/// Errors delivered with a task's completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The server rejected the statement. The connection is still usable.
    #[error("server error {0}")]
    Server(ServerError),

    /// The task needs a session but the connection has none
    /// (never connected, or already disconnected).
    #[error("not connected")]
    NotConnected,

    /// CONNECT was queued on a connection that already has a session.
    #[error("already connected")]
    AlreadyConnected,

    /// The connection is unusable.
    #[error("connection broken: {0}")]
    ConnectionBroken(BrokenReason),
}

impl Error {
    /// Check if only this task failed and the connection remains valid.
    #[must_use]
    pub fn is_task_error(&self) -> bool {
        !self.is_connection_broken()
    }

    /// Check if this error means the connection is unusable.
    #[must_use]
    pub fn is_connection_broken(&self) -> bool {
        matches!(self, Self::ConnectionBroken(_))
    }

    /// Get the SQLSTATE code if the server reported one.
    #[must_use]
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Server(err) | Self::ConnectionBroken(BrokenReason::Server(err)) => {
                Some(err.code.as_str())
            }
            _ => None,
        }
    }

    /// Get the broken reason if the connection is unusable.
    #[must_use]
    pub fn broken_reason(&self) -> Option<&BrokenReason> {
        match self {
            Self::ConnectionBroken(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Result type for task outcomes.
pub type Result<T> = std::result::Result<T, Error>;
