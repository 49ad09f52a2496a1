//! Protocol-level error types.

use std::fmt;

use thiserror::Error;

/// Severity reported by the server in an `ErrorResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// The current command failed.
    Error,
    /// The current session is terminated.
    Fatal,
    /// All sessions are terminated.
    Panic,
}

impl Severity {
    /// Parse the non-localized severity field (`V`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ERROR" => Some(Self::Error),
            "FATAL" => Some(Self::Fatal),
            "PANIC" => Some(Self::Panic),
            _ => None,
        }
    }

    /// Get the wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Panic => "PANIC",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerError {
    /// Error severity.
    pub severity: Severity,
    /// Five-character SQLSTATE code.
    pub code: String,
    /// Primary human-readable message.
    pub message: String,
    /// Optional secondary message.
    pub detail: Option<String>,
    /// Optional suggestion.
    pub hint: Option<String>,
}

impl ServerError {
    /// Create a server error with `ERROR` severity.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.into(),
            message: message.into(),
            detail: None,
            hint: None,
        }
    }

    /// Set the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the detail message.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the hint.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// The two-character SQLSTATE class.
    #[must_use]
    pub fn class(&self) -> &str {
        self.code.get(..2).unwrap_or(self.code.as_str())
    }

    /// Check if this error terminates the session.
    ///
    /// Besides FATAL/PANIC severity, the connection exception (`08`) and
    /// invalid authorization (`28`) classes and the operator-intervention
    /// shutdown codes leave the session unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity, Severity::Fatal | Severity::Panic)
            || matches!(self.class(), "08" | "28")
            || matches!(self.code.as_str(), "57P01" | "57P02" | "57P03")
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.message)
    }
}

impl std::error::Error for ServerError {}

/// Errors raised by a [`Session`](crate::Session) or
/// [`Connector`](crate::Connector).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket-level failure (reset, refused, unreachable).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The server reported an error.
    #[error("server error {0}")]
    Server(ServerError),

    /// The startup handshake was rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The server sent something the client library could not understand,
    /// or a command was issued out of sequence.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,
}

impl ProtocolError {
    /// Create a protocol violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Check if this error leaves the session unusable.
    ///
    /// Only non-fatal server errors (a bad query, a constraint violation)
    /// keep the session alive.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Server(err) => err.is_fatal(),
            Self::Io(_) | Self::Authentication(_) | Self::Protocol(_) | Self::ConnectionClosed => {
                true
            }
        }
    }

    /// Get the SQLSTATE code if the server reported one.
    #[must_use]
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Server(err) => Some(err.code.as_str()),
            _ => None,
        }
    }
}

impl From<ServerError> for ProtocolError {
    fn from(err: ServerError) -> Self {
        Self::Server(err)
    }
}

/// Errors from parsing a connection string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnInfoError {
    /// A keyword was not followed by `=`.
    #[error("missing \"=\" after \"{0}\"")]
    MissingEquals(String),

    /// A quoted value was not terminated.
    #[error("unterminated quoted string for \"{0}\"")]
    UnterminatedQuote(String),

    /// A numeric keyword had a non-numeric value.
    #[error("invalid integer value \"{value}\" for \"{key}\"")]
    InvalidInteger {
        /// Keyword.
        key: String,
        /// Offending value.
        value: String,
    },

    /// `port` was out of range.
    #[error("invalid port number: \"{0}\"")]
    InvalidPort(String),

    /// A `postgresql://` URI could not be parsed.
    #[error("invalid connection URI: {0}")]
    InvalidUri(String),

    /// The string contained no keywords at all.
    #[error("empty connection string")]
    Empty,
}
