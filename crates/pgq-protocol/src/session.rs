//! Non-blocking session interface.
//!
//! A [`Session`] is one connection to the server, owned by exactly one
//! driver connection. All of its methods must return immediately: when an
//! operation cannot make further progress without I/O, it returns
//! [`Progress::Pending`] naming the readiness it is waiting for.
//!
//! The protocol is half-duplex. A session carries at most one outstanding
//! command; callers must not issue `send_query` before the previous
//! `poll_result` returned [`Progress::Ready`] or an error.

use std::fmt;

use crate::conninfo::ConnParams;
use crate::error::ProtocolError;
use crate::result::QueryOutcome;

/// An OS socket descriptor suitable for readiness registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Socket(pub i32);

impl Socket {
    /// Get the raw descriptor.
    #[must_use]
    pub fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for Socket {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0
    }
}

/// The readiness an in-progress operation is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    /// Wait until the socket is readable.
    Readable,
    /// Wait until the socket is writable.
    Writable,
}

impl Interest {
    /// Check if this is read interest.
    #[must_use]
    pub fn is_readable(self) -> bool {
        matches!(self, Self::Readable)
    }

    /// Check if this is write interest.
    #[must_use]
    pub fn is_writable(self) -> bool {
        matches!(self, Self::Writable)
    }
}

/// Outcome of a single non-blocking step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress<T> {
    /// The operation finished with a value.
    Ready(T),
    /// The operation needs the socket to become ready before continuing.
    Pending(Interest),
}

impl<T> Progress<T> {
    /// Check if the operation finished.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Map the finished value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Progress<U> {
        match self {
            Self::Ready(value) => Progress::Ready(f(value)),
            Self::Pending(interest) => Progress::Pending(interest),
        }
    }
}

/// A non-blocking connection to the server.
pub trait Session {
    /// The socket to register with the event loop.
    ///
    /// May change during connection establishment (e.g. when the client
    /// library falls back to another host address), so callers should read
    /// it again after every step.
    fn socket(&self) -> Socket;

    /// Advance the startup handshake (TCP connect, TLS, authentication).
    fn poll_connect(&mut self) -> Result<Progress<()>, ProtocolError>;

    /// Queue a simple query for sending.
    ///
    /// This only buffers the message; [`Session::flush`] writes it out.
    fn send_query(&mut self, query: &str) -> Result<(), ProtocolError>;

    /// Write buffered outgoing data.
    ///
    /// Returns `Pending(Writable)` while data remains to be written.
    fn flush(&mut self) -> Result<Progress<()>, ProtocolError>;

    /// Consume input and collect the results of the outstanding query.
    ///
    /// Returns `Ready` once the server signalled the end of the command.
    /// A query-level server error is reported as
    /// [`ProtocolError::Server`]; the session remains usable afterwards
    /// unless [`ProtocolError::is_fatal`] says otherwise.
    fn poll_result(&mut self) -> Result<Progress<QueryOutcome>, ProtocolError>;

    /// Send the termination message and shut the socket down.
    fn close(&mut self) -> Result<Progress<()>, ProtocolError>;
}

/// Factory for new sessions.
pub trait Connector {
    /// Session type produced by this connector.
    type Session: Session;

    /// Start a non-blocking connection attempt.
    ///
    /// The returned session has issued its first I/O; the caller drives it
    /// further with [`Session::poll_connect`].
    fn start(&self, params: &ConnParams) -> Result<Self::Session, ProtocolError>;
}

impl<C: Connector + ?Sized> Connector for &C {
    type Session = C::Session;

    fn start(&self, params: &ConnParams) -> Result<Self::Session, ProtocolError> {
        (**self).start(params)
    }
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn socket(&self) -> Socket {
        (**self).socket()
    }

    fn poll_connect(&mut self) -> Result<Progress<()>, ProtocolError> {
        (**self).poll_connect()
    }

    fn send_query(&mut self, query: &str) -> Result<(), ProtocolError> {
        (**self).send_query(query)
    }

    fn flush(&mut self) -> Result<Progress<()>, ProtocolError> {
        (**self).flush()
    }

    fn poll_result(&mut self) -> Result<Progress<QueryOutcome>, ProtocolError> {
        (**self).poll_result()
    }

    fn close(&mut self) -> Result<Progress<()>, ProtocolError> {
        (**self).close()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_map() {
        let ready: Progress<u32> = Progress::Ready(2);
        assert_eq!(ready.map(|v| v * 2), Progress::Ready(4));

        let pending: Progress<u32> = Progress::Pending(Interest::Writable);
        assert_eq!(pending.map(|v| v * 2), Progress::Pending(Interest::Writable));
    }

    #[test]
    fn test_interest_predicates() {
        assert!(Interest::Readable.is_readable());
        assert!(!Interest::Readable.is_writable());
        assert!(Interest::Writable.is_writable());
    }

    #[test]
    fn test_socket_display() {
        assert_eq!(Socket(7).to_string(), "fd:7");
        assert_eq!(Socket(7).raw(), 7);
    }
}
