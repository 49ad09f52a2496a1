//! Host event loop interface.
//!
//! The driver never waits on a socket itself. When a task needs I/O the
//! scheduler asks the event loop to watch the session's socket; the loop
//! later reports the readiness back through
//! [`Driver::on_ready`](crate::Driver::on_ready).
//!
//! A connection has at most one watch at a time. A new `watch` for the same
//! connection replaces the previous one.

use std::time::Instant;

use pgq_protocol::{Interest, Socket};

use crate::connection::ConnectionId;

/// What the event loop observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
    /// The socket became readable.
    Readable,
    /// The socket became writable.
    Writable,
    /// The watch deadline passed before the socket became ready.
    TimedOut,
}

impl From<Interest> for Readiness {
    fn from(interest: Interest) -> Self {
        match interest {
            Interest::Readable => Self::Readable,
            Interest::Writable => Self::Writable,
        }
    }
}

/// Readiness registration primitives of the host event loop.
pub trait EventLoop {
    /// Report `interest` on `socket` for `connection`, or
    /// [`Readiness::TimedOut`] once `deadline` passes.
    fn watch(
        &self,
        connection: ConnectionId,
        socket: Socket,
        interest: Interest,
        deadline: Option<Instant>,
    );

    /// Drop any watch for `connection`.
    fn unwatch(&self, connection: ConnectionId);
}

impl<L: EventLoop + ?Sized> EventLoop for &L {
    fn watch(
        &self,
        connection: ConnectionId,
        socket: Socket,
        interest: Interest,
        deadline: Option<Instant>,
    ) {
        (**self).watch(connection, socket, interest, deadline);
    }

    fn unwatch(&self, connection: ConnectionId) {
        (**self).unwatch(connection);
    }
}
