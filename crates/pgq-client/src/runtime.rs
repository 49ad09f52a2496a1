//! Tokio-backed event loop.
//!
//! [`TokioEventLoop`] turns each `watch` into a small Tokio task that waits
//! for the socket through [`AsyncFd`] (bounded by the task deadline) and
//! posts the observed [`Readiness`] to a channel. The driver stays on the
//! caller's thread: it pulls events from [`ReadinessEvents`] and re-enters
//! the scheduler with them.
//!
//! ```rust,ignore
//! let (event_loop, mut events) = TokioEventLoop::new();
//! let mut driver = Driver::new(connector, event_loop, Config::default());
//! let (listener, mut completions) = listener_channel();
//! let conn = driver.connect("dbname=app", listener)?;
//! driver.exec(conn, "SELECT 1")?;
//! driver.run_until_idle(&mut events).await;
//! ```
//!
//! Must be used from within a Tokio runtime with IO and time enabled.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Instant;

use pgq_protocol::{Connector, Interest, Socket};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::ConnectionId;
use crate::driver::Driver;
use crate::event_loop::{EventLoop, Readiness};

type ReadinessMessage = (ConnectionId, Readiness);

/// Event loop that waits for sockets on the current Tokio runtime.
pub struct TokioEventLoop {
    tx: mpsc::UnboundedSender<ReadinessMessage>,
    watches: RefCell<HashMap<ConnectionId, JoinHandle<()>>>,
}

/// Readiness reported by a [`TokioEventLoop`].
#[derive(Debug)]
pub struct ReadinessEvents {
    rx: mpsc::UnboundedReceiver<ReadinessMessage>,
}

impl ReadinessEvents {
    /// Wait for the next readiness event.
    ///
    /// Returns `None` once the event loop is dropped.
    pub async fn next(&mut self) -> Option<(ConnectionId, Readiness)> {
        self.rx.recv().await
    }

    /// Take an event that is already available.
    pub fn try_next(&mut self) -> Option<(ConnectionId, Readiness)> {
        self.rx.try_recv().ok()
    }
}

impl TokioEventLoop {
    /// Create an event loop and the stream its readiness is reported on.
    #[must_use]
    pub fn new() -> (Self, ReadinessEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_loop = Self {
            tx,
            watches: RefCell::new(HashMap::new()),
        };
        (event_loop, ReadinessEvents { rx })
    }

    /// Number of outstanding watches.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches
            .borrow()
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl EventLoop for TokioEventLoop {
    fn watch(
        &self,
        connection: ConnectionId,
        socket: Socket,
        interest: Interest,
        deadline: Option<Instant>,
    ) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let readiness = wait_for(socket, interest, deadline).await;
            if tx.send((connection, readiness)).is_err() {
                tracing::trace!(%connection, "readiness receiver dropped");
            }
        });
        if let Some(previous) = self.watches.borrow_mut().insert(connection, handle) {
            previous.abort();
        }
    }

    fn unwatch(&self, connection: ConnectionId) {
        if let Some(handle) = self.watches.borrow_mut().remove(&connection) {
            handle.abort();
        }
    }
}

impl Drop for TokioEventLoop {
    fn drop(&mut self) {
        for (_, handle) in self.watches.get_mut().drain() {
            handle.abort();
        }
    }
}

async fn wait_for(socket: Socket, interest: Interest, deadline: Option<Instant>) -> Readiness {
    let tokio_interest = match interest {
        Interest::Readable => tokio::io::Interest::READABLE,
        Interest::Writable => tokio::io::Interest::WRITABLE,
    };
    let fd = match AsyncFd::with_interest(socket, tokio_interest) {
        Ok(fd) => fd,
        Err(err) => {
            // Let the session hit the error itself on its next step.
            tracing::warn!(%socket, error = %err, "failed to register socket");
            return interest.into();
        }
    };

    let ready = async {
        let result = match interest {
            Interest::Readable => fd.readable().await.map(drop),
            Interest::Writable => fd.writable().await.map(drop),
        };
        if let Err(err) = result {
            tracing::debug!(%socket, error = %err, "readiness wait failed");
        }
    };

    match deadline {
        Some(deadline) => {
            let deadline = tokio::time::Instant::from_std(deadline);
            match tokio::time::timeout_at(deadline, ready).await {
                Ok(()) => interest.into(),
                Err(_) => Readiness::TimedOut,
            }
        }
        None => {
            ready.await;
            interest.into()
        }
    }
}

impl<C: Connector> Driver<C, TokioEventLoop> {
    /// Dispatch readiness events until no connection has work left.
    pub async fn run_until_idle(&mut self, events: &mut ReadinessEvents) {
        while self.has_pending_work() {
            let Some((connection, readiness)) = events.next().await else {
                break;
            };
            self.on_ready(connection, readiness);
        }
    }
}
