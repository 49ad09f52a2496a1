//! Deterministic event loop.
//!
//! [`ManualEventLoop`] only records watches. Tests decide when a socket
//! becomes ready (or a deadline passes) and feed that back into the driver,
//! which makes every interleaving reproducible.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::time::Instant;

use pgq_client::{ConnectionId, Connector, Driver, EventLoop, Interest, Readiness, Socket};

/// Upper bound on [`pump`] rounds; a scripted session that never finishes
/// would otherwise spin forever.
pub const MAX_PUMP_ROUNDS: usize = 10_000;

/// A registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    /// Socket being watched.
    pub socket: Socket,
    /// Readiness the task waits for.
    pub interest: Interest,
    /// When the task times out.
    pub deadline: Option<Instant>,
}

/// Event loop driven by the test.
#[derive(Debug, Default)]
pub struct ManualEventLoop {
    watches: RefCell<BTreeMap<ConnectionId, Watch>>,
    registrations: Cell<usize>,
}

impl ManualEventLoop {
    /// Create an event loop with no watches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current watch for `connection`.
    #[must_use]
    pub fn watch_for(&self, connection: ConnectionId) -> Option<Watch> {
        self.watches.borrow().get(&connection).copied()
    }

    /// Check if `connection` is being watched.
    #[must_use]
    pub fn is_watching(&self, connection: ConnectionId) -> bool {
        self.watches.borrow().contains_key(&connection)
    }

    /// Number of current watches.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches.borrow().len()
    }

    /// Total number of `watch` calls so far.
    #[must_use]
    pub fn registrations(&self) -> usize {
        self.registrations.get()
    }

    /// Mark every watched socket ready, removing the watches.
    ///
    /// Returned in connection id order.
    pub fn take_ready(&self) -> Vec<(ConnectionId, Readiness)> {
        std::mem::take(&mut *self.watches.borrow_mut())
            .into_iter()
            .map(|(id, watch)| (id, watch.interest.into()))
            .collect()
    }

    /// Remove the watch for `connection` and report it as timed out.
    pub fn expire(&self, connection: ConnectionId) -> Option<(ConnectionId, Readiness)> {
        self.watches
            .borrow_mut()
            .remove(&connection)
            .map(|_| (connection, Readiness::TimedOut))
    }

    /// Remove every watch whose deadline is at or before `now` and report
    /// them as timed out.
    pub fn expire_due(&self, now: Instant) -> Vec<(ConnectionId, Readiness)> {
        let mut watches = self.watches.borrow_mut();
        let due: Vec<ConnectionId> = watches
            .iter()
            .filter(|(_, watch)| watch.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(id, _)| *id)
            .collect();
        due.into_iter()
            .filter_map(|id| watches.remove(&id).map(|_| (id, Readiness::TimedOut)))
            .collect()
    }
}

impl EventLoop for ManualEventLoop {
    fn watch(
        &self,
        connection: ConnectionId,
        socket: Socket,
        interest: Interest,
        deadline: Option<Instant>,
    ) {
        self.registrations.set(self.registrations.get() + 1);
        self.watches.borrow_mut().insert(
            connection,
            Watch {
                socket,
                interest,
                deadline,
            },
        );
    }

    fn unwatch(&self, connection: ConnectionId) {
        self.watches.borrow_mut().remove(&connection);
    }
}

/// Fire every watch until none is left.
///
/// Returns the number of readiness events delivered.
pub fn pump<C: Connector>(driver: &mut Driver<C, ManualEventLoop>) -> usize {
    let mut delivered = 0;
    for _ in 0..MAX_PUMP_ROUNDS {
        let ready = driver.event_loop().take_ready();
        if ready.is_empty() {
            break;
        }
        for (connection, readiness) in ready {
            driver.on_ready(connection, readiness);
            delivered += 1;
        }
    }
    delivered
}

/// Deliver a single round of readiness, one event per watched connection.
pub fn step<C: Connector>(driver: &mut Driver<C, ManualEventLoop>) -> usize {
    let ready = driver.event_loop().take_ready();
    let delivered = ready.len();
    for (connection, readiness) in ready {
        driver.on_ready(connection, readiness);
    }
    delivered
}

/// Time out the in-flight task of `connection`, if it is waiting.
pub fn expire<C: Connector>(driver: &mut Driver<C, ManualEventLoop>, connection: ConnectionId) -> bool {
    match driver.event_loop().expire(connection) {
        Some((connection, readiness)) => {
            driver.on_ready(connection, readiness);
            true
        }
        None => false,
    }
}
