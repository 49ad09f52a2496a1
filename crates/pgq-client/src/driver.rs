//! The binding surface.
//!
//! [`Driver`] owns every connection it created and hands out
//! [`ConnectionHandle`]s: copyable capabilities that index its table and
//! never expose the connection itself. Each call validates its arguments,
//! enqueues a task and kicks the scheduler if the connection is free.
//! Outcomes come back through the listener passed to [`Driver::connect`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgq_client::{Config, Driver, Event};
//!
//! let mut driver = Driver::new(connector, event_loop, Config::default());
//! let conn = driver.connect("host=localhost dbname=app", |event| {
//!     if let Event::Completed(done) = event {
//!         println!("task {} finished: {:?}", done.task_id, done.outcome);
//!     }
//! })?;
//! let query = driver.exec(conn, "SELECT 1")?;
//! let close = driver.disconnect(conn)?;
//! ```

use std::collections::HashMap;

use pgq_protocol::Connector;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::connection::{Connection, ConnectionId, Event};
use crate::error::ArgumentError;
use crate::event_loop::{EventLoop, Readiness};
use crate::scheduler::{self, Context, Trigger};
use crate::state::ConnectionStatus;
use crate::task::{Task, TaskId};

/// Capability for one connection owned by a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(ConnectionId);

impl ConnectionHandle {
    /// The connection id this handle refers to.
    #[must_use]
    pub fn id(self) -> ConnectionId {
        self.0
    }
}

/// Owns connections and drives them on the caller's thread.
pub struct Driver<C: Connector, L> {
    connector: C,
    event_loop: L,
    config: Config,
    connections: HashMap<ConnectionId, Connection<C::Session>>,
    next_id: u64,
}

impl<C: Connector, L: EventLoop> Driver<C, L> {
    /// Create a driver with no connections.
    pub fn new(connector: C, event_loop: L, config: Config) -> Self {
        Self {
            connector,
            event_loop,
            config,
            connections: HashMap::new(),
            next_id: 1,
        }
    }

    /// Allocate a connection bound to `listener` and queue a CONNECT task.
    pub fn connect(
        &mut self,
        conninfo: &str,
        listener: impl FnMut(Event) + 'static,
    ) -> Result<ConnectionHandle, ArgumentError> {
        if conninfo.trim().is_empty() {
            return Err(ArgumentError::MissingConnectionString);
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        tracing::debug!(connection = %id, "connection allocated");

        self.connections.insert(id, Connection::new(id, listener));
        self.submit(id, Task::connect(conninfo))?;
        Ok(ConnectionHandle(id))
    }

    /// Queue a DISCONNECT task.
    pub fn disconnect(&mut self, handle: ConnectionHandle) -> Result<TaskId, ArgumentError> {
        self.submit(handle.0, Task::disconnect())
    }

    /// Queue an EXECUTE task.
    pub fn exec(&mut self, handle: ConnectionHandle, query: &str) -> Result<TaskId, ArgumentError> {
        if query.trim().is_empty() {
            return Err(ArgumentError::MissingQuery);
        }
        self.submit(handle.0, Task::execute(query))
    }

    /// True unless the connection is FREE.
    pub fn is_busy(&self, handle: ConnectionHandle) -> Result<bool, ArgumentError> {
        Ok(self.get(handle)?.is_busy())
    }

    /// True unless the connection is BROKEN.
    pub fn is_valid(&self, handle: ConnectionHandle) -> Result<bool, ArgumentError> {
        Ok(self.get(handle)?.is_valid())
    }

    /// Current status of the connection.
    pub fn status(&self, handle: ConnectionHandle) -> Result<ConnectionStatus, ArgumentError> {
        Ok(self.get(handle)?.status())
    }

    /// Number of tasks queued on the connection, including the in-flight one.
    pub fn pending(&self, handle: ConnectionHandle) -> Result<usize, ArgumentError> {
        Ok(self.get(handle)?.pending())
    }

    /// Destroy the connection and invalidate its handle.
    ///
    /// Refused while a task is in flight. Free and broken connections
    /// always have an empty queue, so no task is dropped without its
    /// completion. An open session is closed by dropping it.
    pub fn release(&mut self, handle: ConnectionHandle) -> Result<(), ArgumentError> {
        let conn = self.get(handle)?;
        if conn.status().has_task_in_flight() {
            return Err(ArgumentError::ConnectionInUse(handle.0));
        }
        self.event_loop.unwatch(handle.0);
        self.connections.remove(&handle.0);
        tracing::debug!(connection = %handle.0, "connection released");
        Ok(())
    }

    /// Re-enter the scheduler for a readiness event.
    ///
    /// Events for released connections are ignored.
    pub fn on_ready(&mut self, connection: ConnectionId, readiness: Readiness) {
        let Some(conn) = self.connections.get_mut(&connection) else {
            tracing::trace!(%connection, ?readiness, "readiness for unknown connection");
            return;
        };
        let cx = Context {
            connector: &self.connector,
            event_loop: &self.event_loop,
            config: &self.config,
        };
        scheduler::process(conn, &cx, Trigger::Ready(readiness));
    }

    /// Check if any connection has work in flight or queued.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.connections
            .values()
            .any(|conn| conn.status().has_task_in_flight() || conn.pending() > 0)
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// The event loop this driver registers with.
    pub fn event_loop(&self) -> &L {
        &self.event_loop
    }

    /// The driver configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn get(&self, handle: ConnectionHandle) -> Result<&Connection<C::Session>, ArgumentError> {
        self.connections
            .get(&handle.0)
            .ok_or(ArgumentError::InvalidHandle(handle.0))
    }

    fn submit(&mut self, id: ConnectionId, task: Task) -> Result<TaskId, ArgumentError> {
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(ArgumentError::InvalidHandle(id))?;
        let task_id = task.id();
        conn.enqueue(task);

        // A broken connection has no task in flight either; kicking it
        // fails the new task right away instead of leaving it queued.
        if !conn.status().has_task_in_flight() {
            let cx = Context {
                connector: &self.connector,
                event_loop: &self.event_loop,
                config: &self.config,
            };
            scheduler::process(conn, &cx, Trigger::Kick);
        }
        Ok(task_id)
    }
}

/// A listener that forwards every event into an unbounded channel.
///
/// Lets async callers await completions instead of handling callbacks.
pub fn listener_channel() -> (impl FnMut(Event) + 'static, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = move |event: Event| {
        if tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    };
    (listener, rx)
}
