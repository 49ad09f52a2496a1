//! Queued operations.
//!
//! A [`Task`] is created by the binding surface, sits in its connection's
//! queue until it reaches the head and finishes, and is then consumed by
//! [`Task::complete`] into the [`Completion`] handed to the listener.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use pgq_protocol::QueryOutcome;

use crate::error::Error;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier.
///
/// Ids are strictly increasing for the lifetime of the process and never
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of a task, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Open the session.
    Connect,
    /// Close the session.
    Disconnect,
    /// Run a query.
    Execute,
}

impl Action {
    /// Get a lowercase name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Execute => "execute",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a task asks for.
#[derive(Clone, PartialEq, Eq)]
pub enum Request {
    /// Open a session with a libpq connection string.
    Connect {
        /// Connection string.
        conninfo: String,
    },
    /// Close the session.
    Disconnect,
    /// Run a simple query.
    Execute {
        /// SQL text.
        query: String,
    },
}

impl Request {
    /// The kind of this request.
    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Self::Connect { .. } => Action::Connect,
            Self::Disconnect => Action::Disconnect,
            Self::Execute { .. } => Action::Execute,
        }
    }
}

// Connection strings carry passwords; keep them out of logs.
impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { .. } => f
                .debug_struct("Connect")
                .field("conninfo", &"<redacted>")
                .finish(),
            Self::Disconnect => f.write_str("Disconnect"),
            Self::Execute { query } => f.debug_struct("Execute").field("query", query).finish(),
        }
    }
}

/// A queued operation.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    request: Request,
}

impl Task {
    /// Create a task with the next id.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self {
            id: TaskId::next(),
            request,
        }
    }

    /// Create a CONNECT task.
    #[must_use]
    pub fn connect(conninfo: impl Into<String>) -> Self {
        Self::new(Request::Connect {
            conninfo: conninfo.into(),
        })
    }

    /// Create a DISCONNECT task.
    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(Request::Disconnect)
    }

    /// Create an EXECUTE task.
    #[must_use]
    pub fn execute(query: impl Into<String>) -> Self {
        Self::new(Request::Execute {
            query: query.into(),
        })
    }

    /// Task id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Task kind.
    #[must_use]
    pub fn action(&self) -> Action {
        self.request.action()
    }

    /// The request payload.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Finish the task.
    ///
    /// Consumes the task, so an outcome can only ever be attached once.
    #[must_use]
    pub fn complete(self, outcome: Result<Reply, Error>) -> Completion {
        Completion {
            task_id: self.id,
            action: self.request.action(),
            outcome,
        }
    }
}

/// Successful task results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The session is established.
    Connected,
    /// The session is closed.
    Disconnected,
    /// The query finished.
    Query(QueryOutcome),
}

impl Reply {
    /// Get the query outcome, if this is a query reply.
    #[must_use]
    pub fn into_query(self) -> Option<QueryOutcome> {
        match self {
            Self::Query(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// The final state of a task, delivered to the connection listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Id returned when the task was enqueued.
    pub task_id: TaskId,
    /// Kind of the finished task.
    pub action: Action,
    /// Result or error. Exactly one of the two is present.
    pub outcome: Result<Reply, Error>,
}

impl Completion {
    /// Check if the task succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Get the error, if the task failed.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_strictly_increase() {
        let a = Task::connect("dbname=x");
        let b = Task::execute("SELECT 1");
        let c = Task::disconnect();
        assert!(a.id() < b.id());
        assert!(b.id() < c.id());
    }

    #[test]
    fn test_action_of_request() {
        assert_eq!(Task::connect("dbname=x").action(), Action::Connect);
        assert_eq!(Task::execute("SELECT 1").action(), Action::Execute);
        assert_eq!(Task::disconnect().action(), Action::Disconnect);
    }

    #[test]
    fn test_complete_carries_id_and_action() {
        let task = Task::execute("SELECT 1");
        let id = task.id();
        let completion = task.complete(Err(Error::NotConnected));
        assert_eq!(completion.task_id, id);
        assert_eq!(completion.action, Action::Execute);
        assert!(!completion.is_ok());
        assert_eq!(completion.error(), Some(&Error::NotConnected));
    }

    #[test]
    fn test_connect_request_debug_is_redacted() {
        let task = Task::connect("dbname=x password=hunter2");
        let debug = format!("{task:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_reply_into_query() {
        assert!(Reply::Connected.into_query().is_none());
        assert!(Reply::Query(QueryOutcome::default()).into_query().is_some());
    }
}
