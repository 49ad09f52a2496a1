//! The connection entity: status, session and task queue.
//!
//! A [`Connection`] only stores state. Queueing never starts work;
//! the [`scheduler`](crate::scheduler) is the only code that moves tasks
//! out of the queue or touches the session.

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use crate::error::BrokenReason;
use crate::state::ConnectionStatus;
use crate::task::{Completion, Task};

/// Identifies a connection within its driver. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    /// Get the numeric id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications delivered to a connection's listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A task finished. Fired exactly once per task, in enqueue order.
    Completed(Completion),
    /// The connection went BROKEN. Fired once, right after the completion
    /// of the task that broke it and before queued tasks are failed.
    Broken {
        /// What broke the connection.
        reason: BrokenReason,
    },
}

impl Event {
    /// Get the completion, if this is a completion event.
    #[must_use]
    pub fn completion(&self) -> Option<&Completion> {
        match self {
            Self::Completed(completion) => Some(completion),
            Self::Broken { .. } => None,
        }
    }
}

/// Connection-level callback.
pub type Listener = Box<dyn FnMut(Event)>;

/// One logical connection and its pending operations.
pub struct Connection<S> {
    pub(crate) id: ConnectionId,
    pub(crate) status: ConnectionStatus,
    pub(crate) session: Option<S>,
    pub(crate) queue: VecDeque<Task>,
    pub(crate) listener: Listener,
    pub(crate) broken: Option<BrokenReason>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) started_at: Option<Instant>,
}

impl<S> Connection<S> {
    /// Create a FREE connection with an empty queue and no session.
    pub fn new(id: ConnectionId, listener: impl FnMut(Event) + 'static) -> Self {
        Self {
            id,
            status: ConnectionStatus::Free,
            session: None,
            queue: VecDeque::new(),
            listener: Box::new(listener),
            broken: None,
            deadline: None,
            started_at: None,
        }
    }

    /// Connection id.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Append a task to the tail of the queue.
    ///
    /// Does not start processing; whoever enqueues must kick the scheduler
    /// if the connection is free.
    pub fn enqueue(&mut self, task: Task) {
        tracing::trace!(
            connection = %self.id,
            task = %task.id(),
            action = %task.action(),
            queued = self.queue.len() + 1,
            "task enqueued"
        );
        self.queue.push_back(task);
    }

    /// True unless the status is FREE.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.status.is_busy()
    }

    /// True unless the status is BROKEN.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status.is_valid()
    }

    /// The in-flight task, or the next one to start.
    #[must_use]
    pub fn head(&self) -> Option<&Task> {
        self.queue.front()
    }

    /// Number of queued tasks, including the in-flight one.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Check if a session is currently held.
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Why the connection broke, if it did.
    #[must_use]
    pub fn broken_reason(&self) -> Option<&BrokenReason> {
        self.broken.as_ref()
    }

    /// Deadline of the in-flight task.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn notify(&mut self, event: Event) {
        (self.listener)(event);
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("has_session", &self.session.is_some())
            .field("queue", &self.queue)
            .field("broken", &self.broken)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
