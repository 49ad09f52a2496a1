//! Test fixture utilities.

use std::cell::RefCell;
use std::rc::Rc;

use pgq_client::{Completion, Event, TaskId};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every event delivered to a connection listener.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<Event>>>,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A listener appending to this log.
    pub fn listener(&self) -> impl FnMut(Event) + 'static {
        let events = Rc::clone(&self.events);
        move |event| events.borrow_mut().push(event)
    }

    /// All events so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Completions so far, in delivery order.
    #[must_use]
    pub fn completions(&self) -> Vec<Completion> {
        self.events
            .borrow()
            .iter()
            .filter_map(Event::completion)
            .cloned()
            .collect()
    }

    /// Task ids in completion order.
    #[must_use]
    pub fn completed_ids(&self) -> Vec<TaskId> {
        self.completions().iter().map(|c| c.task_id).collect()
    }

    /// The completion of `task`, if delivered.
    #[must_use]
    pub fn completion(&self, task: TaskId) -> Option<Completion> {
        self.completions().into_iter().find(|c| c.task_id == task)
    }

    /// Number of `Broken` events.
    #[must_use]
    pub fn broken_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, Event::Broken { .. }))
            .count()
    }

    /// Number of events so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Check if no event was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Remove and return all events.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}
