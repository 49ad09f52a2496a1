//! Per-action drivers.
//!
//! Each action kind implements the same two-phase contract: `begin` starts
//! the operation against the session and `advance` moves it forward after a
//! readiness event. Neither ever blocks. Handlers only translate session
//! progress into a [`Step`]; registering interest with the event loop and
//! moving the task out of the queue is the scheduler's job.

use std::time::Instant;

use pgq_protocol::{ConnParams, Connector, Interest, Progress, ProtocolError, Session};

use crate::error::{BrokenReason, Error};
use crate::task::{Action, Reply, Request, Task};

/// Result of a `begin` or `advance` call.
#[derive(Debug)]
pub enum Step {
    /// Waiting for the socket.
    Pending(Interest),
    /// Finished successfully.
    Done(Reply),
    /// Finished with an error.
    Failed(Failure),
}

/// How a task failed.
#[derive(Debug)]
pub enum Failure {
    /// Only this task failed; the connection stays usable.
    Task(Error),
    /// The connection is unusable.
    Fatal(BrokenReason),
}

impl Failure {
    /// Classify a session error.
    pub fn from_protocol(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Server(server) if !server.is_fatal() => Self::Task(Error::Server(server)),
            err => Self::Fatal(err.into()),
        }
    }
}

/// The slice of connection state a handler may touch.
pub(crate) struct ActionCx<'a, C: Connector> {
    pub(crate) session: &'a mut Option<C::Session>,
    pub(crate) deadline: &'a mut Option<Instant>,
    pub(crate) connector: &'a C,
}

pub(crate) trait ActionHandler<C: Connector> {
    fn begin(&self, cx: &mut ActionCx<'_, C>, task: &Task) -> Step;

    fn advance(&self, cx: &mut ActionCx<'_, C>, task: &Task) -> Step;
}

/// Start `task` with the handler for its action kind.
pub(crate) fn begin<C: Connector>(cx: &mut ActionCx<'_, C>, task: &Task) -> Step {
    match task.action() {
        Action::Connect => ConnectHandler.begin(cx, task),
        Action::Disconnect => DisconnectHandler.begin(cx, task),
        Action::Execute => ExecuteHandler.begin(cx, task),
    }
}

/// Drive the in-flight `task` after a readiness event.
pub(crate) fn advance<C: Connector>(cx: &mut ActionCx<'_, C>, task: &Task) -> Step {
    match task.action() {
        Action::Connect => ConnectHandler.advance(cx, task),
        Action::Disconnect => DisconnectHandler.advance(cx, task),
        Action::Execute => ExecuteHandler.advance(cx, task),
    }
}

pub(crate) struct ConnectHandler;

impl ConnectHandler {
    fn poll<S: Session>(session: &mut S) -> Step {
        match session.poll_connect() {
            Ok(Progress::Ready(())) => Step::Done(Reply::Connected),
            Ok(Progress::Pending(interest)) => Step::Pending(interest),
            // A failed handshake leaves nothing to retry on; every error is fatal.
            Err(err) => Step::Failed(Failure::Fatal(err.into())),
        }
    }
}

impl<C: Connector> ActionHandler<C> for ConnectHandler {
    fn begin(&self, cx: &mut ActionCx<'_, C>, task: &Task) -> Step {
        let Request::Connect { conninfo } = task.request() else {
            return mismatched(task);
        };
        if cx.session.is_some() {
            return Step::Failed(Failure::Task(Error::AlreadyConnected));
        }

        let params = match ConnParams::parse(conninfo) {
            Ok(params) => params,
            Err(err) => return Step::Failed(Failure::Fatal(err.into())),
        };
        // The keyword replaces the configured timeout, `0` included.
        if let Some(timeout) = params.connect_timeout {
            *cx.deadline = timeout.duration().map(|timeout| Instant::now() + timeout);
        }

        tracing::debug!(
            host = params.host.as_deref().unwrap_or("<default>"),
            port = params.port_or_default(),
            dbname = params.dbname.as_deref().unwrap_or("<default>"),
            "starting connection"
        );

        match cx.connector.start(&params) {
            Ok(session) => Self::poll(cx.session.insert(session)),
            Err(err) => Step::Failed(Failure::Fatal(err.into())),
        }
    }

    fn advance(&self, cx: &mut ActionCx<'_, C>, _task: &Task) -> Step {
        match cx.session.as_mut() {
            Some(session) => Self::poll(session),
            None => Step::Failed(Failure::Fatal(BrokenReason::Closed)),
        }
    }
}

pub(crate) struct DisconnectHandler;

impl DisconnectHandler {
    fn close<S: Session>(session: &mut Option<S>) -> Step {
        let Some(open) = session.as_mut() else {
            return Step::Failed(Failure::Task(Error::NotConnected));
        };
        match open.close() {
            Ok(Progress::Ready(())) => {
                session.take();
                Step::Done(Reply::Disconnected)
            }
            Ok(Progress::Pending(interest)) => Step::Pending(interest),
            Err(err) => Step::Failed(Failure::Fatal(err.into())),
        }
    }
}

impl<C: Connector> ActionHandler<C> for DisconnectHandler {
    fn begin(&self, cx: &mut ActionCx<'_, C>, _task: &Task) -> Step {
        Self::close(&mut *cx.session)
    }

    fn advance(&self, cx: &mut ActionCx<'_, C>, _task: &Task) -> Step {
        Self::close(&mut *cx.session)
    }
}

pub(crate) struct ExecuteHandler;

impl ExecuteHandler {
    fn collect<S: Session>(session: &mut S) -> Step {
        match session.flush() {
            Ok(Progress::Ready(())) => {}
            Ok(Progress::Pending(interest)) => return Step::Pending(interest),
            Err(err) => return Step::Failed(Failure::from_protocol(err)),
        }
        match session.poll_result() {
            Ok(Progress::Ready(outcome)) => Step::Done(Reply::Query(outcome)),
            Ok(Progress::Pending(interest)) => Step::Pending(interest),
            Err(err) => Step::Failed(Failure::from_protocol(err)),
        }
    }
}

impl<C: Connector> ActionHandler<C> for ExecuteHandler {
    fn begin(&self, cx: &mut ActionCx<'_, C>, task: &Task) -> Step {
        let Request::Execute { query } = task.request() else {
            return mismatched(task);
        };
        let Some(session) = cx.session.as_mut() else {
            return Step::Failed(Failure::Task(Error::NotConnected));
        };

        if let Err(err) = session.send_query(query) {
            return Step::Failed(Failure::from_protocol(err));
        }
        match session.flush() {
            Ok(Progress::Ready(())) => Step::Pending(Interest::Readable),
            Ok(Progress::Pending(interest)) => Step::Pending(interest),
            Err(err) => Step::Failed(Failure::from_protocol(err)),
        }
    }

    fn advance(&self, cx: &mut ActionCx<'_, C>, _task: &Task) -> Step {
        match cx.session.as_mut() {
            Some(session) => Self::collect(session),
            None => Step::Failed(Failure::Fatal(BrokenReason::Closed)),
        }
    }
}

fn mismatched(task: &Task) -> Step {
    Step::Failed(Failure::Fatal(BrokenReason::Protocol(format!(
        "task {} dispatched to the wrong handler",
        task.id()
    ))))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use pgq_protocol::{QueryOutcome, ResultSet, ServerError, Socket};

    use super::*;

    #[derive(Default)]
    struct ScriptedSession {
        connect: VecDeque<Result<Progress<()>, ProtocolError>>,
        results: VecDeque<Result<Progress<QueryOutcome>, ProtocolError>>,
        sent: Vec<String>,
        closes: usize,
    }

    impl Session for ScriptedSession {
        fn socket(&self) -> Socket {
            Socket(3)
        }

        fn poll_connect(&mut self) -> Result<Progress<()>, ProtocolError> {
            self.connect.pop_front().unwrap_or(Ok(Progress::Ready(())))
        }

        fn send_query(&mut self, query: &str) -> Result<(), ProtocolError> {
            self.sent.push(query.to_string());
            Ok(())
        }

        fn flush(&mut self) -> Result<Progress<()>, ProtocolError> {
            Ok(Progress::Ready(()))
        }

        fn poll_result(&mut self) -> Result<Progress<QueryOutcome>, ProtocolError> {
            self.results
                .pop_front()
                .unwrap_or(Ok(Progress::Pending(Interest::Readable)))
        }

        fn close(&mut self) -> Result<Progress<()>, ProtocolError> {
            self.closes += 1;
            Ok(Progress::Ready(()))
        }
    }

    #[derive(Default)]
    struct ScriptedConnector {
        next: RefCell<Option<ScriptedSession>>,
    }

    impl Connector for ScriptedConnector {
        type Session = ScriptedSession;

        fn start(&self, _params: &ConnParams) -> Result<ScriptedSession, ProtocolError> {
            Ok(self.next.borrow_mut().take().unwrap_or_default())
        }
    }

    fn run_begin(
        connector: &ScriptedConnector,
        session: &mut Option<ScriptedSession>,
        task: &Task,
    ) -> (Step, Option<Instant>) {
        let mut deadline = None;
        let mut cx = ActionCx {
            session,
            deadline: &mut deadline,
            connector,
        };
        let step = begin(&mut cx, task);
        (step, deadline)
    }

    #[test]
    fn test_connect_creates_session() {
        let connector = ScriptedConnector::default();
        let mut session = None;
        let (step, deadline) = run_begin(&connector, &mut session, &Task::connect("dbname=x"));

        assert!(matches!(step, Step::Done(Reply::Connected)));
        assert!(session.is_some());
        assert!(deadline.is_none());
    }

    #[test]
    fn test_connect_pending_then_ready() {
        let connector = ScriptedConnector::default();
        *connector.next.borrow_mut() = Some(ScriptedSession {
            connect: VecDeque::from([Ok(Progress::Pending(Interest::Writable))]),
            ..Default::default()
        });
        let mut session = None;
        let task = Task::connect("dbname=x connect_timeout=5");
        let (step, deadline) = run_begin(&connector, &mut session, &task);
        assert!(matches!(step, Step::Pending(Interest::Writable)));
        assert!(deadline.is_some());

        let mut deadline = None;
        let mut cx = ActionCx {
            session: &mut session,
            deadline: &mut deadline,
            connector: &connector,
        };
        let step = ConnectHandler.advance(&mut cx, &task);
        assert!(matches!(step, Step::Done(Reply::Connected)));
    }

    #[test]
    fn test_zero_connect_timeout_clears_deadline() {
        let connector = ScriptedConnector::default();
        *connector.next.borrow_mut() = Some(ScriptedSession {
            connect: VecDeque::from([Ok(Progress::Pending(Interest::Writable))]),
            ..Default::default()
        });
        let mut session = None;
        let mut deadline = Some(Instant::now());
        let mut cx = ActionCx {
            session: &mut session,
            deadline: &mut deadline,
            connector: &connector,
        };
        let step = begin(&mut cx, &Task::connect("dbname=x connect_timeout=0"));

        assert!(matches!(step, Step::Pending(Interest::Writable)));
        assert!(deadline.is_none());
    }

    #[test]
    fn test_connect_uri_creates_session() {
        let connector = ScriptedConnector::default();
        let mut session = None;
        let (step, _) = run_begin(
            &connector,
            &mut session,
            &Task::connect("postgresql://app@localhost/db"),
        );

        assert!(matches!(step, Step::Done(Reply::Connected)));
        assert!(session.is_some());
    }

    #[test]
    fn test_connect_malformed_conninfo_fails_synchronously() {
        let connector = ScriptedConnector::default();
        let mut session = None;
        let (step, _) = run_begin(&connector, &mut session, &Task::connect("dbname"));

        match step {
            Step::Failed(Failure::Fatal(BrokenReason::InvalidConnectionString(_))) => {}
            other => panic!("unexpected step {other:?}"),
        }
        assert!(session.is_none());
    }

    #[test]
    fn test_connect_twice_is_task_error() {
        let connector = ScriptedConnector::default();
        let mut session = Some(ScriptedSession::default());
        let (step, _) = run_begin(&connector, &mut session, &Task::connect("dbname=x"));
        assert!(matches!(
            step,
            Step::Failed(Failure::Task(Error::AlreadyConnected))
        ));
    }

    #[test]
    fn test_connect_rejection_is_fatal() {
        let connector = ScriptedConnector::default();
        *connector.next.borrow_mut() = Some(ScriptedSession {
            connect: VecDeque::from([Err(ProtocolError::Server(ServerError::new(
                "3D000",
                "database \"x\" does not exist",
            )))]),
            ..Default::default()
        });
        let mut session = None;
        let (step, _) = run_begin(&connector, &mut session, &Task::connect("dbname=x"));
        assert!(matches!(
            step,
            Step::Failed(Failure::Fatal(BrokenReason::Server(_)))
        ));
    }

    #[test]
    fn test_execute_sends_and_waits_for_input() {
        let connector = ScriptedConnector::default();
        let mut session = Some(ScriptedSession::default());
        let (step, _) = run_begin(&connector, &mut session, &Task::execute("SELECT 1"));

        assert!(matches!(step, Step::Pending(Interest::Readable)));
        assert_eq!(session.as_ref().unwrap().sent, vec!["SELECT 1"]);
    }

    #[test]
    fn test_execute_advance_collects_result() {
        let connector = ScriptedConnector::default();
        let mut session = Some(ScriptedSession {
            results: VecDeque::from([Ok(Progress::Ready(QueryOutcome::single(
                ResultSet::command("SELECT 0"),
            )))]),
            ..Default::default()
        });
        let task = Task::execute("SELECT 1 WHERE false");
        let mut deadline = None;
        let mut cx = ActionCx {
            session: &mut session,
            deadline: &mut deadline,
            connector: &connector,
        };
        match ExecuteHandler.advance(&mut cx, &task) {
            Step::Done(Reply::Query(outcome)) => {
                assert_eq!(outcome.last().unwrap().command_tag, "SELECT 0");
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn test_execute_without_session_is_task_error() {
        let connector = ScriptedConnector::default();
        let mut session = None;
        let (step, _) = run_begin(&connector, &mut session, &Task::execute("SELECT 1"));
        assert!(matches!(step, Step::Failed(Failure::Task(Error::NotConnected))));
    }

    #[test]
    fn test_disconnect_releases_session() {
        let connector = ScriptedConnector::default();
        let mut session = Some(ScriptedSession::default());
        let (step, _) = run_begin(&connector, &mut session, &Task::disconnect());
        assert!(matches!(step, Step::Done(Reply::Disconnected)));
        assert!(session.is_none());
    }

    #[test]
    fn test_failure_classification() {
        let query_level = ProtocolError::Server(ServerError::new("42601", "syntax error"));
        assert!(matches!(
            Failure::from_protocol(query_level),
            Failure::Task(Error::Server(_))
        ));

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            Failure::from_protocol(ProtocolError::Io(reset)),
            Failure::Fatal(BrokenReason::Io(_))
        ));
    }
}
