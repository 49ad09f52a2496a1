//! Mock connector and session.
//!
//! [`MockConnector`] hands out [`MockSession`]s that answer queries from a
//! table of canned responses instead of talking to a server. Every session
//! step is recorded in a shared [`Journal`], so tests can assert on what the
//! driver actually did to the session and in which order.
//!
//! Sessions enforce the half-duplex contract: issuing a second command
//! before the first one's result was collected is a protocol error.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgq_testing::mock::{MockConnector, MockResponse};
//!
//! let connector = MockConnector::builder()
//!     .with_response("SELECT 1", MockResponse::scalar("1"))
//!     .with_response("SELEC 1", MockResponse::syntax_error("syntax error at or near \"SELEC\""))
//!     .with_query_steps(2)
//!     .build();
//! let journal = connector.journal();
//! ```

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use pgq_protocol::{
    Column, ConnParams, Connector, Interest, Progress, ProtocolError, QueryOutcome, ResultSet,
    Row, ServerError, Session, Severity, Socket,
};

/// First descriptor handed out to mock sessions.
const FIRST_FD: i32 = 100;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// Return rows.
    Rows {
        /// Column names.
        columns: Vec<String>,
        /// Row data; `None` is SQL NULL.
        rows: Vec<Vec<Option<String>>>,
    },

    /// Return a command tag without rows.
    Command(String),

    /// Return a server error.
    Error {
        /// SQLSTATE code.
        code: String,
        /// Primary message.
        message: String,
        /// Severity; FATAL and PANIC end the session.
        severity: Severity,
    },

    /// The server resets the connection mid-query.
    Reset,

    /// The server closes the connection without answering.
    Closed,

    /// Never answer.
    Hang,

    /// Compute the response from the query text.
    Custom(Arc<dyn Fn(&str) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", rows)
                .finish(),
            Self::Command(tag) => f.debug_tuple("Command").field(tag).finish(),
            Self::Error {
                code,
                message,
                severity,
            } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .field("severity", severity)
                .finish(),
            Self::Reset => f.write_str("Reset"),
            Self::Closed => f.write_str("Closed"),
            Self::Hang => f.write_str("Hang"),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// A single-column, single-row response.
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Rows {
            columns: vec!["?column?".to_string()],
            rows: vec![vec![Some(value.into())]],
        }
    }

    /// A multi-row response.
    pub fn rows(columns: &[&str], rows: Vec<Vec<Option<String>>>) -> Self {
        Self::Rows {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
        }
    }

    /// A command tag response.
    pub fn command(tag: impl Into<String>) -> Self {
        Self::Command(tag.into())
    }

    /// An `ERROR` severity response with the given SQLSTATE.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// A `42601` syntax error.
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::error("42601", message)
    }

    /// A `FATAL` response that terminates the session.
    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            severity: Severity::Fatal,
        }
    }

    fn resolve(&self, query: &str) -> Option<Result<QueryOutcome, ProtocolError>> {
        match self {
            Self::Rows { columns, rows } => {
                let columns = columns.iter().map(|name| Column::new(name.as_str(), 25)).collect();
                let rows = rows.iter().cloned().map(Row::new).collect();
                Some(Ok(QueryOutcome::single(ResultSet::rows(columns, rows))))
            }
            Self::Command(tag) => Some(Ok(QueryOutcome::single(ResultSet::command(tag.as_str())))),
            Self::Error {
                code,
                message,
                severity,
            } => Some(Err(ServerError::new(code.as_str(), message.as_str())
                .with_severity(*severity)
                .into())),
            Self::Reset => Some(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )
            .into())),
            Self::Closed => Some(Err(ProtocolError::ConnectionClosed)),
            Self::Hang => None,
            Self::Custom(f) => f(query).resolve(query),
        }
    }
}

/// How the startup handshake ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// The session is established.
    Accept,
    /// The server rejects the password.
    RejectPassword,
    /// The database does not exist.
    UnknownDatabase,
    /// The socket cannot be opened.
    Refuse,
    /// The handshake never finishes.
    Hang,
}

/// One recorded session step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// A session was created for `dbname`.
    Started {
        /// Session descriptor.
        socket: Socket,
        /// Database named in the connection string.
        dbname: Option<String>,
    },
    /// The handshake finished.
    Connected {
        /// Session descriptor.
        socket: Socket,
    },
    /// A query was sent.
    Sent {
        /// Session descriptor.
        socket: Socket,
        /// Query text.
        query: String,
    },
    /// A query's result (or error) was handed out.
    Answered {
        /// Session descriptor.
        socket: Socket,
        /// Query text.
        query: String,
    },
    /// `close` finished.
    Closed {
        /// Session descriptor.
        socket: Socket,
    },
    /// The session was dropped.
    Dropped {
        /// Session descriptor.
        socket: Socket,
    },
}

/// Shared, ordered record of session activity.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    fn record(&self, entry: JournalEntry) {
        tracing::trace!(?entry, "mock session");
        self.entries.lock().push(entry);
    }

    /// All entries so far.
    #[must_use]
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    /// Queries sent to any session, in order.
    #[must_use]
    pub fn sent_queries(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Sent { query, .. } => Some(query.clone()),
                _ => None,
            })
            .collect()
    }

    /// Check if a session with `socket` was dropped.
    #[must_use]
    pub fn was_dropped(&self, socket: Socket) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|entry| *entry == JournalEntry::Dropped { socket })
    }

    /// Number of sessions started.
    #[must_use]
    pub fn sessions_started(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| matches!(entry, JournalEntry::Started { .. }))
            .count()
    }

    /// Forget all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Configuration for mock sessions.
#[derive(Debug)]
pub struct MockConfig {
    /// Pre-configured responses for specific queries.
    responses: HashMap<String, MockResponse>,
    /// Response for unmatched queries.
    default_response: MockResponse,
    /// How the handshake ends.
    connect: ConnectBehavior,
    /// Pending steps before the handshake finishes.
    connect_steps: usize,
    /// Pending steps before a query result is available.
    query_steps: usize,
    /// Pending steps before `close` finishes.
    close_steps: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            responses: HashMap::new(),
            default_response: MockResponse::command("SELECT 0"),
            connect: ConnectBehavior::Accept,
            connect_steps: 1,
            query_steps: 1,
            close_steps: 0,
        }
    }
}

/// Builder for [`MockConnector`].
#[derive(Debug, Default)]
pub struct MockConnectorBuilder {
    config: MockConfig,
}

impl MockConnectorBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for a specific query.
    #[must_use]
    pub fn with_response(mut self, query: impl Into<String>, response: MockResponse) -> Self {
        self.config.responses.insert(query.into(), response);
        self
    }

    /// Set the response for unmatched queries.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Set how the handshake ends.
    #[must_use]
    pub fn with_connect(mut self, behavior: ConnectBehavior) -> Self {
        self.config.connect = behavior;
        self
    }

    /// Number of readiness waits before the handshake finishes.
    #[must_use]
    pub fn with_connect_steps(mut self, steps: usize) -> Self {
        self.config.connect_steps = steps;
        self
    }

    /// Number of readiness waits before a query result is available.
    #[must_use]
    pub fn with_query_steps(mut self, steps: usize) -> Self {
        self.config.query_steps = steps;
        self
    }

    /// Number of readiness waits before `close` finishes.
    #[must_use]
    pub fn with_close_steps(mut self, steps: usize) -> Self {
        self.config.close_steps = steps;
        self
    }

    /// Build the connector.
    #[must_use]
    pub fn build(self) -> MockConnector {
        MockConnector {
            config: Arc::new(self.config),
            journal: Journal::default(),
            next_fd: Cell::new(FIRST_FD),
        }
    }
}

/// Connector producing [`MockSession`]s.
#[derive(Debug)]
pub struct MockConnector {
    config: Arc<MockConfig>,
    journal: Journal,
    next_fd: Cell<i32>,
}

impl MockConnector {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> MockConnectorBuilder {
        MockConnectorBuilder::new()
    }

    /// The journal shared by every session of this connector.
    #[must_use]
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        MockConnectorBuilder::new().build()
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn start(&self, params: &ConnParams) -> Result<MockSession, ProtocolError> {
        if self.config.connect == ConnectBehavior::Refuse {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused").into());
        }

        let socket = Socket(self.next_fd.get());
        self.next_fd.set(socket.0 + 1);
        self.journal.record(JournalEntry::Started {
            socket,
            dbname: params.dbname.clone(),
        });

        Ok(MockSession {
            socket,
            config: Arc::clone(&self.config),
            journal: self.journal.clone(),
            user: params.user.clone().unwrap_or_else(|| "postgres".to_string()),
            dbname: params.dbname.clone().unwrap_or_else(|| "postgres".to_string()),
            connect_steps: self.config.connect_steps,
            close_steps: self.config.close_steps,
            connected: false,
            in_progress: None,
        })
    }
}

/// A command waiting for its result.
#[derive(Debug)]
struct InProgress {
    query: String,
    steps: usize,
}

/// Scripted session.
#[derive(Debug)]
pub struct MockSession {
    socket: Socket,
    config: Arc<MockConfig>,
    journal: Journal,
    user: String,
    dbname: String,
    connect_steps: usize,
    close_steps: usize,
    connected: bool,
    in_progress: Option<InProgress>,
}

impl Session for MockSession {
    fn socket(&self) -> Socket {
        self.socket
    }

    fn poll_connect(&mut self) -> Result<Progress<()>, ProtocolError> {
        if self.connected {
            return Ok(Progress::Ready(()));
        }
        if self.connect_steps > 0 {
            self.connect_steps -= 1;
            // The first wait is for the socket to connect, later ones for
            // handshake messages.
            let interest = if self.connect_steps + 1 == self.config.connect_steps {
                Interest::Writable
            } else {
                Interest::Readable
            };
            return Ok(Progress::Pending(interest));
        }

        match self.config.connect {
            ConnectBehavior::Accept => {
                self.connected = true;
                self.journal.record(JournalEntry::Connected {
                    socket: self.socket,
                });
                Ok(Progress::Ready(()))
            }
            ConnectBehavior::RejectPassword => Err(ServerError::new(
                "28P01",
                format!("password authentication failed for user \"{}\"", self.user),
            )
            .with_severity(Severity::Fatal)
            .into()),
            ConnectBehavior::UnknownDatabase => Err(ServerError::new(
                "3D000",
                format!("database \"{}\" does not exist", self.dbname),
            )
            .with_severity(Severity::Fatal)
            .into()),
            ConnectBehavior::Hang => Ok(Progress::Pending(Interest::Readable)),
            ConnectBehavior::Refuse => Err(ProtocolError::ConnectionClosed),
        }
    }

    fn send_query(&mut self, query: &str) -> Result<(), ProtocolError> {
        if !self.connected {
            return Err(ProtocolError::protocol("query sent before the handshake finished"));
        }
        if let Some(previous) = &self.in_progress {
            return Err(ProtocolError::protocol(format!(
                "another command is already in progress: {}",
                previous.query
            )));
        }
        self.journal.record(JournalEntry::Sent {
            socket: self.socket,
            query: query.to_string(),
        });
        self.in_progress = Some(InProgress {
            query: query.to_string(),
            steps: self.config.query_steps,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<Progress<()>, ProtocolError> {
        Ok(Progress::Ready(()))
    }

    fn poll_result(&mut self) -> Result<Progress<QueryOutcome>, ProtocolError> {
        let Some(command) = self.in_progress.as_mut() else {
            return Err(ProtocolError::protocol("no command in progress"));
        };
        if command.steps > 0 {
            command.steps -= 1;
            return Ok(Progress::Pending(Interest::Readable));
        }

        let response = self
            .config
            .responses
            .get(&command.query)
            .unwrap_or(&self.config.default_response);
        let Some(result) = response.resolve(&command.query) else {
            return Ok(Progress::Pending(Interest::Readable));
        };

        self.journal.record(JournalEntry::Answered {
            socket: self.socket,
            query: command.query.clone(),
        });
        self.in_progress = None;
        result.map(Progress::Ready)
    }

    fn close(&mut self) -> Result<Progress<()>, ProtocolError> {
        if self.close_steps > 0 {
            self.close_steps -= 1;
            return Ok(Progress::Pending(Interest::Writable));
        }
        self.connected = false;
        self.journal.record(JournalEntry::Closed {
            socket: self.socket,
        });
        Ok(Progress::Ready(()))
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.journal.record(JournalEntry::Dropped {
            socket: self.socket,
        });
    }
}
