//! # pgq-client
//!
//! Client-side execution core for a PostgreSQL driver binding.
//!
//! Every logical connection owns a FIFO queue of tasks (CONNECT, EXECUTE,
//! DISCONNECT). A scheduler runs the head task against a non-blocking
//! [`Session`], waits for socket readiness through an [`EventLoop`] and
//! delivers each task's outcome exactly once, in enqueue order, to the
//! connection's listener. The caller's thread never blocks on network I/O.
//!
//! ## Features
//!
//! - **Strict FIFO**: at most one task in flight per connection
//! - **Non-blocking**: the scheduler returns whenever a task waits for I/O
//! - **Pluggable I/O**: any [`Connector`]/[`Session`] pair and any [`EventLoop`]
//! - **Timeouts**: per-action deadlines enforced through the event loop
//! - **Tracing**: one span per task, with sanitized statements
//!
//! ## Connection Status
//!
//! ```text
//! FREE -> CONNECTING (CONNECT starts)      CONNECTING -> FREE (connected)
//! FREE -> BUSY (EXECUTE/DISCONNECT starts) BUSY -> FREE (task finished)
//! CONNECTING/BUSY -> BROKEN (fatal error)  BROKEN is terminal
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgq_client::{listener_channel, Config, Driver, Event};
//! use pgq_client::runtime::TokioEventLoop;
//!
//! let (event_loop, mut events) = TokioEventLoop::new();
//! let mut driver = Driver::new(connector, event_loop, Config::default());
//! let (listener, mut completions) = listener_channel();
//!
//! let conn = driver.connect("host=localhost dbname=app", listener)?;
//! let query = driver.exec(conn, "SELECT 1")?;
//! driver.disconnect(conn)?;
//! driver.run_until_idle(&mut events).await;
//!
//! while let Ok(Event::Completed(done)) = completions.try_recv() {
//!     println!("{} {}: ok={}", done.task_id, done.action, done.is_ok());
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod action;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod event_loop;
pub mod instrumentation;
#[cfg(all(unix, feature = "runtime"))]
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod task;

// Re-export commonly used types
pub use action::{Failure, Step};
pub use config::{Config, TimeoutConfig};
pub use connection::{Connection, ConnectionId, Event, Listener};
pub use driver::{ConnectionHandle, Driver, listener_channel};
pub use error::{ArgumentError, BrokenReason, Error, Result};
pub use event_loop::{EventLoop, Readiness};
pub use instrumentation::SanitizationConfig;
pub use pgq_protocol::{
    Column, ConnParams, ConnectTimeout, Connector, Interest, Progress, ProtocolError, QueryOutcome,
    ResultSet, Row, ServerError, Session, Severity, Socket,
};
pub use scheduler::{Context, Trigger, process};
pub use state::ConnectionStatus;
pub use task::{Action, Completion, Reply, Request, Task, TaskId};
