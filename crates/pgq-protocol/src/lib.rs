//! # pgq-protocol
//!
//! The boundary between the pgq driver core and the database client library
//! that actually speaks the PostgreSQL wire protocol.
//!
//! The core never parses server messages itself. It drives a [`Session`]
//! through a small set of non-blocking actions and waits for socket
//! readiness in between:
//!
//! ```text
//! Connector::start ──> Session::poll_connect (until Ready)
//! Session::send_query ──> Session::flush ──> Session::poll_result (until Ready)
//! Session::close (until Ready)
//! ```
//!
//! Every action returns a [`Progress`]: either the operation finished, or it
//! is waiting for the session's [`Socket`] to become readable or writable.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic
//! and makes no assumptions about the event loop. Higher-level crates build
//! upon this foundation to schedule work against real sockets.
//!
//! ## Connection strings
//!
//! [`ConnParams`] parses libpq keyword/value connection strings:
//!
//! ```rust
//! use pgq_protocol::ConnParams;
//!
//! let params = ConnParams::parse("host=localhost dbname=app user='app user'").unwrap();
//! assert_eq!(params.dbname.as_deref(), Some("app"));
//! assert_eq!(params.user.as_deref(), Some("app user"));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod conninfo;
pub mod error;
pub mod result;
pub mod session;

pub use conninfo::{ConnParams, ConnectTimeout};
pub use error::{ConnInfoError, ProtocolError, ServerError, Severity};
pub use result::{Column, QueryOutcome, ResultSet, Row};
pub use session::{Connector, Interest, Progress, Session, Socket};
