//! # pgq-testing
//!
//! Test infrastructure for pgq driver development.
//!
//! This crate drives the scheduler without a database or a real event loop:
//!
//! - [`MockConnector`]/[`MockSession`]: scripted sessions with canned
//!   responses, configurable I/O waits and a shared [`Journal`]
//! - [`ManualEventLoop`]: records watches; tests decide when sockets become
//!   ready or deadlines pass
//! - [`EventLog`]: a listener that records every event for assertions
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgq_client::{Config, Driver};
//! use pgq_testing::{EventLog, ManualEventLoop, MockConnector, MockResponse, pump};
//!
//! let connector = MockConnector::builder()
//!     .with_response("SELECT 1", MockResponse::scalar("1"))
//!     .build();
//! let mut driver = Driver::new(connector, ManualEventLoop::new(), Config::default());
//! let log = EventLog::new();
//!
//! let conn = driver.connect("dbname=app", log.listener()).unwrap();
//! let query = driver.exec(conn, "SELECT 1").unwrap();
//! pump(&mut driver);
//!
//! assert!(log.completion(query).unwrap().is_ok());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod event_loop;
pub mod fixtures;
pub mod mock;

pub use event_loop::{ManualEventLoop, Watch, expire, pump, step};
pub use fixtures::{EventLog, init_tracing};
pub use mock::{
    ConnectBehavior, Journal, JournalEntry, MockConnector, MockConnectorBuilder, MockResponse,
    MockSession,
};
