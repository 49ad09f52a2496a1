//! Driver configuration.

use std::time::Duration;

use crate::instrumentation::SanitizationConfig;
use crate::task::Action;

/// Timeouts for in-flight tasks.
///
/// A task that does not finish before its deadline breaks the connection:
/// the half-duplex protocol stream cannot be resynchronised once a command
/// has been abandoned midway.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TimeoutConfig {
    /// Time allowed for a CONNECT task (default: 30s).
    ///
    /// A `connect_timeout` keyword in the connection string takes
    /// precedence for that connection.
    pub connect_timeout: Option<Duration>,
    /// Time allowed for an EXECUTE or DISCONNECT task (default: none).
    pub command_timeout: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
            command_timeout: None,
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable all timeouts.
    #[must_use]
    pub fn none() -> Self {
        Self {
            connect_timeout: None,
            command_timeout: None,
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the command timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// The timeout that applies to a task of kind `action`.
    #[must_use]
    pub fn for_action(&self, action: Action) -> Option<Duration> {
        match action {
            Action::Connect => self.connect_timeout,
            Action::Disconnect | Action::Execute => self.command_timeout,
        }
    }
}

/// Driver configuration.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct Config {
    /// Task timeouts.
    pub timeouts: TimeoutConfig,
    /// How SQL text is rendered in log records.
    pub sanitization: SanitizationConfig,
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the task timeouts.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set statement sanitization for logs.
    #[must_use]
    pub fn sanitization(mut self, sanitization: SanitizationConfig) -> Self {
        self.sanitization = sanitization;
        self
    }
}
