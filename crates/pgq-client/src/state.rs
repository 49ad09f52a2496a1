//! Connection status machine.
//!
//! ## State Transitions
//!
//! ```text
//! Free -> Connecting   (CONNECT task begins)
//! Free -> Busy         (DISCONNECT or EXECUTE task begins)
//! Connecting -> Free   (task finished, session usable or task-level failure)
//! Busy -> Free         (task finished, session usable or task-level failure)
//! Connecting -> Broken (handshake failed, timed out)
//! Busy -> Broken       (socket reset, fatal server error, timed out)
//! Free -> Broken       (synchronous fatal failure while beginning a task)
//! ```
//!
//! `Broken` is terminal. A broken connection never gets a new session; the
//! caller has to release it and connect again.

use std::fmt;

use crate::task::Action;

/// Runtime status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// No task in flight.
    #[default]
    Free,
    /// A CONNECT task is in flight.
    Connecting,
    /// A DISCONNECT or EXECUTE task is in flight.
    Busy,
    /// The session is unusable.
    Broken,
}

impl ConnectionStatus {
    /// Status while a task of kind `action` is in flight.
    #[must_use]
    pub fn in_flight(action: Action) -> Self {
        match action {
            Action::Connect => Self::Connecting,
            Action::Disconnect | Action::Execute => Self::Busy,
        }
    }

    /// Anything but `Free`.
    #[must_use]
    pub fn is_busy(self) -> bool {
        !matches!(self, Self::Free)
    }

    /// Anything but `Broken`.
    #[must_use]
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::Broken)
    }

    /// A task has begun and not yet finished.
    #[must_use]
    pub fn has_task_in_flight(self) -> bool {
        matches!(self, Self::Connecting | Self::Busy)
    }

    /// Get a lowercase name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Connecting => "connecting",
            Self::Busy => "busy",
            Self::Broken => "broken",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_and_valid_predicates() {
        use ConnectionStatus::*;
        for status in [Free, Connecting, Busy, Broken] {
            assert_eq!(status.is_busy(), status != Free, "{status}");
            assert_eq!(status.is_valid(), status != Broken, "{status}");
        }
    }

    #[test]
    fn test_in_flight_status_per_action() {
        assert_eq!(
            ConnectionStatus::in_flight(Action::Connect),
            ConnectionStatus::Connecting
        );
        assert_eq!(
            ConnectionStatus::in_flight(Action::Execute),
            ConnectionStatus::Busy
        );
        assert_eq!(
            ConnectionStatus::in_flight(Action::Disconnect),
            ConnectionStatus::Busy
        );
    }

    #[test]
    fn test_broken_is_busy_but_not_in_flight() {
        assert!(ConnectionStatus::Broken.is_busy());
        assert!(!ConnectionStatus::Broken.has_task_in_flight());
    }
}
