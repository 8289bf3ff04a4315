//! Operator-facing status records.
//!
//! One record is live per concern. A new action of the same concern replaces
//! the record as a whole; dismissing resets only that concern.

use serde::Serialize;

/// Lifecycle phase of a status record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum StatusPhase {
    /// Nothing to report
    #[default]
    Idle,
    /// A connection test is in flight
    Testing,
    /// A transfer is in flight
    Running,
    /// Terminal success
    Success,
    /// Terminal failure
    Error,
}

impl StatusPhase {
    /// Whether the phase is terminal and can be dismissed
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// Whether a call for this concern is in flight
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Testing | Self::Running)
    }
}

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// Connection test or database/table listing failed
    Connectivity,
    /// Table or file description failed
    SchemaFetch,
    /// Export or import failed
    Execution,
}

/// The areas that each carry their own status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Concern {
    /// Connection testing
    Connection,
    /// Export/import execution
    Transfer,
}

/// A phase and message pair shown to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    /// Current phase
    pub phase: StatusPhase,
    /// Human-readable message
    pub message: String,
    /// Failure classification when `phase` is `Error`
    pub failure: Option<FailureKind>,
}

impl StatusRecord {
    /// Nothing to report.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Connection test in flight.
    pub fn testing(message: impl Into<String>) -> Self {
        Self {
            phase: StatusPhase::Testing,
            message: message.into(),
            failure: None,
        }
    }

    /// Transfer in flight.
    pub fn running(message: impl Into<String>) -> Self {
        Self {
            phase: StatusPhase::Running,
            message: message.into(),
            failure: None,
        }
    }

    /// Terminal success.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            phase: StatusPhase::Success,
            message: message.into(),
            failure: None,
        }
    }

    /// Terminal failure.
    pub fn error(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            phase: StatusPhase::Error,
            message: message.into(),
            failure: Some(kind),
        }
    }
}

/// One live status record per concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusBoard {
    /// Connection test status
    pub connection: StatusRecord,
    /// Transfer execution status
    pub transfer: StatusRecord,
}

impl StatusBoard {
    /// Record for a concern
    pub const fn get(&self, concern: Concern) -> &StatusRecord {
        match concern {
            Concern::Connection => &self.connection,
            Concern::Transfer => &self.transfer,
        }
    }

    /// Replaces the record for a concern.
    pub fn set(&mut self, concern: Concern, record: StatusRecord) {
        match concern {
            Concern::Connection => self.connection = record,
            Concern::Transfer => self.transfer = record,
        }
    }
}
