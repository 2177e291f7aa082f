//! Execution state model types.
//!
//! Pure data shared by the engine and anything reporting on executions.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of one execution, unique within an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(u64);

impl ExecutionId {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an execution.
///
/// Codes are ordered by severity for the terminal states, so the worse of
/// two outcomes is the one with the higher code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Ok,
    Warnings,
    Errors,
    Failed,
    Stopping,
    Stopped,
    Aborted,
    Invalid,
}

impl ExecutionStatus {
    /// Numeric result code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 5,
            Self::Ok => 10,
            Self::Warnings => 20,
            Self::Errors => 30,
            Self::Failed => 40,
            Self::Stopping => 49,
            Self::Stopped => 50,
            Self::Aborted => 60,
            Self::Invalid => 70,
        }
    }

    /// Storage string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Ok => "ok",
            Self::Warnings => "warnings",
            Self::Errors => "errors",
            Self::Failed => "failed",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Aborted => "aborted",
            Self::Invalid => "invalid",
        }
    }

    /// Operator-facing description.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Running => "Running",
            Self::Ok => "Completed successfully",
            Self::Warnings => "Completed with warnings",
            Self::Errors => "Completed with errors",
            Self::Failed => "Failed",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Aborted => "Aborted",
            Self::Invalid => "Invalid",
        }
    }

    /// Whether the execution has finished.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::Running | Self::Stopping)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Counters reported by a finished execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub rows_read: u64,
    pub rows_written: u64,
    pub errors: u64,
    pub warnings: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_ordered_by_severity() {
        assert!(ExecutionStatus::Ok < ExecutionStatus::Warnings);
        assert!(ExecutionStatus::Errors < ExecutionStatus::Failed);
        assert_eq!(
            ExecutionStatus::Warnings.max(ExecutionStatus::Failed),
            ExecutionStatus::Failed
        );
        assert_eq!(ExecutionStatus::Invalid.code(), 70);
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::Warnings).unwrap();
        assert_eq!(json, "\"warnings\"");
        let back: ExecutionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ExecutionStatus::Warnings);
    }

    #[test]
    fn running_is_not_terminal() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Stopped.is_terminal());
    }

    #[test]
    fn execution_id_display() {
        assert_eq!(ExecutionId::new(4).to_string(), "#4");
    }

    #[test]
    fn stats_default_is_zeroed() {
        let stats = ExecutionStats::default();
        assert_eq!(stats.rows_read, 0);
        assert!(stats.first_error.is_none());
    }
}
