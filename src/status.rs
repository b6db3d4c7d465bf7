//! Unit status reported to the orchestrator.

use serde::Serialize;
use std::fmt;

/// Operational status of the unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    /// The workload is healthy.
    Active,
    /// Operator intervention is required; the message says what to fix.
    Blocked(String),
}

impl UnitStatus {
    /// Returns the status name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked(_) => "blocked",
        }
    }

    /// Returns the status message, empty for [`UnitStatus::Active`].
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Active => "",
            Self::Blocked(message) => message,
        }
    }

    /// Returns `true` for [`UnitStatus::Blocked`].
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str(self.name()),
            Self::Blocked(message) => write!(f, "{}: {message}", self.name()),
        }
    }
}
