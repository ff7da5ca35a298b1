//! Invocation status ledger.
//!
//! A ledger is the append-only sequence of [`InvocationStatusRecord`]s carried by an
//! invocation record. The helpers here are pure functions over that slice; appending
//! happens on the delegate side and comes back as a fresh record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ApiError;

/// Detail recorded when a status update does not carry one.
pub const DEFAULT_STATUS_DETAIL: &str = "None";

/// Number of prior `Failed` entries after which another failure is dead-lettered.
pub const MAX_FAILED_ATTEMPTS: usize = 2;

/// Lifecycle state of an invocation. Declaration order is the status rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InvocationStatus {
    Queued,
    Scheduled,
    Downloading,
    Processing,
    Uploading,
    Completed,
    // Outside the linear progression
    Cancelled,
    Failed,
    Deadly,
}

const HAPPY_PATH: [InvocationStatus; 6] = [
    InvocationStatus::Queued,
    InvocationStatus::Scheduled,
    InvocationStatus::Downloading,
    InvocationStatus::Processing,
    InvocationStatus::Uploading,
    InvocationStatus::Completed,
];

impl InvocationStatus {
    pub const ALL: [InvocationStatus; 9] = [
        InvocationStatus::Queued,
        InvocationStatus::Scheduled,
        InvocationStatus::Downloading,
        InvocationStatus::Processing,
        InvocationStatus::Uploading,
        InvocationStatus::Completed,
        InvocationStatus::Cancelled,
        InvocationStatus::Failed,
        InvocationStatus::Deadly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Queued => "Queued",
            InvocationStatus::Scheduled => "Scheduled",
            InvocationStatus::Downloading => "Downloading",
            InvocationStatus::Processing => "Processing",
            InvocationStatus::Uploading => "Uploading",
            InvocationStatus::Completed => "Completed",
            InvocationStatus::Cancelled => "Cancelled",
            InvocationStatus::Failed => "Failed",
            InvocationStatus::Deadly => "Deadly",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvocationStatus::Completed
                | InvocationStatus::Cancelled
                | InvocationStatus::Failed
                | InvocationStatus::Deadly
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            InvocationStatus::Downloading | InvocationStatus::Processing | InvocationStatus::Uploading
        )
    }

    /// Next status along the happy path, `None` once terminal.
    pub fn next(&self) -> Option<InvocationStatus> {
        if self.is_terminal() {
            return None;
        }
        let idx = HAPPY_PATH.iter().position(|s| s == self)?;
        HAPPY_PATH.get(idx + 1).copied()
    }

    /// Whether the server would accept moving from `self` to `other`.
    ///
    /// Informational only: the client never rejects a requested update.
    pub fn can_transition_to(&self, other: InvocationStatus) -> bool {
        use InvocationStatus::*;

        if *self == other {
            return true;
        }
        match self {
            Completed | Cancelled | Deadly => false,
            Failed => matches!(other, Queued | Deadly),
            _ => match other {
                Cancelled | Failed => true,
                Deadly => *self == Queued,
                _ => self.next() == Some(other),
            },
        }
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvocationStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvocationStatus::ALL
            .iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ApiError::InvalidRequest(format!("Unknown invocation status: {}", s)))
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationStatusRecord {
    pub status: InvocationStatus,
    #[serde(default = "default_detail")]
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

fn default_detail() -> String {
    DEFAULT_STATUS_DETAIL.to_string()
}

impl InvocationStatusRecord {
    pub fn new(status: InvocationStatus, detail: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            status,
            detail: detail.into(),
            timestamp,
        }
    }
}

/// Entry with the highest status rank; the earliest such entry wins ties.
///
/// Rank, not append order, decides: a `Queued` appended after `Processing` does not
/// move the current status backwards.
pub fn current_status(ledger: &[InvocationStatusRecord]) -> Option<&InvocationStatusRecord> {
    ledger.iter().fold(None, |best: Option<&InvocationStatusRecord>, entry| match best {
        Some(b) if b.status >= entry.status => Some(b),
        _ => Some(entry),
    })
}

/// True if any entry, not only the current one, is terminal.
pub fn reached_terminal_status(ledger: &[InvocationStatusRecord]) -> bool {
    ledger.iter().any(|entry| entry.status.is_terminal())
}

pub fn is_queued_for_scheduling(ledger: &[InvocationStatusRecord]) -> bool {
    let queued = current_status(ledger)
        .map(|entry| entry.status == InvocationStatus::Queued)
        .unwrap_or(false);
    queued && !ledger.iter().any(|entry| entry.status == InvocationStatus::Deadly)
}

pub fn failure_count(ledger: &[InvocationStatusRecord]) -> usize {
    ledger
        .iter()
        .filter(|entry| entry.status == InvocationStatus::Failed)
        .count()
}

/// Status that will actually be requested for `requested`, applying dead-letter
/// promotion: a third `Failed` becomes `Deadly`.
pub fn resolve_next_status(
    ledger: &[InvocationStatusRecord],
    requested: InvocationStatus,
) -> InvocationStatus {
    if requested == InvocationStatus::Failed && failure_count(ledger) >= MAX_FAILED_ATTEMPTS {
        InvocationStatus::Deadly
    } else {
        requested
    }
}
