//! Sync session audit model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of cycle a session records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    /// Drains currently pending items
    Incremental,
    /// Re-enqueues every local record, optionally after truncating the remote
    Full,
    /// Snapshot push against a new backend
    Migration,
    /// Remote-to-local apply
    Pull,
}

impl CycleKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Full => "full",
            Self::Migration => "migration",
            Self::Pull => "pull",
        }
    }
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "incremental" => Ok(Self::Incremental),
            "full" => Ok(Self::Full),
            "migration" => Ok(Self::Migration),
            "pull" => Ok(Self::Pull),
            other => Err(Error::Validation(format!("unknown cycle kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Outcome for a finished cycle with the given totals.
    pub const fn from_totals(synced: i64, failed: i64) -> Self {
        if failed > 0 && synced == 0 {
            Self::Failed
        } else {
            Self::Completed
        }
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation(format!("unknown session status '{other}'"))),
        }
    }
}

/// One recorded sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSession {
    pub id: i64,
    pub kind: CycleKind,
    /// Unix ms
    pub started_at: i64,
    /// Unix ms, unset while running
    pub finished_at: Option<i64>,
    pub total_queued: i64,
    pub total_synced: i64,
    pub total_failed: i64,
    pub status: SessionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_totals() {
        assert_eq!(SessionStatus::from_totals(0, 0), SessionStatus::Completed);
        assert_eq!(SessionStatus::from_totals(3, 2), SessionStatus::Completed);
        assert_eq!(SessionStatus::from_totals(0, 2), SessionStatus::Failed);
    }
}
