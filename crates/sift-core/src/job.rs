//! Batch job records and pre-mutation backups.
//!
//! A job is created only for live executions. Its status moves forward only:
//! `RUNNING` ends exactly once in `COMPLETED` or `FAILED`, and either of those
//! may later become `ROLLED_BACK`, which is final.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  item::KnowledgeItem,
  plan::Operation,
  store::{ItemKey, Store},
};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
  Running,
  Completed,
  Failed,
  RolledBack,
}

impl JobStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Running => "RUNNING",
      Self::Completed => "COMPLETED",
      Self::Failed => "FAILED",
      Self::RolledBack => "ROLLED_BACK",
    }
  }

  /// `COMPLETED` and `FAILED` end a run; `ROLLED_BACK` ends a job for good.
  pub fn is_terminal(&self) -> bool { !matches!(self, Self::Running) }

  pub fn can_transition_to(&self, next: JobStatus) -> bool {
    matches!(
      (self, next),
      (Self::Running, Self::Completed | Self::Failed)
        | (Self::Completed | Self::Failed, Self::RolledBack)
    )
  }
}

impl fmt::Display for JobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for JobStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "RUNNING" => Ok(Self::Running),
      "COMPLETED" => Ok(Self::Completed),
      "FAILED" => Ok(Self::Failed),
      "ROLLED_BACK" => Ok(Self::RolledBack),
      other => Err(Error::UnknownJobStatus(other.to_string())),
    }
  }
}

// ─── Job ─────────────────────────────────────────────────────────────────────

/// Outcome counters recorded when a job finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
  pub deleted: usize,
  pub moved:   usize,
  pub kept:    usize,
  pub errors:  usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  pub job_id:         String,
  pub agent_id:       String,
  pub status:         JobStatus,
  pub dry_run:        bool,
  pub started_at:     DateTime<Utc>,
  pub completed_at:   Option<DateTime<Utc>>,
  pub rolled_back_at: Option<DateTime<Utc>>,
  pub counters:       JobCounters,
  /// Free-form result summary written when the job finishes.
  pub summary:        serde_json::Value,
}

/// Generate a job id of the form `batch_<yyyymmdd>_<hhmmss>_<8 hex>`.
pub fn new_job_id(now: DateTime<Utc>) -> String {
  let suffix = Uuid::new_v4().simple().to_string();
  format!("batch_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

// ─── Backup ──────────────────────────────────────────────────────────────────

/// Input for [`BatchLedger::insert_backup`](crate::ledger::BatchLedger::insert_backup).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBackup {
  pub job_id:         String,
  pub agent_id:       String,
  pub operation:      Operation,
  /// The live item as it was immediately before mutation.
  pub original:       KnowledgeItem,
  pub moved_to_store: Option<Store>,
}

/// A persisted snapshot of an item taken before a DELETE or MOVE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
  pub job_id:         String,
  pub agent_id:       String,
  pub operation:      Operation,
  pub original:       KnowledgeItem,
  pub moved_to_store: Option<Store>,
  /// Set once the MOVE's target-store write has succeeded.
  pub moved_to_id:    Option<String>,
  pub created_at:     DateTime<Utc>,
  /// Set once a rollback has recreated `original`.
  pub restored_at:    Option<DateTime<Utc>>,
}

impl Backup {
  pub fn key(&self) -> ItemKey { self.original.key() }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn transitions_only_move_forward() {
    use JobStatus::*;
    assert!(Running.can_transition_to(Completed));
    assert!(Running.can_transition_to(Failed));
    assert!(Completed.can_transition_to(RolledBack));
    assert!(Failed.can_transition_to(RolledBack));

    assert!(!Running.can_transition_to(RolledBack));
    assert!(!Completed.can_transition_to(Failed));
    assert!(!Completed.can_transition_to(Running));
    assert!(!RolledBack.can_transition_to(RolledBack));
    assert!(!RolledBack.can_transition_to(Completed));
  }

  #[test]
  fn job_id_shape() {
    let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
    let id = new_job_id(now);
    assert!(id.starts_with("batch_20260314_092653_"), "{id}");
    let hex = id.rsplit('_').next().unwrap();
    assert_eq!(hex.len(), 8);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn status_round_trips_through_str() {
    for s in ["RUNNING", "COMPLETED", "FAILED", "ROLLED_BACK"] {
      assert_eq!(s.parse::<JobStatus>().unwrap().as_str(), s);
    }
    assert!("PAUSED".parse::<JobStatus>().is_err());
  }
}
