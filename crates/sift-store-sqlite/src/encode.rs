//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Enums use their canonical upper-case
//! names. The backed-up item and the job summary are compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use sift_core::{
  item::KnowledgeItem,
  job::{Backup, Job, JobCounters, JobStatus},
  plan::Operation,
  store::Store,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width so that `ORDER BY started_at` sorts chronologically.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Counters ────────────────────────────────────────────────────────────────

/// SQLite integers are signed; counters never approach the limit.
pub fn encode_count(n: usize) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }

fn decode_count(n: i64) -> usize { usize::try_from(n).unwrap_or_default() }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawJob::from_row`].
pub const JOB_COLUMNS: &str = "job_id, agent_id, status, dry_run, started_at, \
                               completed_at, rolled_back_at, deleted_count, \
                               moved_count, kept_count, error_count, summary";

/// Raw values read directly from a `batch_jobs` row.
pub struct RawJob {
  pub job_id:         String,
  pub agent_id:       String,
  pub status:         String,
  pub dry_run:        bool,
  pub started_at:     String,
  pub completed_at:   Option<String>,
  pub rolled_back_at: Option<String>,
  pub deleted:        i64,
  pub moved:          i64,
  pub kept:           i64,
  pub errors:         i64,
  pub summary:        String,
}

impl RawJob {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      job_id:         row.get(0)?,
      agent_id:       row.get(1)?,
      status:         row.get(2)?,
      dry_run:        row.get(3)?,
      started_at:     row.get(4)?,
      completed_at:   row.get(5)?,
      rolled_back_at: row.get(6)?,
      deleted:        row.get(7)?,
      moved:          row.get(8)?,
      kept:           row.get(9)?,
      errors:         row.get(10)?,
      summary:        row.get(11)?,
    })
  }

  pub fn into_job(self) -> Result<Job> {
    Ok(Job {
      job_id:         self.job_id,
      agent_id:       self.agent_id,
      status:         self.status.parse::<JobStatus>()?,
      dry_run:        self.dry_run,
      started_at:     decode_dt(&self.started_at)?,
      completed_at:   self.completed_at.as_deref().map(decode_dt).transpose()?,
      rolled_back_at: self.rolled_back_at.as_deref().map(decode_dt).transpose()?,
      counters:       JobCounters {
        deleted: decode_count(self.deleted),
        moved:   decode_count(self.moved),
        kept:    decode_count(self.kept),
        errors:  decode_count(self.errors),
      },
      summary:        serde_json::from_str(&self.summary)?,
    })
  }
}

/// Column list matching [`RawBackup::from_row`].
pub const BACKUP_COLUMNS: &str = "job_id, agent_id, operation, original, \
                                  moved_to_store, moved_to_id, created_at, restored_at";

/// Raw values read directly from a `batch_backups` row.
pub struct RawBackup {
  pub job_id:         String,
  pub agent_id:       String,
  pub operation:      String,
  pub original:       String,
  pub moved_to_store: Option<String>,
  pub moved_to_id:    Option<String>,
  pub created_at:     String,
  pub restored_at:    Option<String>,
}

impl RawBackup {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      job_id:         row.get(0)?,
      agent_id:       row.get(1)?,
      operation:      row.get(2)?,
      original:       row.get(3)?,
      moved_to_store: row.get(4)?,
      moved_to_id:    row.get(5)?,
      created_at:     row.get(6)?,
      restored_at:    row.get(7)?,
    })
  }

  pub fn into_backup(self) -> Result<Backup> {
    let original: KnowledgeItem = serde_json::from_str(&self.original)?;
    Ok(Backup {
      job_id: self.job_id,
      agent_id: self.agent_id,
      operation: self.operation.parse::<Operation>()?,
      original,
      moved_to_store: self.moved_to_store.as_deref().map(str::parse::<Store>).transpose()?,
      moved_to_id: self.moved_to_id,
      created_at: decode_dt(&self.created_at)?,
      restored_at: self.restored_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
