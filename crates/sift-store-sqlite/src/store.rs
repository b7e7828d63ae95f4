//! [`SqliteLedger`] — the SQLite implementation of [`BatchLedger`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use sift_core::{
  job::{Backup, Job, JobCounters, JobStatus, NewBackup},
  ledger::BatchLedger,
  store::Store,
};
use tracing::debug;

use crate::{
  Error, Result,
  encode::{BACKUP_COLUMNS, JOB_COLUMNS, RawBackup, RawJob, encode_count, encode_dt},
  schema::{MIGRATE_V2, SCHEMA},
};

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// A batch ledger backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteLedger {
  conn: tokio_rusqlite::Connection,
}

impl SqliteLedger {
  /// Open (or create) a ledger at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let ledger = Self { conn };
    ledger.init_schema().await?;
    Ok(ledger)
  }

  /// Open an in-memory ledger — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let ledger = Self { conn };
    ledger.init_schema().await?;
    Ok(ledger)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version == 1 {
          conn.execute_batch(MIGRATE_V2)?;
        }
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn require_job(&self, job_id: &str) -> Result<Job> {
    self
      .get_job(job_id)
      .await?
      .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
  }

  /// Build the error for a status change the current row does not allow.
  async fn refused(&self, job_id: &str, to: JobStatus) -> Error {
    match self.require_job(job_id).await {
      Ok(job) => Error::InvalidTransition {
        job_id: job_id.to_string(),
        from: job.status,
        to,
      },
      Err(e) => e,
    }
  }
}

// ─── BatchLedger impl ────────────────────────────────────────────────────────

impl BatchLedger for SqliteLedger {
  type Error = Error;

  // ── Jobs ──────────────────────────────────────────────────────────────────

  async fn create_job(&self, job_id: &str, agent_id: &str, dry_run: bool) -> Result<Job> {
    let job = Job {
      job_id: job_id.to_string(),
      agent_id: agent_id.to_string(),
      status: JobStatus::Running,
      dry_run,
      started_at: Utc::now(),
      completed_at: None,
      rolled_back_at: None,
      counters: JobCounters::default(),
      summary: serde_json::json!({}),
    };

    let id_str     = job.job_id.clone();
    let agent_str  = job.agent_id.clone();
    let status_str = job.status.as_str();
    let at_str     = encode_dt(job.started_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO batch_jobs (job_id, agent_id, status, dry_run, started_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, agent_str, status_str, dry_run, at_str],
        )?;
        Ok(())
      })
      .await?;

    debug!(job_id, agent_id, "job created");
    Ok(job)
  }

  async fn finish_job(
    &self,
    job_id: &str,
    status: JobStatus,
    counters: JobCounters,
    summary: serde_json::Value,
  ) -> Result<Job> {
    if !JobStatus::Running.can_transition_to(status) {
      return Err(self.refused(job_id, status).await);
    }

    let id_str      = job_id.to_string();
    let status_str  = status.as_str();
    let at_str      = encode_dt(Utc::now());
    let summary_str = serde_json::to_string(&summary)?;

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE batch_jobs
              SET status = ?2, completed_at = ?3,
                  deleted_count = ?4, moved_count = ?5,
                  kept_count = ?6, error_count = ?7,
                  summary = ?8
            WHERE job_id = ?1 AND status = 'RUNNING'",
          rusqlite::params![
            id_str,
            status_str,
            at_str,
            encode_count(counters.deleted),
            encode_count(counters.moved),
            encode_count(counters.kept),
            encode_count(counters.errors),
            summary_str,
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(self.refused(job_id, status).await);
    }
    self.require_job(job_id).await
  }

  async fn mark_rolled_back(&self, job_id: &str) -> Result<Job> {
    let id_str = job_id.to_string();
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE batch_jobs
              SET status = 'ROLLED_BACK', rolled_back_at = ?2
            WHERE job_id = ?1 AND status IN ('COMPLETED', 'FAILED')",
          rusqlite::params![id_str, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(self.refused(job_id, JobStatus::RolledBack).await);
    }
    self.require_job(job_id).await
  }

  async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
    let id_str = job_id.to_string();

    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {JOB_COLUMNS} FROM batch_jobs WHERE job_id = ?1"),
              rusqlite::params![id_str],
              RawJob::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawJob::into_job).transpose()
  }

  async fn list_jobs(&self, limit: usize) -> Result<Vec<Job>> {
    let limit = encode_count(limit);

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {JOB_COLUMNS} FROM batch_jobs
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit], RawJob::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawJob::into_job).collect()
  }

  // ── Backups ───────────────────────────────────────────────────────────────

  async fn insert_backup(&self, input: NewBackup) -> Result<Backup> {
    let backup = Backup {
      job_id:         input.job_id,
      agent_id:       input.agent_id,
      operation:      input.operation,
      original:       input.original,
      moved_to_store: input.moved_to_store,
      moved_to_id:    None,
      created_at:     Utc::now(),
      restored_at:    None,
    };

    let job_str      = backup.job_id.clone();
    let agent_str    = backup.agent_id.clone();
    let store_str    = backup.original.store.as_str();
    let item_str     = backup.original.id.clone();
    let op_str       = backup.operation.as_str();
    let original_str = serde_json::to_string(&backup.original)?;
    let moved_str    = backup.moved_to_store.map(|s| s.as_str());
    let at_str       = encode_dt(backup.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO batch_backups (
             job_id, agent_id, store, item_id, operation,
             original, moved_to_store, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            job_str,
            agent_str,
            store_str,
            item_str,
            op_str,
            original_str,
            moved_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(backup)
  }

  async fn set_moved_to_id(
    &self,
    job_id: &str,
    store: Store,
    item_id: &str,
    moved_to_id: &str,
  ) -> Result<()> {
    let job_str   = job_id.to_string();
    let store_str = store.as_str();
    let item_str  = item_id.to_string();
    let moved_str = moved_to_id.to_string();

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE batch_backups SET moved_to_id = ?4
            WHERE job_id = ?1 AND store = ?2 AND item_id = ?3",
          rusqlite::params![job_str, store_str, item_str, moved_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::BackupNotFound {
        job_id: job_id.to_string(),
        store,
        item_id: item_id.to_string(),
      });
    }
    Ok(())
  }

  async fn mark_restored(&self, job_id: &str, store: Store, item_id: &str) -> Result<()> {
    let job_str   = job_id.to_string();
    let store_str = store.as_str();
    let item_str  = item_id.to_string();
    let at_str    = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE batch_backups SET restored_at = ?4
            WHERE job_id = ?1 AND store = ?2 AND item_id = ?3",
          rusqlite::params![job_str, store_str, item_str, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::BackupNotFound {
        job_id: job_id.to_string(),
        store,
        item_id: item_id.to_string(),
      });
    }
    debug!(job_id, %store, item_id, "backup marked restored");
    Ok(())
  }

  async fn backups_for_job(&self, job_id: &str) -> Result<Vec<Backup>> {
    let id_str = job_id.to_string();

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {BACKUP_COLUMNS} FROM batch_backups
            WHERE job_id = ?1
            ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawBackup::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBackup::into_backup).collect()
  }
}
