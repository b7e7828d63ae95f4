//! The `BatchLedger` trait: durable job and backup records.
//!
//! Implemented by `sift-store-sqlite`. The engine and the control surface
//! depend on this abstraction, not on a concrete backend.

use std::future::Future;

use crate::{
  job::{Backup, Job, JobCounters, JobStatus, NewBackup},
  store::Store,
};

/// Job table keyed by job id, backup table keyed by (job id, store, item id).
///
/// Both tables are append/patch only. The only patches allowed are a job's
/// status, counters and summary, and a backup's `moved_to_id` and
/// `restored_at`.
pub trait BatchLedger: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert a new job in `RUNNING` status.
  fn create_job(
    &self,
    job_id: &str,
    agent_id: &str,
    dry_run: bool,
  ) -> impl Future<Output = Result<Job, Self::Error>> + Send;

  /// Move a `RUNNING` job to `COMPLETED` or `FAILED`, recording its outcome.
  ///
  /// Returns an error for any other transition.
  fn finish_job(
    &self,
    job_id: &str,
    status: JobStatus,
    counters: JobCounters,
    summary: serde_json::Value,
  ) -> impl Future<Output = Result<Job, Self::Error>> + Send;

  /// Move a finished job to `ROLLED_BACK`. Succeeds at most once per job.
  fn mark_rolled_back(
    &self,
    job_id: &str,
  ) -> impl Future<Output = Result<Job, Self::Error>> + Send;

  fn get_job(
    &self,
    job_id: &str,
  ) -> impl Future<Output = Result<Option<Job>, Self::Error>> + Send;

  /// Most recent jobs first.
  fn list_jobs(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Job>, Self::Error>> + Send;

  /// Persist a backup. A second backup for the same (job, store, item) is an
  /// error.
  fn insert_backup(
    &self,
    backup: NewBackup,
  ) -> impl Future<Output = Result<Backup, Self::Error>> + Send;

  /// Record the id a MOVE's target store assigned to the relocated item.
  fn set_moved_to_id(
    &self,
    job_id: &str,
    store: Store,
    item_id: &str,
    moved_to_id: &str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Stamp `restored_at` on a backup whose item a rollback has recreated.
  fn mark_restored(
    &self,
    job_id: &str,
    store: Store,
    item_id: &str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// All backups of a job in insertion order.
  fn backups_for_job(
    &self,
    job_id: &str,
  ) -> impl Future<Output = Result<Vec<Backup>, Self::Error>> + Send;
}
