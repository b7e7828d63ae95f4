//! Error type for `sift-store-sqlite`.

use sift_core::{job::JobStatus, store::Store};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sift_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("job not found: {0}")]
  JobNotFound(String),

  /// The ledger refuses any status change the job lifecycle does not allow.
  #[error("job {job_id} cannot move from {from} to {to}")]
  InvalidTransition {
    job_id: String,
    from:   JobStatus,
    to:     JobStatus,
  },

  #[error("no backup of {store}:{item_id} in job {job_id}")]
  BackupNotFound {
    job_id:  String,
    store:   Store,
    item_id: String,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
