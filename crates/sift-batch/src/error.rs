//! Error type for `sift-batch`.
//!
//! Only infrastructure failures surface here. Per-item problems are collected
//! into the execution and rollback reports instead.

use sift_core::ports::{CollectError, CommitError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Collect(#[from] CollectError),

  /// A store was unreachable mid-batch.
  #[error("storage infrastructure failure: {0}")]
  Storage(CommitError),

  #[error("failed to encode job summary: {0}")]
  Summary(#[from] serde_json::Error),

  #[error("ledger error: {0}")]
  Ledger(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn ledger(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Ledger(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
