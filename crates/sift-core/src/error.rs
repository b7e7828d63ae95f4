//! Error types for `sift-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown store name: {0:?}")]
  UnknownStore(String),

  #[error("unknown job status: {0:?}")]
  UnknownJobStatus(String),

  #[error("unknown operation: {0:?}")]
  UnknownOperation(String),

  #[error("malformed recommendation: {0:?}")]
  MalformedRecommendation(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
