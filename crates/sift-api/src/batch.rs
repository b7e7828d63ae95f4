//! Handlers for `/batch` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/batch/deduplicate` | `?agent_id=` (all agents if absent), `?dry_run=` (default `true`) |
//! | `POST` | `/batch/rollback/{job_id}` | 409 with the reason if the job cannot be rolled back |
//! | `GET`  | `/batch/history` | `?job_id=` or `?limit=` (default 50) |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use sift_core::{job::Job, ledger::BatchLedger};
use tracing::info;

use crate::{AppState, auth::Authenticated, error::ApiError};

// ─── Deduplicate ─────────────────────────────────────────────────────────────

fn default_dry_run() -> bool { true }

#[derive(Debug, Deserialize)]
pub struct DeduplicateParams {
  pub agent_id: Option<String>,
  #[serde(default = "default_dry_run")]
  pub dry_run:  bool,
}

/// `GET /batch/deduplicate[?agent_id=<id>][&dry_run=<bool>]`
pub async fn deduplicate<L>(
  _: Authenticated,
  State(state): State<AppState<L>>,
  Query(params): Query<DeduplicateParams>,
) -> Result<Response, ApiError>
where
  L: BatchLedger + 'static,
{
  info!(agent_id = ?params.agent_id, dry_run = params.dry_run, "deduplication requested");
  match params.agent_id.as_deref().map(str::trim) {
    Some("") => Err(ApiError::BadRequest("agent_id must not be empty".into())),
    Some(agent_id) => {
      let report = state.runner.run_agent(agent_id, params.dry_run).await?;
      Ok(Json(report).into_response())
    }
    None => {
      let report = state.runner.run_all(params.dry_run).await?;
      Ok(Json(report).into_response())
    }
  }
}

// ─── Rollback ────────────────────────────────────────────────────────────────

/// `POST /batch/rollback/{job_id}`
pub async fn rollback<L>(
  _: Authenticated,
  State(state): State<AppState<L>>,
  Path(job_id): Path<String>,
) -> Result<Response, ApiError>
where
  L: BatchLedger + 'static,
{
  let outcome = state.runner.rollback(&job_id).await?;
  let status = if outcome.is_completed() { StatusCode::OK } else { StatusCode::CONFLICT };
  Ok((status, Json(outcome)).into_response())
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub job_id: Option<String>,
  pub limit:  Option<usize>,
}

/// `GET /batch/history[?job_id=<id>][&limit=<n>]`
pub async fn history<L>(
  _: Authenticated,
  State(state): State<AppState<L>>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<Job>>, ApiError>
where
  L: BatchLedger + 'static,
{
  if params.limit == Some(0) {
    return Err(ApiError::BadRequest("limit must be positive".into()));
  }
  let jobs = state.runner.history(params.job_id.as_deref(), params.limit).await?;
  if let Some(job_id) = &params.job_id {
    if jobs.is_empty() {
      return Err(ApiError::NotFound(format!("job {job_id} not found")));
    }
  }
  Ok(Json(jobs))
}
