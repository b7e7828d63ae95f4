//! JSON control surface for the sift batch engine.
//!
//! Exposes an axum [`Router`] over a [`BatchRunner`] backed by any
//! [`BatchLedger`]. Every route requires HTTP Basic auth. TLS and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", sift_api::api_router(runner.clone(), auth))
//! ```

pub mod auth;
pub mod batch;
pub mod error;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use sift_batch::BatchRunner;
use sift_core::ledger::BatchLedger;
use tower_http::trace::TraceLayer;

pub use auth::AuthConfig;
pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct AppState<L> {
  pub runner: Arc<BatchRunner<L>>,
  pub auth:   Arc<AuthConfig>,
}

impl<L> Clone for AppState<L> {
  fn clone(&self) -> Self {
    Self { runner: self.runner.clone(), auth: self.auth.clone() }
  }
}

/// Build a fully-materialised API router for `runner`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<L>(runner: Arc<BatchRunner<L>>, auth: AuthConfig) -> Router<()>
where
  L: BatchLedger + 'static,
{
  let state = AppState { runner, auth: Arc::new(auth) };
  Router::new()
    .route("/batch/deduplicate", get(batch::deduplicate::<L>))
    .route("/batch/rollback/{job_id}", post(batch::rollback::<L>))
    .route("/batch/history", get(batch::history::<L>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
