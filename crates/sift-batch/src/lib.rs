//! The batch deduplication engine.
//!
//! Collects an agent's knowledge, compiles a conflict-free plan from the
//! analyzer's findings, validates it, executes it behind pre-mutation backups,
//! and can reverse a finished job.
//!
//! All external collaborators are injected as trait objects through
//! [`Collaborators`]; the job ledger is any [`sift_core::ledger::BatchLedger`].

pub mod backup;
pub mod error;
pub mod executor;
pub mod planner;
pub mod rollback;
pub mod runner;
pub mod validator;

use std::sync::Arc;

use sift_core::ports::{ArtifactExtractor, Committers, KnowledgeCollector, SemanticAnalyzer};

pub use error::{Error, Result};
pub use runner::BatchRunner;

/// Every external service the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
  pub collector:  Arc<dyn KnowledgeCollector>,
  pub analyzer:   Arc<dyn SemanticAnalyzer>,
  pub extractor:  Arc<dyn ArtifactExtractor>,
  pub committers: Committers,
}

#[cfg(test)]
mod testing;
