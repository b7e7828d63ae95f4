//! Interfaces to the external collaborators: the knowledge collector, the
//! semantic analyzer, the artifact extractor and the three storage
//! committers.
//!
//! Each one is injected into the engine at construction as a trait object, so
//! tests substitute in-memory fakes and the server substitutes HTTP adapters.
//! Every call returns an explicit `Result`; the engine decides per call site
//! whether a failure is absorbed, collected, or fatal.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
  analysis::AnalysisRequest,
  artifact::{Artifact, RuleDraft, SkillDraft},
  item::{Inventory, KnowledgeItem},
  store::Store,
};

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Failure of a single storage call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitError {
  /// The store could not be reached at all. Aborts the whole batch.
  #[error("store unavailable: {0}")]
  Unavailable(String),

  /// The store refused the payload (e.g. a rule without condition/action).
  #[error("rejected by store validation: {0}")]
  Rejected(String),

  /// Any other per-call failure.
  #[error("commit failed: {0}")]
  Failed(String),
}

/// Failure of the knowledge collector. Always infrastructure-level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("knowledge collector unavailable: {0}")]
pub struct CollectError(pub String);

/// Failure of an analyzer or extractor call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("classifier call failed: {0}")]
pub struct ClassifierError(pub String);

// ─── Collector ───────────────────────────────────────────────────────────────

#[async_trait]
pub trait KnowledgeCollector: Send + Sync {
  /// All agent ids known to the platform.
  async fn list_agents(&self) -> Result<Vec<String>, CollectError>;

  /// Every item of every store for one agent.
  async fn fetch_all(&self, agent_id: &str) -> Result<Inventory, CollectError>;

  /// Re-read a single live item. Returns `None` if it no longer exists.
  ///
  /// Skills may be addressed either by id or by name.
  async fn fetch_item(
    &self,
    agent_id: &str,
    store: Store,
    id: &str,
  ) -> Result<Option<KnowledgeItem>, CollectError> {
    let inventory = self.fetch_all(agent_id).await?;
    Ok(inventory.locate(store, id).cloned())
  }
}

// ─── Classifiers ─────────────────────────────────────────────────────────────

/// The semantic duplicate/mismatch oracle.
///
/// Returns the classifier's raw response text. Parsing happens in exactly one
/// place, [`crate::analysis::parse_outcome`].
#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
  async fn classify(&self, request: &AnalysisRequest) -> Result<String, ClassifierError>;
}

/// Derives structured rule/skill fields from free text.
#[async_trait]
pub trait ArtifactExtractor: Send + Sync {
  async fn extract_rule(&self, content: &str) -> Result<Option<RuleDraft>, ClassifierError>;

  async fn extract_skill(&self, content: &str) -> Result<Option<SkillDraft>, ClassifierError>;
}

/// An extractor that never derives anything; callers fall back to their
/// naive derivations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExtraction;

#[async_trait]
impl ArtifactExtractor for NoExtraction {
  async fn extract_rule(&self, _: &str) -> Result<Option<RuleDraft>, ClassifierError> {
    Ok(None)
  }

  async fn extract_skill(&self, _: &str) -> Result<Option<SkillDraft>, ClassifierError> {
    Ok(None)
  }
}

// ─── Committers ──────────────────────────────────────────────────────────────

/// Create/update/delete primitives for one store.
#[async_trait]
pub trait StorageCommitter: Send + Sync {
  /// Persist a new item. Returns its id when the store reports one.
  async fn create(
    &self,
    agent_id: &str,
    artifact: &Artifact,
  ) -> Result<Option<String>, CommitError>;

  async fn update(
    &self,
    agent_id: &str,
    id: &str,
    artifact: &Artifact,
  ) -> Result<(), CommitError>;

  /// Remove an item. Deleting an absent id must succeed.
  async fn delete(&self, agent_id: &str, id: &str) -> Result<(), CommitError>;
}

/// One committer per store.
#[derive(Clone)]
pub struct Committers {
  pub memory: Arc<dyn StorageCommitter>,
  pub rule:   Arc<dyn StorageCommitter>,
  pub skill:  Arc<dyn StorageCommitter>,
}

impl Committers {
  pub fn for_store(&self, store: Store) -> &dyn StorageCommitter {
    match store {
      Store::Memory => self.memory.as_ref(),
      Store::Rule => self.rule.as_ref(),
      Store::Skill => self.skill.as_ref(),
    }
  }
}
