//! In-memory fakes for the external collaborators.
//!
//! One [`Platform`] plays every service at once: it holds the agents'
//! inventories, answers the analyzer with a canned response, and applies
//! committer calls to its own state so tests can inspect the result.

use std::{
  collections::{BTreeMap, HashSet},
  sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use sift_core::{
  analysis::AnalysisRequest,
  artifact::{Artifact, RuleDraft, SkillDraft},
  item::{Inventory, KnowledgeItem},
  ledger::BatchLedger,
  ports::{
    ArtifactExtractor, ClassifierError, CollectError, CommitError, Committers,
    KnowledgeCollector, SemanticAnalyzer, StorageCommitter,
  },
  store::{ItemKey, Store},
};
use sift_store_sqlite::SqliteLedger;

use crate::Collaborators;

#[derive(Default)]
pub struct State {
  pub agents:                BTreeMap<String, Inventory>,
  /// Raw analyzer answer; `None` makes the analyzer call fail.
  pub analyzer_answer:       Option<String>,
  pub analyzer_calls:        usize,
  pub rule_draft:            Option<RuleDraft>,
  /// Rule creates fail validation regardless of payload.
  pub reject_rule_creates:   bool,
  /// Every committer reports the store as unreachable.
  pub unavailable:           bool,
  /// Creates that succeed before every further create reports the store
  /// as unreachable.
  pub creates_before_outage: Option<usize>,
  pub collector_down:        bool,
  /// Agents whose inventory cannot be fetched.
  pub broken_agents:         HashSet<String>,
  pub fail_deletes:          HashSet<ItemKey>,
  /// Mutations in call order, e.g. `delete MEMORY:m2`.
  pub log:                   Vec<String>,
  /// When set, every delete checks that its item was backed up first.
  pub backup_audit:          Option<(SqliteLedger, String)>,
  pub unbacked_deletes:      Vec<ItemKey>,
  next_id:                   usize,
}

#[derive(Default)]
pub struct Platform {
  state: Mutex<State>,
}

impl Platform {
  pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

  pub fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().expect("platform state poisoned")
  }

  pub fn add_agent(&self, agent_id: &str, inventory: Inventory) {
    self.state().agents.insert(agent_id.to_string(), inventory);
  }

  pub fn answer(&self, raw: &str) { self.state().analyzer_answer = Some(raw.to_string()); }

  pub fn inventory(&self, agent_id: &str) -> Inventory {
    self.state().agents.get(agent_id).cloned().unwrap_or_default()
  }

  pub fn collaborators(self: &Arc<Self>) -> Collaborators {
    let committer = |store| -> Arc<dyn StorageCommitter> {
      Arc::new(StoreHandle { platform: self.clone(), store })
    };
    Collaborators {
      collector:  self.clone(),
      analyzer:   self.clone(),
      extractor:  self.clone(),
      committers: Committers {
        memory: committer(Store::Memory),
        rule:   committer(Store::Rule),
        skill:  committer(Store::Skill),
      },
    }
  }
}

fn store_items(inventory: &mut Inventory, store: Store) -> &mut Vec<KnowledgeItem> {
  match store {
    Store::Memory => &mut inventory.memories,
    Store::Rule => &mut inventory.rules,
    Store::Skill => &mut inventory.skills,
  }
}

#[async_trait]
impl KnowledgeCollector for Platform {
  async fn list_agents(&self) -> Result<Vec<String>, CollectError> {
    Ok(self.state().agents.keys().cloned().collect())
  }

  async fn fetch_all(&self, agent_id: &str) -> Result<Inventory, CollectError> {
    let state = self.state();
    if state.collector_down || state.broken_agents.contains(agent_id) {
      return Err(CollectError("connection refused".into()));
    }
    drop(state);
    Ok(self.inventory(agent_id))
  }
}

#[async_trait]
impl SemanticAnalyzer for Platform {
  async fn classify(&self, _: &AnalysisRequest) -> Result<String, ClassifierError> {
    let mut state = self.state();
    state.analyzer_calls += 1;
    state
      .analyzer_answer
      .clone()
      .ok_or_else(|| ClassifierError("analyzer offline".into()))
  }
}

#[async_trait]
impl ArtifactExtractor for Platform {
  async fn extract_rule(&self, _: &str) -> Result<Option<RuleDraft>, ClassifierError> {
    Ok(self.state().rule_draft.clone())
  }

  async fn extract_skill(&self, _: &str) -> Result<Option<SkillDraft>, ClassifierError> {
    Ok(None)
  }
}

/// The committer for one store of the platform.
struct StoreHandle {
  platform: Arc<Platform>,
  store:    Store,
}

#[async_trait]
impl StorageCommitter for StoreHandle {
  async fn create(
    &self,
    agent_id: &str,
    artifact: &Artifact,
  ) -> Result<Option<String>, CommitError> {
    let mut state = self.platform.state();
    if state.unavailable {
      return Err(CommitError::Unavailable("connection refused".into()));
    }
    match state.creates_before_outage.as_mut() {
      Some(0) => return Err(CommitError::Unavailable("connection reset".into())),
      Some(left) => *left -= 1,
      None => {}
    }
    state.next_id += 1;
    let n = state.next_id;

    let item = match artifact {
      Artifact::Memory { text } => {
        KnowledgeItem::new(Store::Memory, format!("mem-{n}"), text.clone())
      }
      Artifact::Rule { name, condition, action } => {
        let incomplete = condition.trim().is_empty() || action.trim().is_empty();
        if state.reject_rule_creates || incomplete {
          return Err(CommitError::Rejected(
            "rule condition and action are required".into(),
          ));
        }
        let content = format!("{condition} => {action}");
        let mut item = KnowledgeItem::new(Store::Rule, format!("rule-{n}"), content)
          .with_name(name.clone());
        item.condition = Some(condition.clone());
        item.action = Some(action.clone());
        item
      }
      Artifact::Skill { name, description, steps } => {
        let mut item = KnowledgeItem::new(Store::Skill, name.clone(), steps.join("\n"))
          .with_name(name.clone());
        item.description = Some(description.clone());
        item.steps = steps.clone();
        item
      }
    };

    let id = item.id.clone();
    state.log.push(format!("create {}", item.key()));
    let inventory = state.agents.entry(agent_id.to_string()).or_default();
    store_items(inventory, self.store).push(item);
    Ok(match self.store {
      Store::Skill => None,
      _ => Some(id),
    })
  }

  async fn update(&self, _: &str, id: &str, _: &Artifact) -> Result<(), CommitError> {
    Err(CommitError::Failed(format!("update of {id} not supported")))
  }

  async fn delete(&self, agent_id: &str, id: &str) -> Result<(), CommitError> {
    let key = ItemKey::new(self.store, id);

    let audit = {
      let state = self.platform.state();
      if state.unavailable {
        return Err(CommitError::Unavailable("connection refused".into()));
      }
      if state.fail_deletes.contains(&key) {
        return Err(CommitError::Failed("internal server error".into()));
      }
      state.backup_audit.clone()
    };

    if let Some((ledger, job_id)) = audit {
      let backups = ledger.backups_for_job(&job_id).await.expect("audit ledger");
      if !backups.iter().any(|b| b.key() == key) {
        self.platform.state().unbacked_deletes.push(key.clone());
      }
    }

    let mut state = self.platform.state();
    state.log.push(format!("delete {key}"));
    if let Some(inventory) = state.agents.get_mut(agent_id) {
      store_items(inventory, self.store).retain(|item| item.id != id);
    }
    Ok(())
  }
}
