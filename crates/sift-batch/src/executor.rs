//! Plan execution against the three non-transactional stores.
//!
//! A live run writes every backup before the first mutation, then applies the
//! actions in plan order. Per-item failures are collected into the report and
//! processing continues. Only infrastructure failures (an unreachable store or
//! collector, a ledger write error) abort the batch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sift_core::{
  artifact::Artifact,
  item::KnowledgeItem,
  ledger::BatchLedger,
  plan::{Action, Operation, Plan},
  ports::{ArtifactExtractor, CommitError, Committers, KnowledgeCollector},
  store::{ItemKey, Store},
};
use tracing::{debug, info, warn};

use crate::{Collaborators, Error, Result, backup};

// ─── Report types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
  /// Report what would happen. No I/O at all.
  DryRun,
  Live { job_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
  Pending,
  /// Dry run only.
  Reported,
  BackedUp,
  Applied,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStatus {
  pub key:       ItemKey,
  pub operation: Operation,
  pub state:     ActionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// The item no longer existed when the action ran.
  Missing,
  /// A store refused the payload.
  Rejected,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailure {
  pub key:       ItemKey,
  pub operation: Operation,
  pub kind:      FailureKind,
  pub message:   String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
  pub dry_run:         bool,
  pub deleted_count:   usize,
  pub moved_count:     usize,
  pub kept_count:      usize,
  pub errors:          Vec<ActionFailure>,
  pub backups_created: usize,
  /// MOVEs whose target write was rejected; the source was deleted instead.
  pub demoted_moves:   Vec<ItemKey>,
  pub states:          Vec<ActionStatus>,
}

enum MoveResult {
  Moved,
  Demoted,
  Failed(FailureKind, String),
}

// ─── Executor ────────────────────────────────────────────────────────────────

pub struct Executor<L> {
  collector:  Arc<dyn KnowledgeCollector>,
  extractor:  Arc<dyn ArtifactExtractor>,
  committers: Committers,
  ledger:     Arc<L>,
}

impl<L: BatchLedger> Executor<L> {
  pub fn new(collaborators: &Collaborators, ledger: Arc<L>) -> Self {
    Self {
      collector: collaborators.collector.clone(),
      extractor: collaborators.extractor.clone(),
      committers: collaborators.committers.clone(),
      ledger,
    }
  }

  pub async fn execute(
    &self,
    agent_id: &str,
    plan: &Plan,
    mode: ExecutionMode,
  ) -> Result<ExecutionReport> {
    match mode {
      ExecutionMode::DryRun => Ok(dry_run(agent_id, plan)),
      ExecutionMode::Live { job_id } => self.execute_live(agent_id, plan, &job_id).await,
    }
  }

  async fn execute_live(
    &self,
    agent_id: &str,
    plan: &Plan,
    job_id: &str,
  ) -> Result<ExecutionReport> {
    info!(agent_id, job_id, actions = plan.actions.len(), "execution started");

    let backed_up = backup::create_backups(
      self.collector.as_ref(),
      self.ledger.as_ref(),
      agent_id,
      job_id,
      &plan.actions,
    )
    .await?;

    let mut report = ExecutionReport {
      backups_created: backed_up.len(),
      states: plan
        .actions
        .iter()
        .map(|a| ActionStatus {
          key:       a.key(),
          operation: a.operation(),
          state:     if backed_up.contains(&a.key()) {
            ActionState::BackedUp
          } else {
            ActionState::Pending
          },
        })
        .collect(),
      ..Default::default()
    };

    for (idx, action) in plan.actions.iter().enumerate() {
      let key = action.key();
      let outcome = match action {
        Action::Keep { .. } => {
          report.kept_count += 1;
          Ok(())
        }
        _ if !backed_up.contains(&key) => {
          Err((FailureKind::Missing, "item no longer exists".to_string()))
        }
        Action::Delete { .. } => match self.delete(agent_id, &key).await? {
          Ok(()) => {
            report.deleted_count += 1;
            Ok(())
          }
          Err(failure) => Err(failure),
        },
        Action::Move { to, content, .. } => {
          match self.relocate(agent_id, job_id, &key, *to, content).await? {
            MoveResult::Moved => {
              report.moved_count += 1;
              Ok(())
            }
            MoveResult::Demoted => {
              report.deleted_count += 1;
              report.demoted_moves.push(key.clone());
              Ok(())
            }
            MoveResult::Failed(kind, message) => Err((kind, message)),
          }
        }
      };

      report.states[idx].state = match outcome {
        Ok(()) => ActionState::Applied,
        Err((kind, message)) => {
          warn!(agent_id, job_id, item = %key, op = %action.operation(), %message, "action failed");
          report.errors.push(ActionFailure {
            key,
            operation: action.operation(),
            kind,
            message,
          });
          ActionState::Failed
        }
      };
    }

    info!(
      agent_id,
      job_id,
      deleted = report.deleted_count,
      moved = report.moved_count,
      kept = report.kept_count,
      errors = report.errors.len(),
      "execution finished"
    );
    Ok(report)
  }

  /// Outer error aborts the batch; inner error is a collected failure.
  async fn delete(
    &self,
    agent_id: &str,
    key: &ItemKey,
  ) -> Result<Result<(), (FailureKind, String)>> {
    match self.committers.for_store(key.store).delete(agent_id, &key.id).await {
      Ok(()) => {
        debug!(agent_id, item = %key, "deleted");
        Ok(Ok(()))
      }
      Err(e) => classify(e).map(Err),
    }
  }

  async fn relocate(
    &self,
    agent_id: &str,
    job_id: &str,
    key: &ItemKey,
    target: Store,
    content: &str,
  ) -> Result<MoveResult> {
    let Some(source) = self.collector.fetch_item(agent_id, key.store, &key.id).await? else {
      return Ok(MoveResult::Failed(
        FailureKind::Missing,
        "source item no longer exists".into(),
      ));
    };

    let artifact = self.target_artifact(&source, target, content).await;
    match self.committers.for_store(target).create(agent_id, &artifact).await {
      Ok(created_id) => {
        let moved_to_id = created_id.or_else(|| match &artifact {
          Artifact::Skill { name, .. } => Some(name.clone()),
          _ => None,
        });
        if let Some(moved_to_id) = &moved_to_id {
          self
            .ledger
            .set_moved_to_id(job_id, key.store, &key.id, moved_to_id)
            .await
            .map_err(Error::ledger)?;
        }

        match self.delete(agent_id, key).await? {
          Ok(()) => {
            info!(agent_id, item = %key, to = %target, moved_to_id = ?moved_to_id, "moved");
            Ok(MoveResult::Moved)
          }
          Err((kind, message)) => Ok(MoveResult::Failed(
            kind,
            format!("created in {target} but source delete failed: {message}"),
          )),
        }
      }
      Err(CommitError::Rejected(reason)) => {
        warn!(
          agent_id,
          item = %key,
          to = %target,
          %reason,
          "target rejected the move; deleting source only"
        );
        match self.delete(agent_id, key).await? {
          Ok(()) => Ok(MoveResult::Demoted),
          Err((kind, message)) => Ok(MoveResult::Failed(
            kind,
            format!("target rejected ({reason}) and source delete failed: {message}"),
          )),
        }
      }
      Err(e) => {
        let (kind, message) = classify(e)?;
        Ok(MoveResult::Failed(kind, format!("create in {target} failed: {message}")))
      }
    }
  }

  /// Build the artifact for `target`, asking the extractor for structure when
  /// the target needs it. Extractor failures fall back to naive derivation.
  async fn target_artifact(
    &self,
    source: &KnowledgeItem,
    target: Store,
    content: &str,
  ) -> Artifact {
    let text = if content.is_empty() { source.content.as_str() } else { content };
    let (rule, skill) = match target {
      Store::Memory => (None, None),
      Store::Rule => match self.extractor.extract_rule(text).await {
        Ok(draft) => (draft, None),
        Err(e) => {
          warn!(error = %e, "rule extraction failed; falling back to line split");
          (None, None)
        }
      },
      Store::Skill => match self.extractor.extract_skill(text).await {
        Ok(draft) => (None, draft),
        Err(e) => {
          warn!(error = %e, "skill extraction failed; falling back to a single step");
          (None, None)
        }
      },
    };
    Artifact::relocate(source, target, text, rule, skill)
  }
}

/// Split a committer error into abort (outer) or collected failure (inner).
pub(crate) fn classify(e: CommitError) -> Result<(FailureKind, String)> {
  match e {
    CommitError::Unavailable(_) => Err(Error::Storage(e)),
    CommitError::Rejected(m) => Ok((FailureKind::Rejected, m)),
    CommitError::Failed(m) => Ok((FailureKind::Failed, m)),
  }
}

fn dry_run(agent_id: &str, plan: &Plan) -> ExecutionReport {
  info!(
    agent_id,
    to_delete = plan.summary.to_delete,
    to_move = plan.summary.to_move,
    to_keep = plan.summary.to_keep,
    "dry run; nothing executed"
  );
  ExecutionReport {
    dry_run: true,
    deleted_count: plan.summary.to_delete,
    moved_count: plan.summary.to_move,
    kept_count: plan.summary.to_keep,
    states: plan
      .actions
      .iter()
      .map(|a| ActionStatus {
        key:       a.key(),
        operation: a.operation(),
        state:     ActionState::Reported,
      })
      .collect(),
    ..Default::default()
  }
}

#[cfg(test)]
mod tests {
  use sift_core::{
    artifact::RuleDraft,
    item::Inventory,
    plan::PlanSummary,
  };
  use sift_store_sqlite::SqliteLedger;

  use super::*;
  use crate::testing::Platform;

  fn plan(actions: Vec<Action>, inventory: &Inventory) -> Plan {
    Plan {
      agent_id:         "agent-1".into(),
      inventory:        inventory.counts(),
      duplicate_groups: vec![],
      summary:          PlanSummary::from_actions(&actions),
      actions,
      suppressed_keeps: vec![],
      degraded_reason:  None,
    }
  }

  fn inventory() -> Inventory {
    Inventory {
      memories: vec![
        KnowledgeItem::new(Store::Memory, "m1", "prefers short answers"),
        KnowledgeItem::new(Store::Memory, "m2", "prefers short answers!"),
        KnowledgeItem::new(Store::Memory, "m3", "VIP users are called director"),
      ],
      ..Default::default()
    }
  }

  fn move_m3_to_rule() -> Action {
    Action::Move {
      from:    Store::Memory,
      to:      Store::Rule,
      id:      "m3".into(),
      content: "VIP users are called director".into(),
      reason:  None,
    }
  }

  async fn setup() -> (Arc<Platform>, Arc<SqliteLedger>, Executor<SqliteLedger>) {
    let platform = Platform::new();
    platform.add_agent("agent-1", inventory());
    let ledger = Arc::new(SqliteLedger::open_in_memory().await.unwrap());
    ledger.create_job("batch_1", "agent-1", false).await.unwrap();
    platform.state().backup_audit = Some(((*ledger).clone(), "batch_1".into()));
    let executor = Executor::new(&platform.collaborators(), ledger.clone());
    (platform, ledger, executor)
  }

  fn live() -> ExecutionMode { ExecutionMode::Live { job_id: "batch_1".into() } }

  #[tokio::test]
  async fn dry_run_touches_nothing() {
    let (platform, ledger, executor) = setup().await;
    let inv = inventory();
    let plan = plan(
      vec![
        Action::keep(Store::Memory, "m1"),
        Action::delete(Store::Memory, "m2", None),
        move_m3_to_rule(),
      ],
      &inv,
    );

    let report = executor.execute("agent-1", &plan, ExecutionMode::DryRun).await.unwrap();
    assert!(report.dry_run);
    assert_eq!((report.deleted_count, report.moved_count, report.kept_count), (1, 1, 1));
    assert!(report.states.iter().all(|s| s.state == ActionState::Reported));
    assert!(platform.state().log.is_empty());
    assert!(ledger.backups_for_job("batch_1").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn deletes_are_backed_up_before_they_run() {
    let (platform, ledger, executor) = setup().await;
    let inv = inventory();
    let plan = plan(
      vec![
        Action::keep(Store::Memory, "m1"),
        Action::delete(Store::Memory, "m2", None),
        Action::keep(Store::Memory, "m3"),
      ],
      &inv,
    );

    let report = executor.execute("agent-1", &plan, live()).await.unwrap();
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.kept_count, 2);
    assert_eq!(report.backups_created, 1);
    assert!(report.errors.is_empty());
    assert!(platform.state().unbacked_deletes.is_empty());
    assert_eq!(platform.state().log, vec!["delete MEMORY:m2"]);
    assert_eq!(ledger.backups_for_job("batch_1").await.unwrap().len(), 1);
    assert!(report.states.iter().all(|s| s.state == ActionState::Applied));
  }

  #[tokio::test]
  async fn move_creates_target_patches_backup_and_deletes_source() {
    let (platform, ledger, executor) = setup().await;
    platform.state().rule_draft = Some(RuleDraft {
      name:      Some("vip title".into()),
      condition: "user is VIP".into(),
      action:    "call them director".into(),
    });
    let inv = inventory();
    let plan = plan(vec![move_m3_to_rule()], &inv);

    let report = executor.execute("agent-1", &plan, live()).await.unwrap();
    assert_eq!(report.moved_count, 1);
    assert!(report.demoted_moves.is_empty());

    let after = platform.inventory("agent-1");
    assert!(after.memories.iter().all(|m| m.id != "m3"));
    assert_eq!(after.rules.len(), 1);
    assert_eq!(after.rules[0].condition.as_deref(), Some("user is VIP"));

    let backups = ledger.backups_for_job("batch_1").await.unwrap();
    assert_eq!(backups[0].moved_to_store, Some(Store::Rule));
    assert_eq!(backups[0].moved_to_id.as_deref(), Some(after.rules[0].id.as_str()));
    assert_eq!(platform.state().log[0], format!("create RULE:{}", after.rules[0].id));
  }

  #[tokio::test]
  async fn rejected_move_to_rule_becomes_delete_only() {
    let (platform, ledger, executor) = setup().await;
    platform.state().reject_rule_creates = true;
    let inv = inventory();
    let plan = plan(vec![Action::keep(Store::Memory, "m1"), move_m3_to_rule()], &inv);

    let report = executor.execute("agent-1", &plan, live()).await.unwrap();
    assert_eq!(report.moved_count, 0);
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.demoted_moves, vec![ItemKey::new(Store::Memory, "m3")]);
    assert!(report.errors.is_empty());

    let after = platform.inventory("agent-1");
    assert!(after.memories.iter().all(|m| m.id != "m3"));
    assert!(after.rules.is_empty());

    let backups = ledger.backups_for_job("batch_1").await.unwrap();
    assert!(backups[0].moved_to_id.is_none());
  }

  #[tokio::test]
  async fn single_line_move_without_extractor_is_demoted() {
    let (platform, _ledger, executor) = setup().await;
    let inv = inventory();
    let plan = plan(vec![move_m3_to_rule()], &inv);

    let report = executor.execute("agent-1", &plan, live()).await.unwrap();
    assert_eq!(report.demoted_moves.len(), 1);
    assert!(platform.inventory("agent-1").rules.is_empty());
  }

  #[tokio::test]
  async fn move_to_skill_records_skill_name() {
    let (platform, ledger, executor) = setup().await;
    let inv = inventory();
    let plan = plan(
      vec![Action::Move {
        from:    Store::Memory,
        to:      Store::Skill,
        id:      "m1".into(),
        content: String::new(),
        reason:  None,
      }],
      &inv,
    );

    let report = executor.execute("agent-1", &plan, live()).await.unwrap();
    assert_eq!(report.moved_count, 1);
    let skills = platform.inventory("agent-1").skills;
    assert_eq!(skills[0].steps, vec!["prefers short answers"]);
    let backups = ledger.backups_for_job("batch_1").await.unwrap();
    assert_eq!(backups[0].moved_to_id.as_deref(), Some("moved skill m1"));
  }

  #[tokio::test]
  async fn failed_delete_is_collected_and_processing_continues() {
    let (platform, _ledger, executor) = setup().await;
    platform
      .state()
      .fail_deletes
      .insert(ItemKey::new(Store::Memory, "m1"));
    let inv = inventory();
    let plan = plan(
      vec![
        Action::delete(Store::Memory, "m1", None),
        Action::delete(Store::Memory, "m2", None),
        Action::keep(Store::Memory, "m3"),
      ],
      &inv,
    );

    let report = executor.execute("agent-1", &plan, live()).await.unwrap();
    assert_eq!(report.deleted_count, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].key, ItemKey::new(Store::Memory, "m1"));
    assert_eq!(report.errors[0].kind, FailureKind::Failed);
    assert_eq!(report.states[0].state, ActionState::Failed);
    assert_eq!(report.states[1].state, ActionState::Applied);
  }

  #[tokio::test]
  async fn vanished_items_are_reported_missing() {
    let (_platform, ledger, executor) = setup().await;
    let inv = inventory();
    let plan = plan(vec![Action::delete(Store::Memory, "ghost", None)], &inv);

    let report = executor.execute("agent-1", &plan, live()).await.unwrap();
    assert_eq!(report.deleted_count, 0);
    assert_eq!(report.errors[0].kind, FailureKind::Missing);
    assert!(ledger.backups_for_job("batch_1").await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn unreachable_store_aborts_after_backups() {
    let (platform, ledger, executor) = setup().await;
    platform.state().unavailable = true;
    let inv = inventory();
    let plan = plan(vec![Action::delete(Store::Memory, "m2", None)], &inv);

    let err = executor.execute("agent-1", &plan, live()).await.unwrap_err();
    assert!(matches!(err, Error::Storage(CommitError::Unavailable(_))));
    assert_eq!(ledger.backups_for_job("batch_1").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn unreachable_collector_aborts_before_mutation() {
    let (platform, _ledger, executor) = setup().await;
    platform.state().collector_down = true;
    let inv = inventory();
    let plan = plan(vec![Action::delete(Store::Memory, "m2", None)], &inv);

    let err = executor.execute("agent-1", &plan, live()).await.unwrap_err();
    assert!(matches!(err, Error::Collect(_)));
    assert!(platform.state().log.is_empty());
  }
}
