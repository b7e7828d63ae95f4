//! End-to-end batch runs: collect, plan, validate, execute, record.

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sift_core::{
  item::InventoryCounts,
  job::{Job, JobCounters, JobStatus, new_job_id},
  ledger::BatchLedger,
  plan::{Action, Plan},
  store::{ItemKey, Store},
};
use tracing::{error, info, warn};

use crate::{
  Collaborators, Error, Result,
  executor::{ActionFailure, ActionState, ExecutionMode, ExecutionReport, Executor},
  planner::PlanGenerator,
  rollback::{RollbackManager, RollbackOutcome},
  validator::{self, ValidationReport},
};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
  /// The agent holds no knowledge.
  Skipped,
  /// Validation refused the plan; nothing ran.
  Blocked,
  Completed,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
  pub agent_id:   String,
  pub status:     AgentStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub job_id:     Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub plan:       Option<Plan>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub validation: Option<ValidationReport>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execution:  Option<ExecutionReport>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message:    Option<String>,
}

impl AgentReport {
  fn new(agent_id: &str, status: AgentStatus) -> Self {
    Self {
      agent_id: agent_id.to_string(),
      status,
      job_id: None,
      plan: None,
      validation: None,
      execution: None,
      message: None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchTotals {
  pub agents:  usize,
  pub skipped: usize,
  pub blocked: usize,
  pub failed:  usize,
  pub deleted: usize,
  pub moved:   usize,
  pub kept:    usize,
  pub errors:  usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
  pub dry_run: bool,
  pub totals:  BatchTotals,
  pub agents:  Vec<AgentReport>,
}

impl BatchReport {
  fn record(&mut self, report: AgentReport) {
    let totals = &mut self.totals;
    totals.agents += 1;
    match report.status {
      AgentStatus::Skipped => totals.skipped += 1,
      AgentStatus::Blocked => totals.blocked += 1,
      AgentStatus::Failed => totals.failed += 1,
      AgentStatus::Completed => {}
    }
    // Dry-run counts are previews and stay out of the totals.
    if let Some(execution) = report.execution.as_ref().filter(|e| !e.dry_run) {
      totals.deleted += execution.deleted_count;
      totals.moved += execution.moved_count;
      totals.kept += execution.kept_count;
      totals.errors += execution.errors.len();
    }
    self.agents.push(report);
  }
}

/// What a finished job records as its summary.
#[derive(Debug, Serialize)]
struct JobSummary<'a> {
  deleted_items:   Vec<DeletedItem<'a>>,
  moved_items:     Vec<MovedItem<'a>>,
  kept_by_store:   BTreeMap<Store, usize>,
  counts:          JobCounters,
  inventory:       InventoryCounts,
  errors:          &'a [ActionFailure],
  demoted_moves:   &'a [ItemKey],
  backups_created: usize,
}

#[derive(Debug, Serialize)]
struct DeletedItem<'a> {
  store:  Store,
  id:     &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  reason: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct MovedItem<'a> {
  id:   &'a str,
  from: Store,
  to:   Store,
}

impl<'a> JobSummary<'a> {
  fn new(plan: &'a Plan, report: &'a ExecutionReport) -> Self {
    let mut summary = Self {
      deleted_items:   Vec::new(),
      moved_items:     Vec::new(),
      kept_by_store:   BTreeMap::new(),
      counts:          counters(report),
      inventory:       plan.inventory,
      errors:          &report.errors,
      demoted_moves:   &report.demoted_moves,
      backups_created: report.backups_created,
    };

    for (action, status) in plan.actions.iter().zip(&report.states) {
      if status.state == ActionState::Failed {
        continue;
      }
      match action {
        Action::Keep { store, .. } => *summary.kept_by_store.entry(*store).or_default() += 1,
        Action::Delete { store, id, reason } => summary.deleted_items.push(DeletedItem {
          store:  *store,
          id,
          reason: reason.as_deref(),
        }),
        Action::Move { from, id, .. } if report.demoted_moves.contains(&action.key()) => {
          summary.deleted_items.push(DeletedItem {
            store:  *from,
            id,
            reason: Some("target store rejected the move"),
          })
        }
        Action::Move { from, to, id, .. } => {
          summary.moved_items.push(MovedItem { id, from: *from, to: *to })
        }
      }
    }
    summary
  }
}

fn counters(report: &ExecutionReport) -> JobCounters {
  JobCounters {
    deleted: report.deleted_count,
    moved:   report.moved_count,
    kept:    report.kept_count,
    errors:  report.errors.len(),
  }
}

// ─── Runner ──────────────────────────────────────────────────────────────────

/// Drives batch runs, rollbacks and history over one ledger.
///
/// At most one run per agent may be in flight; callers are responsible for
/// not overlapping them.
pub struct BatchRunner<L> {
  collaborators: Collaborators,
  ledger:        Arc<L>,
  planner:       PlanGenerator,
  executor:      Executor<L>,
  rollback:      RollbackManager<L>,
}

impl<L: BatchLedger> BatchRunner<L> {
  pub fn new(collaborators: Collaborators, ledger: Arc<L>) -> Self {
    Self {
      planner: PlanGenerator::new(collaborators.analyzer.clone()),
      executor: Executor::new(&collaborators, ledger.clone()),
      rollback: RollbackManager::new(&collaborators, ledger.clone()),
      collaborators,
      ledger,
    }
  }

  pub fn ledger(&self) -> &L { &self.ledger }

  /// Run one agent. Only live runs create a job. An error means the run
  /// aborted; if a job had been created by then it is marked `FAILED`.
  pub async fn run_agent(&self, agent_id: &str, dry_run: bool) -> Result<AgentReport> {
    let inventory = self.collaborators.collector.fetch_all(agent_id).await?;
    if inventory.is_empty() {
      info!(agent_id, "no knowledge items; skipped");
      let mut report = AgentReport::new(agent_id, AgentStatus::Skipped);
      report.message = Some("agent has no knowledge items".into());
      return Ok(report);
    }

    let plan = self.planner.generate_plan(agent_id, &inventory).await;

    let validation = if dry_run {
      None
    } else {
      let validation = validator::validate(agent_id, &plan, &inventory);
      if !validation.valid {
        warn!(agent_id, errors = ?validation.errors, "plan refused by validation");
        let mut report = AgentReport::new(agent_id, AgentStatus::Blocked);
        report.message = Some("plan failed validation; nothing was executed".into());
        report.plan = Some(plan);
        report.validation = Some(validation);
        return Ok(report);
      }
      Some(validation)
    };

    if dry_run {
      let execution = self.executor.execute(agent_id, &plan, ExecutionMode::DryRun).await?;
      return Ok(AgentReport {
        agent_id: agent_id.to_string(),
        status: AgentStatus::Completed,
        job_id: None,
        plan: Some(plan),
        validation,
        execution: Some(execution),
        message: None,
      });
    }

    let job_id = new_job_id(Utc::now());
    self.ledger.create_job(&job_id, agent_id, false).await.map_err(Error::ledger)?;
    info!(agent_id, job_id, "job started");

    let mode = ExecutionMode::Live { job_id: job_id.clone() };
    let execution = match self.executor.execute(agent_id, &plan, mode).await {
      Ok(execution) => execution,
      Err(e) => {
        error!(agent_id, job_id, error = %e, "batch aborted");
        let summary = serde_json::json!({ "error": e.to_string() });
        self.mark_failed(agent_id, &job_id, JobCounters::default(), summary).await;
        return Err(e);
      }
    };

    let summary = serde_json::to_value(JobSummary::new(&plan, &execution))?;
    if let Err(e) = self
      .ledger
      .finish_job(&job_id, JobStatus::Completed, counters(&execution), summary.clone())
      .await
    {
      // Stores are already mutated; leave the job in a rollbackable state.
      error!(agent_id, job_id, error = %e, "could not mark job completed");
      let mut summary = summary;
      if let Some(fields) = summary.as_object_mut() {
        fields.insert("error".into(), e.to_string().into());
      }
      self.mark_failed(agent_id, &job_id, counters(&execution), summary).await;
      return Err(Error::ledger(e));
    }
    info!(agent_id, job_id, "job completed");

    Ok(AgentReport {
      agent_id: agent_id.to_string(),
      status: AgentStatus::Completed,
      job_id: Some(job_id),
      plan: Some(plan),
      validation,
      execution: Some(execution),
      message: None,
    })
  }

  async fn mark_failed(
    &self,
    agent_id: &str,
    job_id: &str,
    counters: JobCounters,
    summary: serde_json::Value,
  ) {
    if let Err(e) = self.ledger.finish_job(job_id, JobStatus::Failed, counters, summary).await {
      error!(agent_id, job_id, error = %e, "could not mark job failed");
    }
  }

  /// Run every agent the collector knows about, one after another.
  ///
  /// Only a failure to list the agents is an error; a failing agent is
  /// recorded in the report and the run moves on.
  pub async fn run_all(&self, dry_run: bool) -> Result<BatchReport> {
    let agents = self.collaborators.collector.list_agents().await?;
    info!(agents = agents.len(), dry_run, "batch run started");

    let mut batch = BatchReport { dry_run, ..Default::default() };
    for agent_id in &agents {
      let report = match self.run_agent(agent_id, dry_run).await {
        Ok(report) => report,
        Err(e) => {
          warn!(agent_id, error = %e, "agent run failed; continuing");
          let mut report = AgentReport::new(agent_id, AgentStatus::Failed);
          report.message = Some(e.to_string());
          report
        }
      };
      batch.record(report);
    }

    let t = &batch.totals;
    info!(
      agents = t.agents,
      skipped = t.skipped,
      blocked = t.blocked,
      failed = t.failed,
      deleted = t.deleted,
      moved = t.moved,
      "batch run finished"
    );
    Ok(batch)
  }

  pub async fn rollback(&self, job_id: &str) -> Result<RollbackOutcome> {
    self.rollback.rollback(job_id).await
  }

  /// One job by id, or the most recent jobs (newest first).
  pub async fn history(&self, job_id: Option<&str>, limit: Option<usize>) -> Result<Vec<Job>> {
    match job_id {
      Some(job_id) => {
        let job = self.ledger.get_job(job_id).await.map_err(Error::ledger)?;
        Ok(job.into_iter().collect())
      }
      None => {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        self.ledger.list_jobs(limit).await.map_err(Error::ledger)
      }
    }
  }
}
