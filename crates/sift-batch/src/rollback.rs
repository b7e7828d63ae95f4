//! Reversal of a finished job from its backups.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sift_core::{
  artifact::Artifact,
  job::{Backup, Job, JobStatus},
  ledger::BatchLedger,
  plan::Operation,
  ports::{Committers, KnowledgeCollector},
  store::ItemKey,
};
use tracing::{debug, info, warn};

use crate::{
  Collaborators, Error, Result,
  executor::{ActionFailure, FailureKind, classify},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollbackOutcome {
  /// A precondition failed. Nothing was touched.
  Rejected { job_id: String, reason: String },
  Completed {
    job_id:           String,
    /// Includes items recreated by an earlier, interrupted attempt.
    restored_count:   usize,
    /// Backed-up items that still exist live and were left alone.
    already_present:  Vec<ItemKey>,
    /// Relocated copies removed from their target store.
    targets_removed:  usize,
    errors:           Vec<ActionFailure>,
    /// MOVEs whose target item was never recorded and may still exist.
    unverified_moves: Vec<ItemKey>,
  },
}

impl RollbackOutcome {
  fn rejected(job_id: &str, reason: impl Into<String>) -> Self {
    let reason = reason.into();
    warn!(job_id, %reason, "rollback rejected");
    Self::Rejected { job_id: job_id.to_string(), reason }
  }

  pub fn is_completed(&self) -> bool { matches!(self, Self::Completed { .. }) }
}

pub struct RollbackManager<L> {
  collector:  Arc<dyn KnowledgeCollector>,
  committers: Committers,
  ledger:     Arc<L>,
}

impl<L: BatchLedger> RollbackManager<L> {
  pub fn new(collaborators: &Collaborators, ledger: Arc<L>) -> Self {
    Self {
      collector: collaborators.collector.clone(),
      committers: collaborators.committers.clone(),
      ledger,
    }
  }

  pub async fn rollback(&self, job_id: &str) -> Result<RollbackOutcome> {
    let job = self.ledger.get_job(job_id).await.map_err(Error::ledger)?;
    let job = match precondition(job_id, job) {
      Ok(job) => job,
      Err(outcome) => return Ok(outcome),
    };

    let backups = self.ledger.backups_for_job(job_id).await.map_err(Error::ledger)?;
    if backups.is_empty() {
      return Ok(RollbackOutcome::rejected(job_id, "job has no backups to restore"));
    }

    info!(job_id, agent_id = %job.agent_id, backups = backups.len(), "rollback started");
    let live = self.collector.fetch_all(&job.agent_id).await?;

    let mut restored_count = 0;
    let mut already_present = Vec::new();
    let mut targets_removed = 0;
    let mut errors = Vec::new();
    let mut unverified_moves = Vec::new();

    for backup in &backups {
      let key = backup.key();

      if backup.restored_at.is_some() {
        debug!(job_id, item = %key, "restored by an earlier attempt");
        restored_count += 1;
      } else if live.locate(key.store, &key.id).is_some() {
        already_present.push(key.clone());
      } else {
        match self.restore(&job.agent_id, backup).await? {
          Ok(()) => {
            self
              .ledger
              .mark_restored(job_id, key.store, &key.id)
              .await
              .map_err(Error::ledger)?;
            restored_count += 1;
          }
          Err((kind, message)) => {
            warn!(job_id, item = %key, %message, "restore failed");
            // Leave any relocated copy in place; it is the only one left.
            errors.push(failure(backup, kind, message));
            continue;
          }
        }
      }

      if backup.operation != Operation::Move {
        continue;
      }
      let (Some(target), Some(moved_to_id)) = (backup.moved_to_store, &backup.moved_to_id)
      else {
        unverified_moves.push(key);
        continue;
      };
      match self.committers.for_store(target).delete(&job.agent_id, moved_to_id).await {
        Ok(()) => targets_removed += 1,
        Err(e) => {
          let (kind, message) = classify(e)?;
          warn!(job_id, item = %key, %target, %moved_to_id, %message, "target removal failed");
          let message = format!("remove {target}:{moved_to_id}: {message}");
          errors.push(failure(backup, kind, message));
        }
      }
    }

    self.ledger.mark_rolled_back(job_id).await.map_err(Error::ledger)?;
    info!(
      job_id,
      restored = restored_count,
      present = already_present.len(),
      targets_removed,
      errors = errors.len(),
      unverified = unverified_moves.len(),
      "rollback finished"
    );

    Ok(RollbackOutcome::Completed {
      job_id: job_id.to_string(),
      restored_count,
      already_present,
      targets_removed,
      errors,
      unverified_moves,
    })
  }

  async fn restore(
    &self,
    agent_id: &str,
    backup: &Backup,
  ) -> Result<Result<(), (FailureKind, String)>> {
    let artifact = Artifact::restore(&backup.original);
    match self.committers.for_store(backup.original.store).create(agent_id, &artifact).await {
      Ok(_) => Ok(Ok(())),
      Err(e) => classify(e).map(Err),
    }
  }
}

fn precondition(job_id: &str, job: Option<Job>) -> Result<Job, RollbackOutcome> {
  let Some(job) = job else {
    return Err(RollbackOutcome::rejected(job_id, "job not found"));
  };
  if job.dry_run {
    return Err(RollbackOutcome::rejected(job_id, "dry-run jobs made no changes"));
  }
  if job.status == JobStatus::RolledBack {
    return Err(RollbackOutcome::rejected(job_id, "job was already rolled back"));
  }
  if !job.status.is_terminal() {
    return Err(RollbackOutcome::rejected(job_id, "job is still running"));
  }
  Ok(job)
}

fn failure(backup: &Backup, kind: FailureKind, message: String) -> ActionFailure {
  ActionFailure { key: backup.key(), operation: backup.operation, kind, message }
}
