//! Pre-mutation backups.

use std::collections::HashSet;

use sift_core::{
  job::NewBackup,
  ledger::BatchLedger,
  plan::Action,
  ports::KnowledgeCollector,
  store::ItemKey,
};
use tracing::{info, warn};

use crate::{Error, Result};

/// Snapshot the live state of every item a DELETE or MOVE will touch.
///
/// Runs to completion before the first mutation of a job. Items that no longer
/// exist are skipped; the returned set holds the keys that were backed up, and
/// only those may be mutated afterwards.
pub async fn create_backups<L: BatchLedger>(
  collector: &dyn KnowledgeCollector,
  ledger: &L,
  agent_id: &str,
  job_id: &str,
  actions: &[Action],
) -> Result<HashSet<ItemKey>> {
  let mut backed_up = HashSet::new();
  let destructive: Vec<&Action> = actions.iter().filter(|a| a.is_destructive()).collect();
  if destructive.is_empty() {
    return Ok(backed_up);
  }

  let live = collector.fetch_all(agent_id).await?;

  for action in destructive {
    let key = action.key();
    if backed_up.contains(&key) {
      continue;
    }

    let Some(item) = live.locate(key.store, &key.id) else {
      warn!(agent_id, job_id, item = %key, "item vanished before backup; skipped");
      continue;
    };

    let mut original = item.clone();
    // Key the backup by the id the plan uses so later patches find it.
    original.id = key.id.clone();

    let moved_to_store = match action {
      Action::Move { to, .. } => Some(*to),
      _ => None,
    };
    ledger
      .insert_backup(NewBackup {
        job_id: job_id.to_string(),
        agent_id: agent_id.to_string(),
        operation: action.operation(),
        original,
        moved_to_store,
      })
      .await
      .map_err(Error::ledger)?;
    backed_up.insert(key);
  }

  info!(agent_id, job_id, backups = backed_up.len(), "backups created");
  Ok(backed_up)
}
