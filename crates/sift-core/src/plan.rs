//! Plan types — the mutation list compiled for one agent.
//!
//! A finalized plan holds exactly one [`Action`] per (store, id) of the
//! agent's inventory. A MOVE is the sole disposition of its source item; no
//! DELETE for the same key coexists with it.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
  Error,
  analysis::CrossStoreGroup,
  item::InventoryCounts,
  store::{ItemKey, Store},
};

// ─── Operation ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
  Keep,
  Delete,
  Move,
}

impl Operation {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Keep => "KEEP",
      Self::Delete => "DELETE",
      Self::Move => "MOVE",
    }
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Operation {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "KEEP" => Ok(Self::Keep),
      "DELETE" => Ok(Self::Delete),
      "MOVE" => Ok(Self::Move),
      other => Err(Error::UnknownOperation(other.to_string())),
    }
  }
}

// ─── Action ──────────────────────────────────────────────────────────────────

/// The terminal disposition of one knowledge item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
  Keep {
    store: Store,
    id:    String,
  },
  Delete {
    store:  Store,
    id:     String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
  },
  Move {
    from:    Store,
    to:      Store,
    id:      String,
    /// Full original content, so the executor never depends on re-reading a
    /// store that may already be mutated to build the target artifact.
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason:  Option<String>,
  },
}

impl Action {
  pub fn keep(store: Store, id: impl Into<String>) -> Self {
    Self::Keep { store, id: id.into() }
  }

  pub fn delete(store: Store, id: impl Into<String>, reason: Option<String>) -> Self {
    Self::Delete { store, id: id.into(), reason }
  }

  pub fn operation(&self) -> Operation {
    match self {
      Self::Keep { .. } => Operation::Keep,
      Self::Delete { .. } => Operation::Delete,
      Self::Move { .. } => Operation::Move,
    }
  }

  /// The store the item currently lives in.
  pub fn store(&self) -> Store {
    match self {
      Self::Keep { store, .. } | Self::Delete { store, .. } => *store,
      Self::Move { from, .. } => *from,
    }
  }

  pub fn id(&self) -> &str {
    match self {
      Self::Keep { id, .. } | Self::Delete { id, .. } | Self::Move { id, .. } => id,
    }
  }

  /// The (store, id) this action disposes of. For a MOVE, the source.
  pub fn key(&self) -> ItemKey { ItemKey::new(self.store(), self.id()) }

  /// DELETE and MOVE remove the item from its store and need a backup.
  pub fn is_destructive(&self) -> bool { !matches!(self, Self::Keep { .. }) }
}

// ─── Plan ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
  pub to_delete: usize,
  pub to_keep:   usize,
  pub to_move:   usize,
  pub total:     usize,
}

impl PlanSummary {
  pub fn from_actions(actions: &[Action]) -> Self {
    let count = |op: Operation| actions.iter().filter(|a| a.operation() == op).count();
    Self {
      to_delete: count(Operation::Delete),
      to_keep:   count(Operation::Keep),
      to_move:   count(Operation::Move),
      total:     actions.len(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
  pub agent_id:         String,
  pub inventory:        InventoryCounts,
  /// Cross-store groups exactly as the analyzer reported them.
  pub duplicate_groups: Vec<CrossStoreGroup>,
  pub actions:          Vec<Action>,
  pub summary:          PlanSummary,
  /// KEEP recommendations overridden by a DELETE or MOVE for the same key.
  #[serde(default)]
  pub suppressed_keeps: Vec<ItemKey>,
  /// Set when the analyzer output was unusable and the plan is all KEEPs.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub degraded_reason:  Option<String>,
}

impl Plan {
  pub fn destructive_actions(&self) -> impl Iterator<Item = &Action> {
    self.actions.iter().filter(|a| a.is_destructive())
  }
}
