//! Plan generation: reconcile the analyzer's three recommendation streams into
//! exactly one action per inventory item.
//!
//! Streams are applied in a fixed order (cross-store groups, relocations,
//! intra-store groups) followed by a completeness pass that keeps everything
//! nobody mentioned. A DELETE or MOVE always beats a KEEP for the same item,
//! regardless of which came first; the overridden KEEP is recorded on the plan.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
};

use sift_core::{
  analysis::{self, AnalysisOutcome, CrossStoreGroup, Findings, IntraStoreGroup, Relocation},
  item::Inventory,
  plan::{Action, Plan, PlanSummary},
  ports::SemanticAnalyzer,
  store::{ItemKey, Store},
};
use tracing::{debug, info, warn};

// ─── Generator ───────────────────────────────────────────────────────────────

/// Calls the analyzer once per run and compiles its findings into a [`Plan`].
#[derive(Clone)]
pub struct PlanGenerator {
  analyzer: Arc<dyn SemanticAnalyzer>,
}

impl PlanGenerator {
  pub fn new(analyzer: Arc<dyn SemanticAnalyzer>) -> Self { Self { analyzer } }

  /// Never fails: an unusable analyzer answer yields an all-KEEP plan.
  pub async fn generate_plan(&self, agent_id: &str, inventory: &Inventory) -> Plan {
    let outcome = analysis::analyze(self.analyzer.as_ref(), inventory).await;
    let plan = build_plan(agent_id, inventory, &outcome);
    info!(
      agent_id,
      to_delete = plan.summary.to_delete,
      to_move = plan.summary.to_move,
      to_keep = plan.summary.to_keep,
      degraded = plan.degraded_reason.is_some(),
      "plan generated"
    );
    plan
  }
}

/// Compile an analysis outcome into a plan. Deterministic for equal inputs.
pub fn build_plan(agent_id: &str, inventory: &Inventory, outcome: &AnalysisOutcome) -> Plan {
  let empty = Findings::default();
  let findings = outcome.findings().unwrap_or(&empty);

  let mut builder = PlanBuilder::new(inventory);
  for group in &findings.cross_store {
    builder.apply_cross_store(group);
  }
  for relocation in &findings.relocations {
    builder.apply_relocation(relocation);
  }
  for group in &findings.intra_store {
    builder.apply_intra_store(group);
  }
  builder.fill_defaults();

  let (actions, suppressed_keeps) = builder.finish();
  Plan {
    agent_id: agent_id.to_string(),
    inventory: inventory.counts(),
    duplicate_groups: findings.cross_store.clone(),
    summary: PlanSummary::from_actions(&actions),
    actions,
    suppressed_keeps,
    degraded_reason: outcome.degraded_reason().map(str::to_string),
  }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Accumulates actions while enforcing one disposition per key.
///
/// Actions live in `slots` in the order they were first decided. Replacing a
/// KEEP empties its slot and appends the stronger action, so the final order
/// follows the order in which dispositions became final.
struct PlanBuilder<'a> {
  inventory:  &'a Inventory,
  slots:      Vec<Option<Action>>,
  index:      HashMap<ItemKey, usize>,
  /// Keys disposed of by DELETE or MOVE.
  removed:    HashSet<ItemKey>,
  suppressed: Vec<ItemKey>,
}

impl<'a> PlanBuilder<'a> {
  fn new(inventory: &'a Inventory) -> Self {
    Self {
      inventory,
      slots: Vec::new(),
      index: HashMap::new(),
      removed: HashSet::new(),
      suppressed: Vec::new(),
    }
  }

  /// Map an analyzer reference onto a real inventory key.
  ///
  /// Skills are also matched by name. References to items the inventory does
  /// not hold are dropped.
  fn resolve(&self, store: Store, id: &str) -> Option<ItemKey> {
    match self.inventory.locate(store, id) {
      Some(item) => Some(item.key()),
      None => {
        warn!(store = %store, item_id = id, "analyzer referenced an unknown item; dropped");
        None
      }
    }
  }

  fn push(&mut self, action: Action) {
    let key = action.key();
    if let Some(old) = self.index.get(&key).copied() {
      self.slots[old] = None;
    }
    self.index.insert(key, self.slots.len());
    self.slots.push(Some(action));
  }

  fn current(&self, key: &ItemKey) -> Option<&Action> {
    self.index.get(key).and_then(|&i| self.slots[i].as_ref())
  }

  fn keep(&mut self, key: ItemKey) {
    if self.removed.contains(&key) {
      debug!(item = %key, "KEEP suppressed by an earlier DELETE/MOVE");
      self.suppressed.push(key);
      return;
    }
    if self.current(&key).is_none() {
      self.push(Action::keep(key.store, key.id));
    }
  }

  /// Record a DELETE/MOVE. A key can only be removed once.
  fn remove(&mut self, action: Action) {
    let key = action.key();
    if self.removed.contains(&key) {
      return;
    }
    if self.current(&key).is_some() {
      debug!(item = %key, "earlier KEEP overridden");
      self.suppressed.push(key.clone());
    }
    self.removed.insert(key);
    self.push(action);
  }

  fn apply_cross_store(&mut self, group: &CrossStoreGroup) {
    if group.items.len() < 2 {
      return;
    }
    let recommendation = match group.recommendation() {
      Ok(r) => r,
      Err(e) => {
        warn!(error = %e, "skipping cross-store group");
        return;
      }
    };

    let reason = format!("duplicate of an item kept in {}", recommendation.keep);
    for item in &group.items {
      let Some(key) = self.resolve(item.store, &item.id) else { continue };
      if key.store == recommendation.keep {
        self.keep(key);
      } else if key.store == recommendation.delete {
        self.remove(Action::delete(key.store, key.id, Some(reason.clone())));
      }
    }
  }

  fn apply_relocation(&mut self, relocation: &Relocation) {
    if relocation.from == relocation.to {
      return;
    }
    let Some(key) = self.resolve(relocation.from, &relocation.id) else { return };

    let content = relocation
      .full_content
      .clone()
      .or_else(|| self.inventory.find(&key).map(|item| item.content.clone()))
      .unwrap_or_default();
    let reason = relocation
      .reason
      .clone()
      .or_else(|| Some(format!("{} is a better fit", relocation.to)));

    self.remove(Action::Move {
      from: key.store,
      to: relocation.to,
      id: key.id,
      content,
      reason,
    });
  }

  fn apply_intra_store(&mut self, group: &IntraStoreGroup) {
    for id in &group.keep_ids {
      if let Some(key) = self.resolve(group.store, id) {
        self.keep(key);
      }
    }
    for id in &group.delete_ids {
      if let Some(key) = self.resolve(group.store, id) {
        self.remove(Action::delete(
          key.store,
          key.id,
          Some("semantic duplicate within the same store".into()),
        ));
      }
    }
  }

  fn fill_defaults(&mut self) {
    let unmentioned: Vec<ItemKey> = self
      .inventory
      .iter()
      .map(|item| item.key())
      .filter(|key| !self.index.contains_key(key))
      .collect();
    for key in unmentioned {
      self.push(Action::keep(key.store, key.id));
    }
  }

  fn finish(self) -> (Vec<Action>, Vec<ItemKey>) {
    (self.slots.into_iter().flatten().collect(), self.suppressed)
  }
}
