//! Safety validation of a plan before any live execution.
//!
//! Fails closed: any error blocks execution. Warnings are advisory only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sift_core::{
  item::{Inventory, KnowledgeItem},
  plan::{Action, Operation, Plan},
  store::{ItemKey, Store},
};
use tracing::{info, warn};

/// More deletions than this draws a warning.
pub const DELETE_WARNING_THRESHOLD: usize = 100;
/// More deletions plus moves than this is refused.
pub const DESTRUCTIVE_HARD_CAP: usize = 200;
/// Share of the inventory a plan may remove before it is refused.
pub const BLAST_RADIUS_LIMIT: f64 = 0.5;
/// Share of the inventory above which removal is logged.
pub const BLAST_RADIUS_ADVISORY: f64 = 0.3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
  pub valid:    bool,
  pub errors:   Vec<String>,
  pub warnings: Vec<String>,
}

pub fn validate(agent_id: &str, plan: &Plan, inventory: &Inventory) -> ValidationReport {
  let mut errors = Vec::new();
  let mut warnings = Vec::new();

  let delete_count = count(plan, Operation::Delete);
  let move_count = count(plan, Operation::Move);
  let destructive = delete_count + move_count;

  // Volume
  if delete_count > DELETE_WARNING_THRESHOLD {
    warnings.push(format!(
      "{delete_count} items are scheduled for deletion; review a dry run first"
    ));
  }
  if destructive > DESTRUCTIVE_HARD_CAP {
    errors.push(format!(
      "{destructive} deletions and moves exceed the limit of {DESTRUCTIVE_HARD_CAP}"
    ));
  }

  // Consistency
  warnings.extend(consistency_warnings(plan));

  // Dependencies
  warnings.extend(dependency_warnings(plan, inventory));

  // Blast radius
  let total = inventory.counts().total();
  if total > 0 {
    let ratio = destructive as f64 / total as f64;
    if ratio > BLAST_RADIUS_LIMIT {
      errors.push(format!(
        "plan changes {:.1}% of all knowledge, above the {:.0}% limit",
        ratio * 100.0,
        BLAST_RADIUS_LIMIT * 100.0
      ));
    } else if ratio > BLAST_RADIUS_ADVISORY {
      warn!(agent_id, ratio, "plan changes a large share of the agent's knowledge");
    }
  }

  let report = ValidationReport { valid: errors.is_empty(), errors, warnings };
  info!(
    agent_id,
    valid = report.valid,
    errors = report.errors.len(),
    warnings = report.warnings.len(),
    "plan validated"
  );
  report
}

fn count(plan: &Plan, op: Operation) -> usize {
  plan.actions.iter().filter(|a| a.operation() == op).count()
}

fn consistency_warnings(plan: &Plan) -> Vec<String> {
  let mut warnings = Vec::new();

  let mut seen: HashMap<ItemKey, Operation> = HashMap::new();
  for action in &plan.actions {
    let key = action.key();
    match seen.get(&key) {
      Some(first) => warnings.push(format!(
        "{key} has more than one planned operation: {first}, {}",
        action.operation()
      )),
      None => {
        seen.insert(key, action.operation());
      }
    }

    if let Action::Move { from, to, id, .. } = action {
      if from == to {
        warnings.push(format!("MOVE of {id} has the same source and target store: {from}"));
      }
    }
  }

  for key in &plan.suppressed_keeps {
    warnings.push(format!(
      "{key} was recommended for KEEP but is removed by another recommendation"
    ));
  }
  warnings
}

/// Textual scan of surviving memories and rules for the names of rules and
/// skills being removed.
fn dependency_warnings(plan: &Plan, inventory: &Inventory) -> Vec<String> {
  let removed: Vec<&KnowledgeItem> = plan
    .destructive_actions()
    .filter(|a| matches!(a.store(), Store::Rule | Store::Skill))
    .filter_map(|a| inventory.find(&a.key()))
    .collect();
  if removed.is_empty() {
    return Vec::new();
  }

  let survivors: Vec<&KnowledgeItem> = plan
    .actions
    .iter()
    .filter(|a| !a.is_destructive() && matches!(a.store(), Store::Memory | Store::Rule))
    .filter_map(|a| inventory.find(&a.key()))
    .collect();

  let mut warnings = Vec::new();
  for target in removed {
    let Some(name) = target.display_name() else { continue };
    let needle = name.to_lowercase();
    for survivor in &survivors {
      let haystack = format!(
        "{}\n{}",
        survivor.name.as_deref().unwrap_or_default(),
        survivor.content
      )
      .to_lowercase();
      if haystack.contains(&needle) {
        warnings.push(format!(
          "{} '{name}' is mentioned by {}; check before removing it",
          target.store,
          survivor.key()
        ));
      }
    }
  }
  warnings
}

#[cfg(test)]
mod tests {
  use sift_core::{
    analysis::{AnalysisOutcome, Findings, IntraStoreGroup},
    plan::PlanSummary,
  };

  use super::*;
  use crate::planner::build_plan;

  fn memories(n: usize) -> Inventory {
    Inventory {
      memories: (0..n)
        .map(|i| KnowledgeItem::new(Store::Memory, format!("m{i}"), format!("memory {i}")))
        .collect(),
      ..Default::default()
    }
  }

  fn plan_deleting(inventory: &Inventory, n: usize) -> Plan {
    let outcome = AnalysisOutcome::Parsed(Findings {
      intra_store: vec![IntraStoreGroup {
        store:      Store::Memory,
        similarity: None,
        keep_ids:   vec![],
        delete_ids: inventory.memories.iter().take(n).map(|m| m.id.clone()).collect(),
      }],
      ..Default::default()
    });
    build_plan("agent-1", inventory, &outcome)
  }

  #[test]
  fn mass_deletion_is_refused() {
    let inventory = memories(300);
    let plan = plan_deleting(&inventory, 250);
    let report = validate("agent-1", &plan, &inventory);

    assert!(!report.valid);
    assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
    assert!(report.errors.iter().any(|e| e.contains("exceed the limit of 200")));
    assert!(report.errors.iter().any(|e| e.contains("83.3%")));
    assert!(report.warnings.iter().any(|w| w.contains("250 items")));
  }

  #[test]
  fn blast_radius_alone_is_refused() {
    let inventory = memories(10);
    let plan = plan_deleting(&inventory, 6);
    let report = validate("agent-1", &plan, &inventory);
    assert!(!report.valid);
    assert_eq!(report.errors.len(), 1);
  }

  #[test]
  fn moderate_plan_is_valid() {
    let inventory = memories(10);
    let plan = plan_deleting(&inventory, 4);
    let report = validate("agent-1", &plan, &inventory);
    assert!(report.valid);
    assert!(report.errors.is_empty());
  }

  #[test]
  fn empty_inventory_is_valid() {
    let inventory = Inventory::default();
    let plan = plan_deleting(&inventory, 0);
    assert!(validate("agent-1", &plan, &inventory).valid);
  }

  #[test]
  fn mentions_of_removed_skills_warn() {
    let inventory = Inventory {
      memories: vec![
        KnowledgeItem::new(Store::Memory, "m1", "Use the Checkout skill for orders"),
        KnowledgeItem::new(Store::Memory, "m2", "unrelated"),
        KnowledgeItem::new(Store::Memory, "m3", "also unrelated"),
      ],
      skills: vec![
        KnowledgeItem::new(Store::Skill, "checkout", "1. confirm 2. pay"),
        KnowledgeItem::new(Store::Skill, "refund", "1. verify 2. refund"),
      ],
      ..Default::default()
    };
    let actions = vec![
      Action::keep(Store::Memory, "m1"),
      Action::keep(Store::Memory, "m2"),
      Action::keep(Store::Memory, "m3"),
      Action::delete(Store::Skill, "checkout", None),
      Action::keep(Store::Skill, "refund"),
    ];
    let plan = Plan {
      agent_id:         "agent-1".into(),
      inventory:        inventory.counts(),
      duplicate_groups: vec![],
      summary:          PlanSummary::from_actions(&actions),
      actions,
      suppressed_keeps: vec![],
      degraded_reason:  None,
    };

    let report = validate("agent-1", &plan, &inventory);
    assert!(report.valid);
    assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
    assert!(report.warnings[0].contains("'checkout'"));
    assert!(report.warnings[0].contains("MEMORY:m1"));
  }

  #[test]
  fn consistency_problems_warn_but_do_not_block() {
    let inventory = memories(4);
    let actions = vec![
      Action::keep(Store::Memory, "m0"),
      Action::delete(Store::Memory, "m0", None),
      Action::Move {
        from:    Store::Memory,
        to:      Store::Memory,
        id:      "m1".into(),
        content: "memory 1".into(),
        reason:  None,
      },
      Action::keep(Store::Memory, "m2"),
      Action::keep(Store::Memory, "m3"),
    ];
    let plan = Plan {
      agent_id:         "agent-1".into(),
      inventory:        inventory.counts(),
      duplicate_groups: vec![],
      summary:          PlanSummary::from_actions(&actions),
      actions,
      suppressed_keeps: vec![ItemKey::new(Store::Memory, "m0")],
      degraded_reason:  None,
    };

    let report = validate("agent-1", &plan, &inventory);
    assert!(report.valid);
    assert_eq!(report.warnings.len(), 3, "{:?}", report.warnings);
  }
}
