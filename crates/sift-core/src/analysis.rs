//! The semantic analyzer boundary.
//!
//! The analyzer sees a formatted listing of all three stores and answers with
//! loosely structured JSON. This module builds that listing and turns the
//! answer into typed [`Findings`]. Anything the analyzer gets wrong (missing
//! fields, unknown store names, non-JSON text) is absorbed here: malformed
//! entries are dropped, and unusable output becomes
//! [`AnalysisOutcome::Degraded`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
  Error,
  artifact::truncate_chars,
  item::{Inventory, KnowledgeItem},
  ports::SemanticAnalyzer,
  store::Store,
};

/// How much of a rule definition is shown to the analyzer.
const RULE_PREVIEW_LIMIT: usize = 200;
const EMPTY_STORE: &str = "(no items)";

// ─── Request ─────────────────────────────────────────────────────────────────

/// The text handed to the analyzer: one numbered listing per store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
  pub memories:   String,
  pub rules:      String,
  pub skills:     String,
  pub item_count: usize,
}

impl AnalysisRequest {
  pub fn from_inventory(inventory: &Inventory) -> Self {
    Self {
      memories:   format_items(&inventory.memories, Store::Memory),
      rules:      format_items(&inventory.rules, Store::Rule),
      skills:     format_items(&inventory.skills, Store::Skill),
      item_count: inventory.counts().total(),
    }
  }
}

/// Render one store's items as a numbered listing.
pub fn format_items(items: &[KnowledgeItem], store: Store) -> String {
  if items.is_empty() {
    return EMPTY_STORE.to_string();
  }

  items
    .iter()
    .enumerate()
    .map(|(idx, item)| {
      let n = idx + 1;
      match store {
        Store::Memory => format!("{n}. ID: {}\n   Content: {}", item.id, item.content),
        Store::Rule => {
          let preview = truncate_chars(&item.content, RULE_PREVIEW_LIMIT);
          let ellipsis = if preview.len() < item.content.len() { "..." } else { "" };
          format!(
            "{n}. ID: {}\n   Name: {}\n   Definition: {preview}{ellipsis}",
            item.id,
            item.name.as_deref().unwrap_or_default(),
          )
        }
        Store::Skill => format_skill(n, item),
      }
    })
    .collect::<Vec<_>>()
    .join("\n\n")
}

fn format_skill(n: usize, item: &KnowledgeItem) -> String {
  let description = item.description.as_deref().unwrap_or_default();
  let numbered = |indent: &str| {
    item
      .steps
      .iter()
      .enumerate()
      .map(|(i, step)| format!("{indent}{}. {step}", i + 1))
      .collect::<Vec<_>>()
      .join("\n")
  };

  let body = if !item.content.is_empty() {
    item.content.clone()
  } else {
    let mut parts = Vec::new();
    if !description.is_empty() {
      parts.push(format!("Description: {description}"));
    }
    if !item.steps.is_empty() {
      parts.push(format!("Steps:\n{}", numbered("  ")));
    }
    parts.join("\n")
  };

  let mut out = format!(
    "{n}. ID: {}\n   Name: {}\n   Description: {description}\n   Full content:\n{body}",
    item.id,
    item.display_name().unwrap_or_default(),
  );
  if !item.steps.is_empty() {
    out.push_str("\n   Procedure:\n");
    out.push_str(&numbered("     "));
  }
  out
}

// ─── Findings ────────────────────────────────────────────────────────────────

/// An item mentioned by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
  pub store:        Store,
  pub id:           String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub summary:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub full_content: Option<String>,
}

/// A parsed `KEEP_<STORE>_DELETE_<STORE>` recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recommendation {
  pub keep:   Store,
  pub delete: Store,
}

impl fmt::Display for Recommendation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "KEEP_{}_DELETE_{}", self.keep, self.delete)
  }
}

impl FromStr for Recommendation {
  type Err = Error;

  /// Store names may themselves contain underscores (`DMN_RULE`), so the
  /// string is split on the `_DELETE_` marker rather than on every `_`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let malformed = || Error::MalformedRecommendation(s.to_string());
    let rest = s.trim().strip_prefix("KEEP_").ok_or_else(malformed)?;
    let (keep, delete) = rest.split_once("_DELETE_").ok_or_else(malformed)?;
    let keep: Store = keep.parse().map_err(|_| malformed())?;
    let delete: Store = delete.parse().map_err(|_| malformed())?;
    if keep == delete {
      return Err(malformed());
    }
    Ok(Self { keep, delete })
  }
}

/// Semantically equal items living in different stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossStoreGroup {
  pub items:          Vec<ItemRef>,
  pub similarity:     Option<f64>,
  /// Raw recommendation text, kept verbatim for the plan record.
  pub recommendation: String,
}

impl CrossStoreGroup {
  pub fn recommendation(&self) -> crate::Result<Recommendation> {
    self.recommendation.parse()
  }
}

/// Semantically equal items inside one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntraStoreGroup {
  pub store:      Store,
  pub similarity: Option<f64>,
  pub keep_ids:   Vec<String>,
  pub delete_ids: Vec<String>,
}

/// An item the analyzer believes belongs in a different store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
  pub id:           String,
  pub from:         Store,
  pub to:           Store,
  pub reason:       Option<String>,
  pub summary:      Option<String>,
  pub full_content: Option<String>,
}

/// Everything usable the analyzer reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
  pub cross_store: Vec<CrossStoreGroup>,
  pub intra_store: Vec<IntraStoreGroup>,
  pub relocations: Vec<Relocation>,
}

impl Findings {
  pub fn is_empty(&self) -> bool {
    self.cross_store.is_empty() && self.intra_store.is_empty() && self.relocations.is_empty()
  }
}

/// Result of one analyzer round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
  Parsed(Findings),
  /// The analyzer failed or answered with something unusable.
  Degraded { reason: String },
}

impl AnalysisOutcome {
  pub fn findings(&self) -> Option<&Findings> {
    match self {
      Self::Parsed(findings) => Some(findings),
      Self::Degraded { .. } => None,
    }
  }

  pub fn degraded_reason(&self) -> Option<&str> {
    match self {
      Self::Parsed(_) => None,
      Self::Degraded { reason } => Some(reason),
    }
  }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct RawFindings {
  #[serde(default)]
  duplicate_groups:          Option<Vec<RawCrossGroup>>,
  #[serde(default)]
  internal_duplicate_groups: Option<Vec<RawIntraGroup>>,
  #[serde(default)]
  mismatch_items:            Option<Vec<RawMismatch>>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
  #[serde(default)]
  id:              Value,
  #[serde(default)]
  storage:         Option<String>,
  #[serde(default)]
  content_summary: Option<String>,
  #[serde(default)]
  full_content:    Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCrossGroup {
  #[serde(default)]
  items:              Vec<RawItem>,
  #[serde(default)]
  similarity_score:   Option<f64>,
  #[serde(default)]
  recommended_action: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIntraGroup {
  #[serde(default)]
  storage:          Option<String>,
  #[serde(default)]
  similarity_score: Option<f64>,
  #[serde(default)]
  keep_ids:         Option<Vec<Value>>,
  #[serde(default)]
  delete_ids:       Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawMismatch {
  #[serde(default)]
  id:                  Value,
  #[serde(default)]
  current_storage:     Option<String>,
  #[serde(default)]
  recommended_storage: Option<String>,
  #[serde(default)]
  content_summary:     Option<String>,
  #[serde(default)]
  full_content:        Option<String>,
  #[serde(default)]
  reason:              Option<String>,
}

/// Ids occasionally come back as numbers.
fn id_of(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn store_of(name: Option<&str>) -> Option<Store> {
  let name = name?;
  match name.parse() {
    Ok(store) => Some(store),
    Err(_) => {
      warn!(store = name, "analyzer named an unknown store; entry dropped");
      None
    }
  }
}

fn non_empty(s: Option<String>) -> Option<String> { s.filter(|s| !s.trim().is_empty()) }

fn strip_fences(raw: &str) -> &str {
  let trimmed = raw.trim();
  let trimmed = trimmed
    .strip_prefix("```json")
    .or_else(|| trimmed.strip_prefix("```"))
    .unwrap_or(trimmed);
  trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Parse raw analyzer text into an outcome.
pub fn parse_outcome(raw: &str) -> AnalysisOutcome {
  let body = strip_fences(raw);
  if body.is_empty() {
    return AnalysisOutcome::Degraded { reason: "analyzer returned no output".into() };
  }

  let raw: RawFindings = match serde_json::from_str(body) {
    Ok(raw) => raw,
    Err(e) => {
      return AnalysisOutcome::Degraded {
        reason: format!("analyzer output is not valid findings JSON: {e}"),
      };
    }
  };

  let cross_store = raw
    .duplicate_groups
    .unwrap_or_default()
    .into_iter()
    .map(|group| CrossStoreGroup {
      items:          group
        .items
        .into_iter()
        .filter_map(|item| {
          Some(ItemRef {
            store:        store_of(item.storage.as_deref())?,
            id:           id_of(&item.id)?,
            summary:      non_empty(item.content_summary),
            full_content: non_empty(item.full_content),
          })
        })
        .collect(),
      similarity:     group.similarity_score,
      recommendation: group.recommended_action.unwrap_or_default(),
    })
    .collect();

  let intra_store = raw
    .internal_duplicate_groups
    .unwrap_or_default()
    .into_iter()
    .filter_map(|group| {
      let ids = |v: Option<Vec<Value>>| -> Vec<String> {
        v.unwrap_or_default().iter().filter_map(id_of).collect()
      };
      Some(IntraStoreGroup {
        store:      store_of(group.storage.as_deref())?,
        similarity: group.similarity_score,
        keep_ids:   ids(group.keep_ids),
        delete_ids: ids(group.delete_ids),
      })
    })
    .collect();

  let relocations = raw
    .mismatch_items
    .unwrap_or_default()
    .into_iter()
    .filter_map(|item| {
      Some(Relocation {
        id:           id_of(&item.id)?,
        from:         store_of(item.current_storage.as_deref())?,
        to:           store_of(item.recommended_storage.as_deref())?,
        reason:       non_empty(item.reason),
        summary:      non_empty(item.content_summary),
        full_content: non_empty(item.full_content),
      })
    })
    .collect();

  AnalysisOutcome::Parsed(Findings { cross_store, intra_store, relocations })
}

/// Run the analyzer once over an inventory.
///
/// An empty inventory never reaches the analyzer. Analyzer failures degrade
/// instead of propagating.
pub async fn analyze(
  analyzer: &dyn SemanticAnalyzer,
  inventory: &Inventory,
) -> AnalysisOutcome {
  if inventory.is_empty() {
    debug!("inventory is empty; skipping analysis");
    return AnalysisOutcome::Parsed(Findings::default());
  }

  let request = AnalysisRequest::from_inventory(inventory);
  let outcome = match analyzer.classify(&request).await {
    Ok(raw) => parse_outcome(&raw),
    Err(e) => AnalysisOutcome::Degraded { reason: e.to_string() },
  };

  match &outcome {
    AnalysisOutcome::Parsed(f) => debug!(
      cross_store = f.cross_store.len(),
      intra_store = f.intra_store.len(),
      relocations = f.relocations.len(),
      "analysis parsed"
    ),
    AnalysisOutcome::Degraded { reason } => {
      warn!(reason = %reason, "analysis degraded; continuing without findings")
    }
  }
  outcome
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;

  use super::*;
  use crate::ports::ClassifierError;

  #[test]
  fn recommendation_handles_multi_word_stores() {
    let r: Recommendation = "KEEP_DMN_RULE_DELETE_MEMORY".parse().unwrap();
    assert_eq!(r, Recommendation { keep: Store::Rule, delete: Store::Memory });

    let r: Recommendation = "KEEP_SKILL_DELETE_DMN_RULE".parse().unwrap();
    assert_eq!(r, Recommendation { keep: Store::Skill, delete: Store::Rule });
    assert_eq!(r.to_string(), "KEEP_SKILL_DELETE_RULE");
  }

  #[test]
  fn recommendation_rejects_garbage() {
    for bad in ["", "KEEP_MEMORY", "DELETE_MEMORY_KEEP_SKILL", "KEEP_MEMORY_DELETE_MEMORY", "KEEP_X_DELETE_SKILL"] {
      assert!(bad.parse::<Recommendation>().is_err(), "{bad} should not parse");
    }
  }

  #[test]
  fn parses_fenced_output() {
    let raw = r#"```json
      {
        "duplicate_groups": [{
          "items": [
            {"id": "r1", "storage": "DMN_RULE", "content_summary": "vip title"},
            {"id": "m1", "storage": "MEMORY"}
          ],
          "similarity_score": 0.95,
          "recommended_action": "KEEP_DMN_RULE_DELETE_MEMORY"
        }],
        "internal_duplicate_groups": [{
          "storage": "MEMORY", "keep_ids": ["m2"], "delete_ids": ["m3", 4]
        }],
        "mismatch_items": [{
          "id": "m5", "current_storage": "MEMORY", "recommended_storage": "SKILL",
          "reason": "step by step"
        }]
      }
    ```"#;

    let AnalysisOutcome::Parsed(f) = parse_outcome(raw) else {
      panic!("expected parsed findings");
    };
    assert_eq!(f.cross_store.len(), 1);
    assert_eq!(f.cross_store[0].items[0].store, Store::Rule);
    assert_eq!(f.cross_store[0].items[0].summary.as_deref(), Some("vip title"));
    assert_eq!(f.intra_store[0].delete_ids, vec!["m3", "4"]);
    assert_eq!(f.relocations[0].to, Store::Skill);
  }

  #[test]
  fn unknown_stores_are_dropped() {
    let raw = r#"{
      "duplicate_groups": [{
        "items": [{"id": "a", "storage": "PLAYBOOK"}, {"id": "b", "storage": "MEMORY"}],
        "recommended_action": "KEEP_PLAYBOOK_DELETE_MEMORY"
      }],
      "internal_duplicate_groups": [{"storage": "NOTES", "delete_ids": ["x"]}],
      "mismatch_items": [{"id": "m1", "current_storage": "MEMORY", "recommended_storage": "WIKI"}]
    }"#;
    let AnalysisOutcome::Parsed(f) = parse_outcome(raw) else {
      panic!("expected parsed findings");
    };
    assert_eq!(f.cross_store[0].items.len(), 1);
    assert!(f.cross_store[0].recommendation().is_err());
    assert!(f.intra_store.is_empty());
    assert!(f.relocations.is_empty());
  }

  #[test]
  fn malformed_output_degrades() {
    assert!(parse_outcome("").degraded_reason().is_some());
    assert!(parse_outcome("I could not find duplicates.").degraded_reason().is_some());
    assert!(parse_outcome("[1, 2]").degraded_reason().is_some());
  }

  #[test]
  fn missing_sections_parse_as_empty() {
    let outcome = parse_outcome(r#"{"duplicate_groups": null}"#);
    assert_eq!(outcome, AnalysisOutcome::Parsed(Findings::default()));
  }

  #[test]
  fn formats_empty_store_placeholder() {
    assert_eq!(format_items(&[], Store::Rule), "(no items)");
  }

  #[test]
  fn formats_rule_preview() {
    let rule = KnowledgeItem::new(Store::Rule, "r1", "<".repeat(250)).with_name("vip");
    let text = format_items(&[rule], Store::Rule);
    assert!(text.starts_with("1. ID: r1\n   Name: vip\n   Definition: "));
    assert!(text.ends_with("..."));
  }

  #[test]
  fn formats_skill_steps() {
    let mut skill = KnowledgeItem::new(Store::Skill, "checkout", "");
    skill.description = Some("order flow".into());
    skill.steps = vec!["confirm".into(), "pay".into()];
    let text = format_items(&[skill], Store::Skill);
    assert!(text.contains("Steps:\n  1. confirm\n  2. pay"));
    assert!(text.contains("Procedure:\n     1. confirm\n     2. pay"));
  }

  struct Counting {
    calls:  AtomicUsize,
    answer: Result<String, ClassifierError>,
  }

  #[async_trait]
  impl SemanticAnalyzer for Counting {
    async fn classify(&self, _: &AnalysisRequest) -> Result<String, ClassifierError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.answer.clone()
    }
  }

  #[tokio::test]
  async fn empty_inventory_skips_the_analyzer() {
    let analyzer = Counting { calls: AtomicUsize::new(0), answer: Ok("{}".into()) };
    let outcome = analyze(&analyzer, &Inventory::default()).await;
    assert_eq!(outcome, AnalysisOutcome::Parsed(Findings::default()));
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn analyzer_error_degrades() {
    let analyzer = Counting {
      calls:  AtomicUsize::new(0),
      answer: Err(ClassifierError("timeout".into())),
    };
    let inventory = Inventory {
      memories: vec![KnowledgeItem::new(Store::Memory, "m1", "hello")],
      ..Default::default()
    };
    let outcome = analyze(&analyzer, &inventory).await;
    assert!(outcome.degraded_reason().unwrap().contains("timeout"));
    assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
  }
}
