//! Store-specific payloads handed to a [`StorageCommitter`] on create/update.
//!
//! Two producers exist: relocation (a MOVE builds the target-store artifact
//! from the source item's content) and rollback (a backup is turned back into
//! an artifact for its original store).
//!
//! [`StorageCommitter`]: crate::ports::StorageCommitter

use serde::{Deserialize, Serialize};

use crate::{item::KnowledgeItem, store::Store};

/// Upper bound on a synthesized rule half or skill step, in characters.
pub const FIELD_LIMIT: usize = 500;
/// Upper bound on a synthesized skill description, in characters.
pub const DESCRIPTION_LIMIT: usize = 200;

// ─── Artifact ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
  Memory {
    text: String,
  },
  Rule {
    name:      String,
    condition: String,
    action:    String,
  },
  Skill {
    name:        String,
    description: String,
    steps:       Vec<String>,
  },
}

impl Artifact {
  pub fn store(&self) -> Store {
    match self {
      Self::Memory { .. } => Store::Memory,
      Self::Rule { .. } => Store::Rule,
      Self::Skill { .. } => Store::Skill,
    }
  }

  /// Rebuild the artifact that recreates `item` in its own store.
  ///
  /// Rules prefer their structured condition/action and otherwise split the
  /// raw definition into two consecutive chunks; skills fall back to their
  /// content as a single step.
  pub fn restore(item: &KnowledgeItem) -> Self {
    match item.store {
      Store::Memory => Self::Memory { text: item.content.clone() },
      Store::Rule => {
        let (condition, action) = match (&item.condition, &item.action) {
          (Some(c), Some(a)) if !c.is_empty() && !a.is_empty() => {
            (c.clone(), a.clone())
          }
          _ => chunk_pair(&item.content),
        };
        Self::Rule {
          name: item
            .name
            .clone()
            .unwrap_or_else(|| format!("restored rule {}", short_id(&item.id))),
          condition,
          action,
        }
      }
      Store::Skill => {
        let steps = if item.steps.is_empty() && !item.content.is_empty() {
          vec![item.content.clone()]
        } else {
          item.steps.clone()
        };
        Self::Skill {
          name: item.name.clone().unwrap_or_else(|| item.id.clone()),
          description: item.description.clone().unwrap_or_default(),
          steps,
        }
      }
    }
  }

  /// Build the artifact a MOVE writes into `target`.
  ///
  /// `content` is the full content carried on the plan action; the extractor
  /// drafts are optional and fall back to naive derivations from `content`.
  pub fn relocate(
    source: &KnowledgeItem,
    target: Store,
    content: &str,
    rule: Option<RuleDraft>,
    skill: Option<SkillDraft>,
  ) -> Self {
    let content = if content.is_empty() { source.content.as_str() } else { content };
    match target {
      Store::Memory => Self::Memory { text: content.to_string() },
      Store::Rule => {
        let (draft_name, derived) = match rule {
          Some(d) if d.is_complete() => (d.name, Some((d.condition, d.action))),
          Some(d) => (d.name, None),
          None => (None, None),
        };
        let (condition, action) = derived.unwrap_or_else(|| bisect_lines(content));
        Self::Rule {
          name: source
            .name
            .clone()
            .or(draft_name)
            .unwrap_or_else(|| format!("moved rule {}", short_id(&source.id))),
          condition,
          action,
        }
      }
      Store::Skill => {
        let draft = skill.unwrap_or_default();
        let steps = if draft.steps.is_empty() {
          vec![truncate_chars(content, FIELD_LIMIT)]
        } else {
          draft.steps
        };
        Self::Skill {
          name: source
            .name
            .clone()
            .or(draft.name)
            .unwrap_or_else(|| format!("moved skill {}", short_id(&source.id))),
          description: draft
            .description
            .or_else(|| source.description.clone())
            .unwrap_or_else(|| truncate_chars(content, DESCRIPTION_LIMIT)),
          steps,
        }
      }
    }
  }
}

// ─── Extractor drafts ────────────────────────────────────────────────────────

/// A condition/action pair derived from free text by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
  #[serde(default)]
  pub name:      Option<String>,
  #[serde(default)]
  pub condition: String,
  #[serde(default)]
  pub action:    String,
}

impl RuleDraft {
  pub fn is_complete(&self) -> bool {
    !self.condition.trim().is_empty() && !self.action.trim().is_empty()
  }
}

/// A step list derived from free text by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDraft {
  #[serde(default)]
  pub name:        Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub steps:       Vec<String>,
}

// ─── Text helpers ────────────────────────────────────────────────────────────

/// Split content by lines into a (condition, action) pair: the first half of
/// the lines becomes the condition, the rest the action.
///
/// Single-line content yields an empty condition, which rule stores reject.
pub fn bisect_lines(content: &str) -> (String, String) {
  let lines: Vec<&str> = content.split('\n').collect();
  let mid = lines.len() / 2;
  let condition = truncate_chars(&lines[..mid].join("\n"), FIELD_LIMIT);
  let action = truncate_chars(&lines[mid..].join("\n"), FIELD_LIMIT);
  (condition, action)
}

/// Split content into two consecutive [`FIELD_LIMIT`]-sized chunks. Content
/// that fits in one chunk is used for both halves.
fn chunk_pair(content: &str) -> (String, String) {
  let first = truncate_chars(content, FIELD_LIMIT);
  let rest: String = content.chars().skip(FIELD_LIMIT).take(FIELD_LIMIT).collect();
  if rest.is_empty() { (first.clone(), first) } else { (first, rest) }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((idx, _)) => s[..idx].to_string(),
    None => s.to_string(),
  }
}

fn short_id(id: &str) -> String { truncate_chars(id, 8) }
