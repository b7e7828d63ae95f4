//! Knowledge items and the per-agent inventory they are collected into.
//!
//! An item is owned by its store. Store-specific structure (a rule's
//! condition/action, a skill's description and steps) rides along in optional
//! fields so that a backup can faithfully reconstruct the item later.

use serde::{Deserialize, Serialize};

use crate::store::{ItemKey, Store};

// ─── Item ────────────────────────────────────────────────────────────────────

/// A single piece of knowledge as collected from one of the stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeItem {
  pub store:       Store,
  /// Unique within (agent, store). Skills use their name as id.
  pub id:          String,
  pub name:        Option<String>,
  /// Raw content: memory text, rule definition source, or skill document.
  #[serde(default)]
  pub content:     String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub action:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub steps:       Vec<String>,
}

impl KnowledgeItem {
  /// Convenience constructor with all optional fields empty.
  pub fn new(store: Store, id: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      store,
      id: id.into(),
      name: None,
      content: content.into(),
      condition: None,
      action: None,
      description: None,
      steps: Vec::new(),
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn key(&self) -> ItemKey { ItemKey::new(self.store, self.id.clone()) }

  /// The name other items would use to mention this one.
  ///
  /// Skills are addressed by name, so their id doubles as the name.
  pub fn display_name(&self) -> Option<&str> {
    match (&self.name, self.store) {
      (Some(n), _) if !n.trim().is_empty() => Some(n.as_str()),
      (_, Store::Skill) if !self.id.is_empty() => Some(self.id.as_str()),
      _ => None,
    }
  }
}

// ─── Inventory ───────────────────────────────────────────────────────────────

/// Everything an agent knows, one collection per store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
  #[serde(default)]
  pub memories: Vec<KnowledgeItem>,
  #[serde(default)]
  pub rules:    Vec<KnowledgeItem>,
  #[serde(default)]
  pub skills:   Vec<KnowledgeItem>,
}

impl Inventory {
  pub fn is_empty(&self) -> bool {
    self.memories.is_empty() && self.rules.is_empty() && self.skills.is_empty()
  }

  pub fn counts(&self) -> InventoryCounts {
    InventoryCounts {
      memory: self.memories.len(),
      rule:   self.rules.len(),
      skill:  self.skills.len(),
    }
  }

  pub fn store(&self, store: Store) -> &[KnowledgeItem] {
    match store {
      Store::Memory => &self.memories,
      Store::Rule => &self.rules,
      Store::Skill => &self.skills,
    }
  }

  /// All items in store order (memories, rules, skills).
  pub fn iter(&self) -> impl Iterator<Item = &KnowledgeItem> {
    self.memories.iter().chain(&self.rules).chain(&self.skills)
  }

  pub fn find(&self, key: &ItemKey) -> Option<&KnowledgeItem> {
    self.store(key.store).iter().find(|item| item.id == key.id)
  }

  /// Like [`Inventory::find`], but skills also match by name.
  pub fn locate(&self, store: Store, id: &str) -> Option<&KnowledgeItem> {
    let items = self.store(store);
    items.iter().find(|item| item.id == id).or_else(|| match store {
      Store::Skill => items.iter().find(|item| item.name.as_deref() == Some(id)),
      _ => None,
    })
  }
}

/// Item counts per store, recorded on every plan and job summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCounts {
  pub memory: usize,
  pub rule:   usize,
  pub skill:  usize,
}

impl InventoryCounts {
  pub fn total(&self) -> usize { self.memory + self.rule + self.skill }
}
