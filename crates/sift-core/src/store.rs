//! The three knowledge stores and the key that addresses an item in one.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// One of the three per-agent knowledge stores.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Store {
  /// Episodic memory: preferences, experience, free-form guidance.
  Memory,
  /// Decision rules ("if X then Y").
  #[serde(alias = "DMN_RULE")]
  Rule,
  /// Procedural skills ("first X, then Y").
  Skill,
}

impl Store {
  pub const ALL: [Store; 3] = [Store::Memory, Store::Rule, Store::Skill];

  /// The canonical upper-case name used on the wire and in the ledger.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Memory => "MEMORY",
      Self::Rule => "RULE",
      Self::Skill => "SKILL",
    }
  }

  /// Lower-case path segment used by the HTTP knowledge service.
  pub fn path_segment(&self) -> &'static str {
    match self {
      Self::Memory => "memories",
      Self::Rule => "rules",
      Self::Skill => "skills",
    }
  }
}

impl fmt::Display for Store {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Store {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "MEMORY" => Ok(Self::Memory),
      "RULE" | "DMN_RULE" => Ok(Self::Rule),
      "SKILL" => Ok(Self::Skill),
      _ => Err(Error::UnknownStore(s.to_string())),
    }
  }
}

/// Addresses one item: ids are only unique within an agent's store.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ItemKey {
  pub store: Store,
  pub id:    String,
}

impl ItemKey {
  pub fn new(store: Store, id: impl Into<String>) -> Self {
    Self { store, id: id.into() }
  }
}

impl fmt::Display for ItemKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.store, self.id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_aliases_case_insensitively() {
    assert_eq!("dmn_rule".parse::<Store>().unwrap(), Store::Rule);
    assert_eq!("RULE".parse::<Store>().unwrap(), Store::Rule);
    assert_eq!(" memory ".parse::<Store>().unwrap(), Store::Memory);
    assert!("PLAYBOOK".parse::<Store>().is_err());
  }

  #[test]
  fn serde_accepts_dmn_alias() {
    let s: Store = serde_json::from_str("\"DMN_RULE\"").unwrap();
    assert_eq!(s, Store::Rule);
    assert_eq!(serde_json::to_string(&Store::Rule).unwrap(), "\"RULE\"");
  }
}
