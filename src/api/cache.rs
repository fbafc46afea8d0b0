//! Record implementations for the service types.

use std::cmp::Ordering;

use crate::cache::Record;

use super::types::{Comment, Issue, Label, Milestone, Reaction};

impl Record for Milestone {
  type Key = u64;

  fn key(&self) -> u64 {
    self.number
  }

  fn local_order(&self, other: &Self) -> Ordering {
    self.number.cmp(&other.number)
  }

  fn entity_type() -> &'static str {
    "milestone"
  }
}

impl Record for Label {
  type Key = String;

  fn key(&self) -> String {
    self.name.clone()
  }

  /// Alphabetical, case-insensitive, with exact comparison as tie-breaker.
  fn local_order(&self, other: &Self) -> Ordering {
    self
      .name
      .to_lowercase()
      .cmp(&other.name.to_lowercase())
      .then_with(|| self.name.cmp(&other.name))
  }

  fn entity_type() -> &'static str {
    "label"
  }
}

impl Record for Issue {
  type Key = u64;

  fn key(&self) -> u64 {
    self.number
  }

  fn local_order(&self, other: &Self) -> Ordering {
    self.number.cmp(&other.number)
  }

  fn entity_type() -> &'static str {
    "issue"
  }
}

impl Record for Comment {
  type Key = u64;

  fn key(&self) -> u64 {
    self.id
  }

  fn local_order(&self, other: &Self) -> Ordering {
    self.id.cmp(&other.id)
  }

  fn entity_type() -> &'static str {
    "comment"
  }
}

impl Record for Reaction {
  type Key = u64;

  fn key(&self) -> u64 {
    self.id
  }

  fn local_order(&self, other: &Self) -> Ordering {
    self.id.cmp(&other.id)
  }

  fn entity_type() -> &'static str {
    "reaction"
  }
}
