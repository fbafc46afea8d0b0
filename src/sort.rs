//! Label-based sort specification for issue lists.

use std::fmt;

use crate::api::types::Label;
use crate::cache::Collection;

/// Ordered list of label names. Issues are grouped by the first label in this
/// list they carry; issues with none of them come last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortSpec {
  labels: Vec<String>,
}

impl SortSpec {
  pub fn new(labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
    let mut spec = Self::default();
    for label in labels {
      spec.add(label);
    }
    spec
  }

  pub fn labels(&self) -> &[String] {
    &self.labels
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.labels.iter().any(|l| l == name)
  }

  /// Append a label. Blank and already-present names are ignored.
  pub fn add(&mut self, name: impl Into<String>) -> bool {
    let name = name.into().trim().to_string();
    if name.is_empty() || self.contains(&name) {
      return false;
    }
    self.labels.push(name);
    true
  }

  pub fn remove(&mut self, name: &str) -> bool {
    let before = self.labels.len();
    self.labels.retain(|l| l != name);
    self.labels.len() != before
  }

  pub fn move_up(&mut self, index: usize) -> bool {
    if index == 0 || index >= self.labels.len() {
      return false;
    }
    self.labels.swap(index - 1, index);
    true
  }

  pub fn move_down(&mut self, index: usize) -> bool {
    if index + 1 >= self.labels.len() {
      return false;
    }
    self.labels.swap(index, index + 1);
    true
  }

  /// Value of the `sort` query parameter, if any.
  pub fn to_query(&self) -> Option<String> {
    (!self.is_empty()).then(|| self.labels.join(","))
  }

  /// Labels that can still be added.
  pub fn available<'a>(&self, labels: &'a Collection<Label>) -> Vec<&'a Label> {
    labels.iter().filter(|l| !self.contains(&l.name)).collect()
  }
}

impl fmt::Display for SortSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      write!(f, "default")
    } else {
      write!(f, "{}", self.labels.join(" > "))
    }
  }
}
