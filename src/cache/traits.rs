//! Core traits for records held by the shared caches.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait for records that can live in a shared collection.
///
/// Records are immutable value snapshots: a collection replaces a record
/// wholesale, it never edits one in place.
pub trait Record: Clone + Debug + Send + Sync + 'static {
  /// Identity key (e.g., milestone number, label name)
  type Key: Clone + Debug + Display + Eq + Hash + Send + Sync + 'static;

  /// Identity of this record within its collection.
  fn key(&self) -> Self::Key;

  /// Ordering applied after a local insert (optimistic add or rollback).
  fn local_order(&self, other: &Self) -> Ordering;

  /// Entity type name for logging (e.g., "milestone", "label")
  fn entity_type() -> &'static str;
}
