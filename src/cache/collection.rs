//! Ordered, key-unique collection snapshots.

use std::collections::HashSet;
use std::sync::Arc;

use super::traits::Record;

/// An ordered sequence of records of one kind, unique by key.
///
/// Collections are cheap to clone (`Arc`-backed) and never mutated after
/// construction; every change produces a new collection.
#[derive(Debug)]
pub struct Collection<T> {
  items: Arc<Vec<T>>,
}

impl<T> Clone for Collection<T> {
  fn clone(&self) -> Self {
    Self {
      items: Arc::clone(&self.items),
    }
  }
}

impl<T> Default for Collection<T> {
  fn default() -> Self {
    Self {
      items: Arc::new(Vec::new()),
    }
  }
}

impl<T: Record> Collection<T> {
  /// Create an empty collection.
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a collection from a remote response, keeping the server's order.
  ///
  /// If the server repeats a key, the first occurrence wins.
  pub fn from_remote(records: Vec<T>) -> Self {
    let mut seen = HashSet::with_capacity(records.len());
    let items: Vec<T> = records
      .into_iter()
      .filter(|record| seen.insert(record.key()))
      .collect();

    Self {
      items: Arc::new(items),
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn as_slice(&self) -> &[T] {
    &self.items
  }

  pub fn iter(&self) -> std::slice::Iter<'_, T> {
    self.items.iter()
  }

  /// Find a record by key.
  pub fn get(&self, key: &T::Key) -> Option<&T> {
    self.items.iter().find(|record| &record.key() == key)
  }

  pub fn contains_key(&self, key: &T::Key) -> bool {
    self.get(key).is_some()
  }

  pub fn keys(&self) -> Vec<T::Key> {
    self.items.iter().map(Record::key).collect()
  }

  /// Return a new collection with `record` placed at its sorted position.
  ///
  /// A record with the same key is replaced. The whole collection is re-sorted
  /// by the record's local order, as any local mutation does.
  pub fn with_inserted(&self, record: T) -> Self {
    let key = record.key();
    let mut items: Vec<T> = self
      .items
      .iter()
      .filter(|existing| existing.key() != key)
      .cloned()
      .collect();
    items.push(record);
    items.sort_by(|a, b| a.local_order(b));

    Self {
      items: Arc::new(items),
    }
  }

  /// Return a new collection without the record matching `key`, along with
  /// the removed record (if there was one).
  pub fn without(&self, key: &T::Key) -> (Self, Option<T>) {
    let mut removed = None;
    let mut items = Vec::with_capacity(self.items.len());
    for record in self.items.iter() {
      if removed.is_none() && &record.key() == key {
        removed = Some(record.clone());
      } else {
        items.push(record.clone());
      }
    }

    (
      Self {
        items: Arc::new(items),
      },
      removed,
    )
  }
}

impl<T: Record> From<Vec<T>> for Collection<T> {
  fn from(records: Vec<T>) -> Self {
    Self::from_remote(records)
  }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
  type Item = &'a T;
  type IntoIter = std::slice::Iter<'a, T>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::cmp::Ordering;

  /// Minimal record used across the cache tests.
  #[derive(Debug, Clone, PartialEq, Eq)]
  pub struct Item {
    pub number: u64,
    pub title: String,
  }

  impl Item {
    pub fn new(number: u64, title: &str) -> Self {
      Self {
        number,
        title: title.to_string(),
      }
    }
  }

  impl Record for Item {
    type Key = u64;

    fn key(&self) -> u64 {
      self.number
    }

    fn local_order(&self, other: &Self) -> Ordering {
      self.number.cmp(&other.number)
    }

    fn entity_type() -> &'static str {
      "item"
    }
  }

  #[test]
  fn test_from_remote_keeps_order_and_first_duplicate() {
    let collection = Collection::from_remote(vec![
      Item::new(3, "c"),
      Item::new(1, "a"),
      Item::new(3, "dup"),
    ]);

    assert_eq!(collection.keys(), vec![3, 1]);
    assert_eq!(collection.get(&3).map(|i| i.title.as_str()), Some("c"));
  }

  #[test]
  fn test_with_inserted_sorts_and_replaces() {
    let collection = Collection::from_remote(vec![Item::new(3, "c"), Item::new(1, "a")]);

    let inserted = collection.with_inserted(Item::new(2, "b"));
    assert_eq!(inserted.keys(), vec![1, 2, 3]);

    let replaced = inserted.with_inserted(Item::new(2, "b2"));
    assert_eq!(replaced.len(), 3);
    assert_eq!(replaced.get(&2).map(|i| i.title.as_str()), Some("b2"));

    // The original snapshot is untouched
    assert_eq!(collection.keys(), vec![3, 1]);
  }

  #[test]
  fn test_without_returns_removed_record() {
    let collection = Collection::from_remote(vec![Item::new(1, "a"), Item::new(2, "b")]);

    let (remaining, removed) = collection.without(&1);
    assert_eq!(remaining.keys(), vec![2]);
    assert_eq!(removed, Some(Item::new(1, "a")));

    let (unchanged, missing) = remaining.without(&9);
    assert_eq!(unchanged.keys(), vec![2]);
    assert!(missing.is_none());
  }
}
