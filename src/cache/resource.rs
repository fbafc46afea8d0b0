//! Shared holder of one collection, its load status, and any in-flight load.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tracing::debug;

use super::collection::Collection;
use super::error::LoadError;
use super::traits::Record;

/// Result every subscriber of a shared load receives.
pub type LoadOutcome<T> = Result<Collection<T>, LoadError>;

/// A single in-flight load, observable by any number of subscribers.
pub type SharedLoad<T> = Shared<BoxFuture<'static, LoadOutcome<T>>>;

/// Identity of one load operation; settlements compare it before applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub(super) u64);

pub(super) struct PendingLoad<T> {
  pub(super) id: OpId,
  pub(super) shared: SharedLoad<T>,
}

/// Load status. `Pending` is the only state in which the cache is loading.
pub(super) enum LoadStatus<T> {
  Idle,
  Pending(PendingLoad<T>),
  Failed(String),
}

pub(super) struct CacheState<T> {
  pub(super) data: Collection<T>,
  pub(super) status: LoadStatus<T>,
  /// Bumped by `clear()`; loads started in an older epoch report cancellation.
  pub(super) epoch: u64,
  next_op: u64,
}

impl<T: Record> CacheState<T> {
  fn new() -> Self {
    Self {
      data: Collection::new(),
      status: LoadStatus::Idle,
      epoch: 0,
      next_op: 0,
    }
  }

  pub(super) fn next_op_id(&mut self) -> OpId {
    self.next_op += 1;
    OpId(self.next_op)
  }

  pub(super) fn pending_id(&self) -> Option<OpId> {
    match &self.status {
      LoadStatus::Pending(pending) => Some(pending.id),
      _ => None,
    }
  }
}

/// Point-in-time view of a cache.
#[derive(Debug, Clone)]
pub struct CacheSnapshot<T> {
  pub data: Collection<T>,
  pub loading: bool,
  pub error: Option<String>,
}

pub(super) struct Inner<T> {
  pub(super) state: Mutex<CacheState<T>>,
  revision: watch::Sender<u64>,
}

/// Process-wide cache for one resource kind.
///
/// Constructed once at startup and shared by cloning the handle. Only the
/// coalescer (load settlement) and the mutation coordinator (optimistic apply
/// and rollback) change `data`; views read snapshots and subscribe to the
/// revision counter to know when to re-render.
pub struct ResourceCache<T> {
  pub(super) inner: Arc<Inner<T>>,
}

impl<T> Clone for ResourceCache<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: Record> Default for ResourceCache<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Record> ResourceCache<T> {
  pub fn new() -> Self {
    let (revision, _) = watch::channel(0);
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(CacheState::new()),
        revision,
      }),
    }
  }

  // State transitions are total, so a poisoned guard still holds consistent state.
  pub(super) fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  pub(super) fn notify(&self) {
    self.inner.revision.send_modify(|rev| *rev += 1);
  }

  /// Current snapshot.
  pub fn get(&self) -> CacheSnapshot<T> {
    let state = self.lock();
    let (loading, error) = match &state.status {
      LoadStatus::Idle => (false, None),
      LoadStatus::Pending(_) => (true, None),
      LoadStatus::Failed(message) => (false, Some(message.clone())),
    };

    CacheSnapshot {
      data: state.data.clone(),
      loading,
      error,
    }
  }

  /// Current data only.
  pub fn data(&self) -> Collection<T> {
    self.lock().data.clone()
  }

  pub fn is_loading(&self) -> bool {
    self.lock().pending_id().is_some()
  }

  /// Replace `data` wholesale. The load status is left as it is.
  pub fn set_data(&self, data: Collection<T>) {
    self.lock().data = data;
    self.notify();
  }

  /// Record a failure message, replacing any earlier one.
  ///
  /// Ignored while a load is pending: that load's settlement decides the
  /// error state.
  pub fn set_error(&self, message: impl Into<String>) {
    {
      let mut state = self.lock();
      if state.pending_id().is_some() {
        debug!(
          entity = T::entity_type(),
          "Ignoring set_error while a load is pending"
        );
        return;
      }
      state.status = LoadStatus::Failed(message.into());
    }
    self.notify();
  }

  /// Reset to the empty initial state.
  ///
  /// Subscribers of a pending load receive `LoadError::Cancelled`, and that
  /// load's completion no longer touches this cache.
  pub fn clear(&self) {
    {
      let mut state = self.lock();
      if state.pending_id().is_some() {
        debug!(
          entity = T::entity_type(),
          "Clearing cache with a pending load"
        );
      }
      state.data = Collection::new();
      state.status = LoadStatus::Idle;
      state.epoch += 1;
    }
    self.notify();
  }

  /// Subscribe to state changes. The value is a revision counter that bumps
  /// on every change.
  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.inner.revision.subscribe()
  }

  /// Remove the record with `key` from `data`, returning it.
  pub(super) fn remove(&self, key: &T::Key) -> Option<T> {
    let removed = {
      let mut state = self.lock();
      let (remaining, removed) = state.data.without(key);
      if removed.is_some() {
        state.data = remaining;
      }
      removed
    };
    if removed.is_some() {
      self.notify();
    }
    removed
  }

  /// Insert (or replace) `record` at its sorted position in the current `data`.
  pub(super) fn insert_sorted(&self, record: T) {
    {
      let mut state = self.lock();
      state.data = state.data.with_inserted(record);
    }
    self.notify();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::collection::tests::Item;

  #[test]
  fn test_initial_state_is_empty() {
    let cache: ResourceCache<Item> = ResourceCache::new();
    let snapshot = cache.get();

    assert!(snapshot.data.is_empty());
    assert!(!snapshot.loading);
    assert!(snapshot.error.is_none());
  }

  #[test]
  fn test_set_error_replaces_previous() {
    let cache: ResourceCache<Item> = ResourceCache::new();
    cache.set_error("first");
    cache.set_error("second");

    assert_eq!(cache.get().error.as_deref(), Some("second"));
  }

  #[test]
  fn test_set_data_keeps_error_and_notifies() {
    let cache: ResourceCache<Item> = ResourceCache::new();
    let mut rx = cache.subscribe();
    cache.set_error("boom");
    cache.set_data(Collection::from_remote(vec![Item::new(1, "a")]));

    let snapshot = cache.get();
    assert_eq!(snapshot.data.keys(), vec![1]);
    assert_eq!(snapshot.error.as_deref(), Some("boom"));
    assert!(rx.has_changed().unwrap_or(false));
    assert_eq!(*rx.borrow_and_update(), 2);
  }

  #[test]
  fn test_clear_resets() {
    let cache: ResourceCache<Item> = ResourceCache::new();
    cache.set_data(Collection::from_remote(vec![Item::new(1, "a")]));
    cache.set_error("boom");
    cache.clear();

    let snapshot = cache.get();
    assert!(snapshot.data.is_empty());
    assert!(snapshot.error.is_none());
  }

  #[test]
  fn test_remove_and_insert_sorted() {
    let cache: ResourceCache<Item> = ResourceCache::new();
    cache.set_data(Collection::from_remote(vec![
      Item::new(1, "a"),
      Item::new(2, "b"),
      Item::new(3, "c"),
    ]));

    let removed = cache.remove(&2);
    assert_eq!(removed, Some(Item::new(2, "b")));
    assert_eq!(cache.data().keys(), vec![1, 3]);
    assert!(cache.remove(&2).is_none());

    cache.insert_sorted(Item::new(2, "b"));
    assert_eq!(cache.data().keys(), vec![1, 2, 3]);
  }
}
