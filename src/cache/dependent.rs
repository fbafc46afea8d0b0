//! Lazily-loaded child collections owned by a parent record.
//!
//! A milestone row owns the list of its issues, an issue owns its comments.
//! The list is fetched the first time the fragment is expanded, and again
//! only when its dependency key (e.g. the sort specification) changes or the
//! owner asks for it. Results arrive over a channel and are applied on
//! [`DependentView::poll`] from the UI tick.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::collection::Collection;
use super::error::RemoteError;
use super::traits::Record;

/// Function that fetches the child collection for an owner and dependency key.
pub type Fetcher<O, K, T> =
  Arc<dyn Fn(&O, &K) -> BoxFuture<'static, Result<Vec<T>, RemoteError>> + Send + Sync>;

/// Wrap a closure returning a future into a [`Fetcher`].
pub fn fetcher<O, K, T, F, Fut>(f: F) -> Fetcher<O, K, T>
where
  F: Fn(&O, &K) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Vec<T>, RemoteError>> + Send + 'static,
{
  Arc::new(move |owner: &O, key: &K| f(owner, key).boxed())
}

/// What a fragment should render.
#[derive(Debug, PartialEq, Eq)]
pub enum FragmentState<'a, T> {
  Collapsed,
  /// Expanded, first load still in flight.
  Expanding,
  Populated(&'a [T]),
  Empty,
  Errored(&'a str),
}

struct Completion<O, K, T> {
  ticket: u64,
  owner: O,
  key: K,
  result: Result<Vec<T>, RemoteError>,
}

pub struct DependentView<O, K, T> {
  owner: O,
  key: K,
  loaded_key: Option<K>,
  expanded: bool,
  loaded_once: bool,
  items: Collection<T>,
  error: Option<String>,
  ticket: u64,
  in_flight: Option<u64>,
  fetcher: Fetcher<O, K, T>,
  tx: mpsc::UnboundedSender<Completion<O, K, T>>,
  rx: mpsc::UnboundedReceiver<Completion<O, K, T>>,
}

impl<O, K, T> DependentView<O, K, T>
where
  O: Clone + PartialEq + Debug + Send + 'static,
  K: Clone + PartialEq + Debug + Send + 'static,
  T: Record,
{
  pub fn new(owner: O, key: K, fetcher: Fetcher<O, K, T>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      owner,
      key,
      loaded_key: None,
      expanded: false,
      loaded_once: false,
      items: Collection::new(),
      error: None,
      ticket: 0,
      in_flight: None,
      fetcher,
      tx,
      rx,
    }
  }

  pub fn owner(&self) -> &O {
    &self.owner
  }

  pub fn dependency(&self) -> &K {
    &self.key
  }

  pub fn is_expanded(&self) -> bool {
    self.expanded
  }

  pub fn is_loading(&self) -> bool {
    self.in_flight.is_some()
  }

  pub fn loaded_once(&self) -> bool {
    self.loaded_once
  }

  pub fn items(&self) -> &Collection<T> {
    &self.items
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Number of loaded items, once a load has succeeded.
  pub fn loaded_count(&self) -> Option<usize> {
    (self.loaded_once && self.error.is_none()).then(|| self.items.len())
  }

  pub fn state(&self) -> FragmentState<'_, T> {
    if !self.expanded {
      return FragmentState::Collapsed;
    }
    if let Some(message) = &self.error {
      return FragmentState::Errored(message);
    }
    if !self.loaded_once {
      return FragmentState::Expanding;
    }
    if self.items.is_empty() {
      FragmentState::Empty
    } else {
      FragmentState::Populated(self.items.as_slice())
    }
  }

  pub fn toggle(&mut self) {
    if self.expanded {
      self.collapse();
    } else {
      self.expand();
    }
  }

  /// Expand, loading only if nothing was loaded yet for the current key.
  pub fn expand(&mut self) {
    self.expanded = true;
    let current = self.loaded_once && self.loaded_key.as_ref() == Some(&self.key);
    if !current && self.in_flight.is_none() {
      self.start_load();
    }
  }

  pub fn collapse(&mut self) {
    self.expanded = false;
  }

  /// Change the dependency key.
  ///
  /// While expanded this issues exactly one load for the new key and drops
  /// whatever is in flight for the old one. While collapsed the key is only
  /// recorded; the next expansion loads it.
  pub fn set_dependency(&mut self, key: K) {
    if key == self.key {
      return;
    }
    debug!(entity = T::entity_type(), owner = ?self.owner, ?key, "Dependency changed");
    self.key = key;
    self.in_flight = None;
    if self.expanded {
      self.start_load();
    }
  }

  /// Point this view at a different owner, resetting it to collapsed and empty.
  ///
  /// For callers that reuse one slot across owners. The milestone list keeps
  /// one view per milestone and never calls this. A completion that arrives
  /// for the previous owner is discarded.
  pub fn set_owner(&mut self, owner: O) {
    if owner == self.owner {
      return;
    }
    debug!(entity = T::entity_type(), from = ?self.owner, to = ?owner, "Owner changed");
    self.owner = owner;
    self.expanded = false;
    self.loaded_once = false;
    self.loaded_key = None;
    self.items = Collection::new();
    self.error = None;
    self.in_flight = None;
  }

  /// The owned collection changed elsewhere.
  ///
  /// Expanded views reload once; collapsed views reload on the next expansion.
  /// A load still in flight predates the change and is discarded.
  pub fn invalidate(&mut self) {
    if self.expanded {
      self.start_load();
    } else {
      self.loaded_key = None;
      self.in_flight = None;
    }
  }

  /// Explicit retry. Only acts while expanded.
  pub fn reload(&mut self) {
    if self.expanded {
      self.start_load();
    }
  }

  /// Apply any finished loads. Returns `true` if the state changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(completion) = self.rx.try_recv() {
      changed |= self.apply(completion);
    }
    changed
  }

  fn apply(&mut self, completion: Completion<O, K, T>) -> bool {
    if self.in_flight != Some(completion.ticket) || completion.owner != self.owner {
      debug!(
        entity = T::entity_type(),
        ticket = completion.ticket,
        owner = ?completion.owner,
        "Discarding stale dependent load"
      );
      return false;
    }

    self.in_flight = None;
    self.loaded_once = true;
    self.loaded_key = Some(completion.key);
    match completion.result {
      Ok(records) => {
        self.items = Collection::from_remote(records);
        self.error = None;
      }
      Err(e) => {
        debug!(entity = T::entity_type(), owner = ?self.owner, error = %e, "Dependent load failed");
        self.error = Some(e.to_string());
      }
    }
    true
  }

  fn start_load(&mut self) {
    self.ticket += 1;
    let ticket = self.ticket;
    self.in_flight = Some(ticket);
    self.error = None;

    debug!(
      entity = T::entity_type(),
      owner = ?self.owner,
      key = ?self.key,
      ticket,
      "Loading dependent collection"
    );

    let request = (self.fetcher)(&self.owner, &self.key);
    let owner = self.owner.clone();
    let key = self.key.clone();
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let result = request.await;
      // The view may be gone
      let _ = tx.send(Completion {
        ticket,
        owner,
        key,
        result,
      });
    });
  }
}

impl<O: Debug, K: Debug, T> Debug for DependentView<O, K, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DependentView")
      .field("owner", &self.owner)
      .field("key", &self.key)
      .field("expanded", &self.expanded)
      .field("loaded_once", &self.loaded_once)
      .field("in_flight", &self.in_flight)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::collection::tests::Item;
  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use tokio::sync::oneshot;

  type Gate = oneshot::Sender<Result<Vec<Item>, RemoteError>>;

  /// Fetcher that returns one item numbered after the key length, counting calls.
  fn counting_fetcher(calls: Arc<AtomicUsize>) -> Fetcher<u64, String, Item> {
    fetcher(move |owner: &u64, key: &String| {
      calls.fetch_add(1, Ordering::SeqCst);
      let item = Item::new(*owner * 100 + key.len() as u64, key);
      async move { Ok(vec![item]) }
    })
  }

  /// Fetcher whose calls wait on gates handed out in call order.
  fn gated_fetcher() -> (Fetcher<u64, String, Item>, Arc<Mutex<VecDeque<Gate>>>) {
    let gates: Arc<Mutex<VecDeque<Gate>>> = Arc::new(Mutex::new(VecDeque::new()));
    let senders = gates.clone();
    let fetch = fetcher(move |_: &u64, _: &String| {
      let (tx, rx) = oneshot::channel();
      senders.lock().unwrap().push_back(tx);
      async move {
        rx.await
          .unwrap_or_else(|_| Err(RemoteError::Transport("gate dropped".to_string())))
      }
    });
    (fetch, gates)
  }

  fn next_gate(gates: &Arc<Mutex<VecDeque<Gate>>>) -> Gate {
    gates.lock().unwrap().pop_front().unwrap()
  }

  async fn settle(view: &mut DependentView<u64, String, Item>) -> bool {
    for _ in 0..50 {
      tokio::task::yield_now().await;
      if view.poll() {
        return true;
      }
    }
    false
  }

  #[tokio::test]
  async fn test_expand_collapse_expand_loads_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut view = DependentView::new(1, "a".to_string(), counting_fetcher(calls.clone()));
    assert_eq!(view.state(), FragmentState::Collapsed);

    view.toggle();
    assert_eq!(view.state(), FragmentState::Expanding);
    assert!(settle(&mut view).await);
    assert_eq!(view.state(), FragmentState::Populated(&[Item::new(101, "a")]));

    view.toggle();
    assert_eq!(view.state(), FragmentState::Collapsed);
    view.toggle();
    assert!(!view.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(view.loaded_count(), Some(1));
  }

  #[tokio::test]
  async fn test_dependency_change_reloads_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut view = DependentView::new(1, "a".to_string(), counting_fetcher(calls.clone()));
    view.expand();
    settle(&mut view).await;

    view.set_dependency("bb".to_string());
    view.set_dependency("bb".to_string());
    assert!(settle(&mut view).await);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(view.items().keys(), vec![102]);
  }

  #[tokio::test]
  async fn test_dependency_change_discards_old_result() {
    let (fetch, gates) = gated_fetcher();
    let mut view = DependentView::new(1, "a".to_string(), fetch);
    view.expand();
    tokio::task::yield_now().await;
    let old = next_gate(&gates);

    view.set_dependency("b".to_string());
    let new = next_gate(&gates);

    let _ = new.send(Ok(vec![Item::new(2, "new")]));
    assert!(settle(&mut view).await);
    let _ = old.send(Ok(vec![Item::new(1, "old")]));
    assert!(!settle(&mut view).await);

    assert_eq!(view.items().keys(), vec![2]);
  }

  #[tokio::test]
  async fn test_owner_change_ignores_stale_completion() {
    let (fetch, gates) = gated_fetcher();
    let mut view = DependentView::new(1, "a".to_string(), fetch);
    view.expand();
    let gate = next_gate(&gates);

    view.set_owner(2);
    let _ = gate.send(Ok(vec![Item::new(1, "stale")]));
    assert!(!settle(&mut view).await);

    assert_eq!(view.state(), FragmentState::Collapsed);
    assert!(view.items().is_empty());
    assert!(!view.loaded_once());
  }

  #[tokio::test]
  async fn test_key_change_while_collapsed_loads_on_expand() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut view = DependentView::new(1, "a".to_string(), counting_fetcher(calls.clone()));
    view.expand();
    settle(&mut view).await;
    view.collapse();

    view.set_dependency("ccc".to_string());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    view.expand();
    view.expand();
    assert!(settle(&mut view).await);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(view.items().keys(), vec![103]);
  }

  #[tokio::test]
  async fn test_invalidate_reloads_only_while_expanded() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut view = DependentView::new(1, "a".to_string(), counting_fetcher(calls.clone()));

    view.invalidate();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    view.expand();
    settle(&mut view).await;
    view.invalidate();
    settle(&mut view).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    view.collapse();
    view.invalidate();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    view.expand();
    settle(&mut view).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_invalidate_while_collapsed_drops_pending_load() {
    let (fetch, gates) = gated_fetcher();
    let mut view = DependentView::new(1, "a".to_string(), fetch);
    view.expand();
    let before = next_gate(&gates);
    view.collapse();
    view.invalidate();

    let _ = before.send(Ok(vec![Item::new(1, "before")]));
    assert!(!settle(&mut view).await);
    assert!(!view.loaded_once());

    view.expand();
    let after = next_gate(&gates);
    let _ = after.send(Ok(vec![Item::new(2, "after")]));
    assert!(settle(&mut view).await);
    assert_eq!(view.items().keys(), vec![2]);
  }

  #[tokio::test]
  async fn test_error_is_kept_until_next_load() {
    let (fetch, gates) = gated_fetcher();
    let mut view = DependentView::new(1, "a".to_string(), fetch);
    view.expand();
    let _ = next_gate(&gates).send(Err(RemoteError::Transport("reset".to_string())));
    assert!(settle(&mut view).await);

    assert_eq!(view.state(), FragmentState::Errored("Request failed: reset"));
    assert!(view.loaded_once());
    assert_eq!(view.loaded_count(), None);

    view.collapse();
    view.expand();
    assert_eq!(view.state(), FragmentState::Errored("Request failed: reset"));

    view.reload();
    assert!(view.error().is_none());
    let _ = next_gate(&gates).send(Ok(vec![]));
    assert!(settle(&mut view).await);
    assert_eq!(view.state(), FragmentState::Empty);
  }
}
