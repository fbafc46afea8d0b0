//! Request coalescing: at most one outstanding load per resource.
//!
//! Many independently-mounted views may ask for the same resource within one
//! render pass. The first cold request starts the load; every later request
//! attaches to the same [`SharedLoad`] and observes the same outcome.

use std::future::{Future, IntoFuture};
use std::sync::{Arc, Weak};

use futures::future::{self, BoxFuture, Either, FutureExt, Ready};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::collection::Collection;
use super::error::{LoadError, RemoteError};
use super::resource::{
  CacheSnapshot, CacheState, Inner, LoadOutcome, LoadStatus, OpId, PendingLoad, ResourceCache,
  SharedLoad,
};
use super::traits::Record;

/// Function that performs the network load for one resource.
pub type Loader<T> =
  Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>, RemoteError>> + Send + Sync>;

/// Wrap a closure returning a future into a [`Loader`].
pub fn loader<T, F, Fut>(f: F) -> Loader<T>
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Vec<T>, RemoteError>> + Send + 'static,
{
  Arc::new(move || f().boxed())
}

/// Handle returned by [`ResourceCache::ensure_loaded`].
///
/// `Ready` is a synchronous cache hit; `Pending` resolves when the shared
/// load settles. Either way, awaiting it yields a [`LoadOutcome`].
pub enum LoadHandle<T> {
  Ready(Collection<T>),
  Pending(SharedLoad<T>),
}

impl<T: Record> LoadHandle<T> {
  pub fn is_ready(&self) -> bool {
    matches!(self, Self::Ready(_))
  }

  /// The data, if this was a cache hit.
  pub fn ready(&self) -> Option<&Collection<T>> {
    match self {
      Self::Ready(data) => Some(data),
      Self::Pending(_) => None,
    }
  }
}

impl<T: Record> IntoFuture for LoadHandle<T> {
  type Output = LoadOutcome<T>;
  type IntoFuture = Either<Ready<LoadOutcome<T>>, SharedLoad<T>>;

  fn into_future(self) -> Self::IntoFuture {
    match self {
      Self::Ready(data) => Either::Left(future::ready(Ok(data))),
      Self::Pending(shared) => Either::Right(shared),
    }
  }
}

impl<T: Record> ResourceCache<T> {
  /// Return the data if warm, attach to the pending load if one exists, or
  /// start a new load.
  ///
  /// Never starts a second concurrent load. A non-empty cache is returned as
  /// is, even if stale; use [`ResourceCache::reload`] to refresh.
  pub fn ensure_loaded(&self, loader: &Loader<T>) -> LoadHandle<T> {
    let shared = {
      let mut state = self.lock();

      if !state.data.is_empty() {
        return LoadHandle::Ready(state.data.clone());
      }

      if let LoadStatus::Pending(pending) = &state.status {
        debug!(
          entity = T::entity_type(),
          op = pending.id.0,
          "Attaching to pending load"
        );
        return LoadHandle::Pending(pending.shared.clone());
      }

      self.start_load(&mut state, loader)
    };

    self.notify();
    LoadHandle::Pending(shared)
  }

  /// Start a fresh load that supersedes any pending one.
  ///
  /// `data` stays visible until the new load settles. The superseded load
  /// still settles for its own subscribers but no longer touches the cache.
  pub fn reload(&self, loader: &Loader<T>) -> LoadHandle<T> {
    let shared = {
      let mut state = self.lock();
      self.start_load(&mut state, loader)
    };

    self.notify();
    LoadHandle::Pending(shared)
  }

  fn start_load(&self, state: &mut CacheState<T>, loader: &Loader<T>) -> SharedLoad<T> {
    let id = state.next_op_id();
    let epoch = state.epoch;
    let weak = Arc::downgrade(&self.inner);
    let request = loader();

    debug!(entity = T::entity_type(), op = id.0, "Starting load");

    let shared = async move {
      let result = request.await;
      settle(&weak, id, epoch, result)
    }
    .boxed()
    .shared();

    state.status = LoadStatus::Pending(PendingLoad {
      id,
      shared: shared.clone(),
    });

    // Drive the load even if every subscriber drops its handle
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
      let driver = shared.clone();
      runtime.spawn(async move {
        let _ = driver.await;
      });
    }

    shared
  }
}

/// Apply a finished load to the cache it was started for.
///
/// The outcome is applied only if that cache's pending load is still `id`;
/// anything else is a stale completion and leaves `data` alone.
fn settle<T: Record>(
  weak: &Weak<Inner<T>>,
  id: OpId,
  epoch: u64,
  result: Result<Vec<T>, RemoteError>,
) -> LoadOutcome<T> {
  let Some(inner) = weak.upgrade() else {
    return result.map(Collection::from_remote).map_err(LoadError::from);
  };
  let cache = ResourceCache { inner };

  let applied = {
    let mut state = cache.lock();

    if state.epoch != epoch {
      debug!(
        entity = T::entity_type(),
        op = id.0,
        "Load finished after cache was cleared"
      );
      return Err(LoadError::Cancelled);
    }

    let current = state.pending_id() == Some(id);

    match result {
      Ok(records) => {
        let data = Collection::from_remote(records);
        if current {
          state.data = data.clone();
          state.status = LoadStatus::Idle;
          debug!(
            entity = T::entity_type(),
            op = id.0,
            count = data.len(),
            "Load settled"
          );
        } else {
          debug!(
            entity = T::entity_type(),
            op = id.0,
            "Ignoring stale load result"
          );
        }
        (current, Ok(data))
      }
      Err(e) => {
        if current {
          state.status = LoadStatus::Failed(e.to_string());
        }
        warn!(entity = T::entity_type(), op = id.0, error = %e, "Load failed");
        (current, Err(LoadError::Remote(e)))
      }
    }
  };

  let (current, outcome) = applied;
  if current {
    cache.notify();
  }
  outcome
}

/// A resource cache paired with the loader that fills it.
///
/// This is the handle views hold: `run()` for coalesced reads, `reload()` for
/// an explicit refresh.
pub struct Coalescer<T> {
  cache: ResourceCache<T>,
  loader: Loader<T>,
}

impl<T> Clone for Coalescer<T> {
  fn clone(&self) -> Self {
    Self {
      cache: self.cache.clone(),
      loader: Arc::clone(&self.loader),
    }
  }
}

impl<T: Record> Coalescer<T> {
  pub fn new(cache: ResourceCache<T>, loader: Loader<T>) -> Self {
    Self { cache, loader }
  }

  pub fn cache(&self) -> &ResourceCache<T> {
    &self.cache
  }

  pub fn get(&self) -> CacheSnapshot<T> {
    self.cache.get()
  }

  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.cache.subscribe()
  }

  /// Coalesced read; see [`ResourceCache::ensure_loaded`].
  pub fn run(&self) -> LoadHandle<T> {
    self.cache.ensure_loaded(&self.loader)
  }

  /// Forced full reload; see [`ResourceCache::reload`].
  pub fn reload(&self) -> LoadHandle<T> {
    self.cache.reload(&self.loader)
  }

  /// Clear the cache, then load it again from scratch.
  pub fn refresh(&self) -> LoadHandle<T> {
    self.cache.clear();
    self.run()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::collection::tests::Item;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;
  use tokio::sync::oneshot;

  fn counting_loader(
    calls: Arc<AtomicUsize>,
    result: Result<Vec<Item>, RemoteError>,
    delay: Duration,
  ) -> Loader<Item> {
    loader(move || {
      calls.fetch_add(1, Ordering::SeqCst);
      let result = result.clone();
      async move {
        tokio::time::sleep(delay).await;
        result
      }
    })
  }

  /// Loader whose Nth invocation waits for the Nth gate to be released.
  fn gated_loader(gates: Vec<oneshot::Receiver<Result<Vec<Item>, RemoteError>>>) -> Loader<Item> {
    let gates = Arc::new(Mutex::new(gates.into_iter().map(Some).collect::<Vec<_>>()));
    let next = Arc::new(AtomicUsize::new(0));
    loader(move || {
      let idx = next.fetch_add(1, Ordering::SeqCst);
      let gate = gates.lock().ok().and_then(|mut g| g.get_mut(idx).and_then(Option::take));
      async move {
        match gate {
          Some(rx) => rx
            .await
            .unwrap_or_else(|_| Err(RemoteError::Transport("gate dropped".to_string()))),
          None => Err(RemoteError::Transport("no gate".to_string())),
        }
      }
    })
  }

  #[tokio::test]
  async fn test_concurrent_ensure_loaded_makes_one_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = counting_loader(
      calls.clone(),
      Ok(vec![Item::new(1, "v1")]),
      Duration::from_millis(20),
    );
    let cache = ResourceCache::new();

    let first = cache.ensure_loaded(&loader);
    let second = cache.ensure_loaded(&loader);
    assert!(cache.get().loading);

    let (a, b) = tokio::join!(first.into_future(), second.into_future());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.map(|c| c.keys()), Ok(vec![1]));
    assert_eq!(b.map(|c| c.as_slice().to_vec()), Ok(vec![Item::new(1, "v1")]));

    let snapshot = cache.get();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.data.keys(), vec![1]);
  }

  #[tokio::test]
  async fn test_many_subscribers_share_one_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let error = RemoteError::Status {
      status: 500,
      message: "Internal Server Error".to_string(),
    };
    let loader = counting_loader(calls.clone(), Err(error.clone()), Duration::from_millis(5));
    let cache: ResourceCache<Item> = ResourceCache::new();

    let handles: Vec<_> = (0..5).map(|_| cache.ensure_loaded(&loader)).collect();
    let outcomes =
      futures::future::join_all(handles.into_iter().map(IntoFuture::into_future)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for outcome in outcomes {
      assert_eq!(outcome.map(|c| c.len()), Err(LoadError::Remote(error.clone())));
    }

    let snapshot = cache.get();
    assert!(!snapshot.loading);
    assert_eq!(
      snapshot.error.as_deref(),
      Some("Failed to fetch: Internal Server Error")
    );
  }

  #[tokio::test]
  async fn test_warm_cache_short_circuits() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = counting_loader(calls.clone(), Ok(vec![Item::new(1, "v1")]), Duration::ZERO);
    let cache = ResourceCache::new();

    let _ = cache.ensure_loaded(&loader).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    for _ in 0..3 {
      let handle = cache.ensure_loaded(&loader);
      assert!(handle.is_ready());
      assert_eq!(handle.ready().map(|c| c.keys()), Some(vec![1]));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_failure_keeps_stale_data() {
    let cache = ResourceCache::new();
    cache.set_data(Collection::from_remote(vec![Item::new(1, "old")]));

    let calls = Arc::new(AtomicUsize::new(0));
    let loader = counting_loader(
      calls,
      Err(RemoteError::Transport("connection reset".to_string())),
      Duration::ZERO,
    );

    let outcome = cache.reload(&loader).await;
    assert!(outcome.is_err());

    let snapshot = cache.get();
    assert_eq!(snapshot.data.keys(), vec![1]);
    assert_eq!(
      snapshot.error.as_deref(),
      Some("Request failed: connection reset")
    );
  }

  #[tokio::test]
  async fn test_success_clears_previous_error() {
    let cache = ResourceCache::new();
    cache.set_error("earlier failure");

    let calls = Arc::new(AtomicUsize::new(0));
    let loader = counting_loader(calls, Ok(vec![Item::new(2, "b")]), Duration::ZERO);
    let _ = cache.ensure_loaded(&loader).await;

    let snapshot = cache.get();
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.data.keys(), vec![2]);
  }

  #[tokio::test]
  async fn test_out_of_order_completion_is_ignored() {
    let (slow_tx, slow_rx) = oneshot::channel();
    let (fast_tx, fast_rx) = oneshot::channel();
    let loader = gated_loader(vec![slow_rx, fast_rx]);
    let cache = ResourceCache::new();

    let slow = cache.ensure_loaded(&loader);
    let fast = cache.reload(&loader);

    let _ = fast_tx.send(Ok(vec![Item::new(2, "new")]));
    let fast_outcome = fast.await;
    assert_eq!(fast_outcome.map(|c| c.keys()), Ok(vec![2]));

    let _ = slow_tx.send(Ok(vec![Item::new(1, "old")]));
    let slow_outcome = slow.await;

    // The slow load's own subscribers still get its result...
    assert_eq!(slow_outcome.map(|c| c.keys()), Ok(vec![1]));
    // ...but it never overwrites newer data
    assert_eq!(cache.data().keys(), vec![2]);
    assert!(!cache.is_loading());
  }

  #[tokio::test]
  async fn test_clear_cancels_pending_subscribers() {
    let (tx, rx) = oneshot::channel();
    let loader = gated_loader(vec![rx]);
    let cache = ResourceCache::new();

    let handle = cache.ensure_loaded(&loader);
    assert!(cache.is_loading());

    cache.clear();
    assert!(!cache.is_loading());

    let _ = tx.send(Ok(vec![Item::new(1, "late")]));
    assert_eq!(handle.await.map(|c| c.len()), Err(LoadError::Cancelled));
    assert!(cache.data().is_empty());
    assert!(cache.get().error.is_none());
  }

  #[tokio::test]
  async fn test_load_settles_without_subscribers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = counting_loader(calls.clone(), Ok(vec![Item::new(7, "x")]), Duration::ZERO);
    let coalescer = Coalescer::new(ResourceCache::new(), loader);
    let mut rx = coalescer.subscribe();

    drop(coalescer.run());

    // Wait for the driver task to apply the result
    while coalescer.get().loading {
      if rx.changed().await.is_err() {
        break;
      }
    }

    assert_eq!(coalescer.get().data.keys(), vec![7]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_refresh_reloads_warm_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = counting_loader(calls.clone(), Ok(vec![Item::new(1, "a")]), Duration::ZERO);
    let coalescer = Coalescer::new(ResourceCache::new(), loader);

    let _ = coalescer.run().await;
    assert!(coalescer.run().is_ready());

    let _ = coalescer.refresh().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(coalescer.get().data.keys(), vec![1]);
  }
}
