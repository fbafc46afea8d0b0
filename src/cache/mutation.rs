//! Create and delete against a shared cache and the remote service.
//!
//! Create is pessimistic: the record only enters the cache once the service
//! returns its canonical form (identity, normalized color, ...). Delete is
//! optimistic: the record leaves the cache before the network call and is put
//! back if the call fails. Both finish with a background full reload.

use std::future::Future;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info, warn};

use super::coalesce::Coalescer;
use super::error::{MutationError, RemoteError, ValidationError};
use super::traits::Record;

/// A create request whose required field is checked before any network call.
pub trait Draft {
  /// Display name and current value of the required field (e.g. "Title").
  fn required_field(&self) -> (&'static str, &str);

  fn validate(&self) -> Result<(), ValidationError> {
    let (field, value) = self.required_field();
    if value.trim().is_empty() {
      return Err(ValidationError::MissingField(field));
    }
    Ok(())
  }
}

/// Remote half of a delete, returned after the optimistic removal is applied.
pub type PendingDelete = BoxFuture<'static, Result<(), MutationError>>;

/// Create a record through the service and add it to the cache.
///
/// Nothing touches the cache or the network if the draft fails validation,
/// and nothing touches the cache if the service rejects the draft.
pub async fn create_record<T, D, F, Fut>(
  resource: &Coalescer<T>,
  draft: D,
  remote_create: F,
) -> Result<T, MutationError>
where
  T: Record,
  D: Draft,
  F: FnOnce(D) -> Fut,
  Fut: Future<Output = Result<T, RemoteError>>,
{
  draft.validate()?;

  let record = remote_create(draft).await.map_err(|e| {
    warn!(entity = T::entity_type(), error = %e, "Create failed");
    e
  })?;

  info!(entity = T::entity_type(), key = %record.key(), "Created");
  resource.cache().insert_sorted(record.clone());

  // Reconcile with server state in the background
  drop(resource.reload());

  Ok(record)
}

/// Delete a record, removing it from the cache immediately.
///
/// The removal happens before this function returns; the returned future
/// performs the remote call. On failure the removed record is reinserted at
/// its sorted position in whatever `data` is current at that point.
pub fn delete_record<T, F, Fut>(
  resource: &Coalescer<T>,
  key: T::Key,
  remote_delete: F,
) -> PendingDelete
where
  T: Record,
  F: FnOnce(T::Key) -> Fut,
  Fut: Future<Output = Result<(), RemoteError>> + Send + 'static,
{
  let removed = resource.cache().remove(&key);
  if removed.is_none() {
    debug!(entity = T::entity_type(), %key, "Deleting record not present in cache");
  }

  let request = remote_delete(key.clone());
  let resource = resource.clone();

  async move {
    match request.await {
      Ok(()) => {
        info!(entity = T::entity_type(), %key, "Deleted");
        drop(resource.reload());
        Ok(())
      }
      Err(e) => {
        warn!(entity = T::entity_type(), %key, error = %e, "Delete failed, rolling back");
        if let Some(record) = removed {
          resource.cache().insert_sorted(record);
        }
        Err(MutationError::Remote(e))
      }
    }
  }
  .boxed()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::coalesce::{loader, Loader};
  use crate::cache::collection::tests::Item;
  use crate::cache::collection::Collection;
  use crate::cache::resource::ResourceCache;
  use crate::cache::traits::Record;
  use std::cmp::Ordering as CmpOrdering;
  use std::collections::HashSet;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;
  use tokio::sync::oneshot;

  struct ItemDraft {
    title: String,
  }

  impl Draft for ItemDraft {
    fn required_field(&self) -> (&'static str, &str) {
      ("Title", &self.title)
    }
  }

  #[derive(Debug, Clone, PartialEq, Eq, Hash)]
  struct Tag {
    name: String,
  }

  impl Record for Tag {
    type Key = String;

    fn key(&self) -> String {
      self.name.clone()
    }

    fn local_order(&self, other: &Self) -> CmpOrdering {
      self.name.cmp(&other.name)
    }

    fn entity_type() -> &'static str {
      "tag"
    }
  }

  fn tag(name: &str) -> Tag {
    Tag {
      name: name.to_string(),
    }
  }

  fn static_loader<T: Record>(calls: Arc<AtomicUsize>, records: Vec<T>) -> Loader<T> {
    loader(move || {
      calls.fetch_add(1, Ordering::SeqCst);
      let records = records.clone();
      async move { Ok(records) }
    })
  }

  fn warm_coalescer<T: Record>(
    initial: Vec<T>,
    reload_with: Vec<T>,
  ) -> (Coalescer<T>, Arc<AtomicUsize>) {
    let cache = ResourceCache::new();
    cache.set_data(Collection::from_remote(initial));
    let calls = Arc::new(AtomicUsize::new(0));
    let coalescer = Coalescer::new(cache, static_loader(calls.clone(), reload_with));
    (coalescer, calls)
  }

  async fn wait_idle<T: Record>(coalescer: &Coalescer<T>) {
    let mut rx = coalescer.subscribe();
    while coalescer.get().loading {
      if rx.changed().await.is_err() {
        break;
      }
    }
  }

  #[tokio::test]
  async fn test_create_rejects_blank_required_field() {
    let (coalescer, loads) = warm_coalescer(vec![Item::new(1, "a")], vec![]);
    let remote_calls = Arc::new(AtomicUsize::new(0));

    for title in ["", "   ", "\t\n"] {
      let calls = remote_calls.clone();
      let result = create_record(
        &coalescer,
        ItemDraft {
          title: title.to_string(),
        },
        |draft| async move {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok(Item::new(2, &draft.title))
        },
      )
      .await;

      assert_eq!(
        result,
        Err(MutationError::Validation(ValidationError::MissingField(
          "Title"
        )))
      );
    }

    assert_eq!(remote_calls.load(Ordering::SeqCst), 0);
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(coalescer.get().data.keys(), vec![1]);
  }

  #[tokio::test]
  async fn test_create_inserts_sorted_and_reloads() {
    let (coalescer, loads) = warm_coalescer(
      vec![Item::new(1, "a"), Item::new(5, "e")],
      vec![Item::new(1, "a"), Item::new(3, "c"), Item::new(5, "e")],
    );

    let created = create_record(
      &coalescer,
      ItemDraft {
        title: "c".to_string(),
      },
      |draft| async move { Ok(Item::new(3, &draft.title)) },
    )
    .await;

    assert_eq!(created, Ok(Item::new(3, "c")));
    // Visible right away, before the background reload settles
    assert_eq!(coalescer.get().data.keys(), vec![1, 3, 5]);

    wait_idle(&coalescer).await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(coalescer.get().data.keys(), vec![1, 3, 5]);
  }

  #[tokio::test]
  async fn test_create_failure_leaves_cache_untouched() {
    let (coalescer, loads) = warm_coalescer(vec![Item::new(1, "a")], vec![]);
    let rx = coalescer.subscribe();

    let result = create_record(
      &coalescer,
      ItemDraft {
        title: "dup".to_string(),
      },
      |_| async {
        Err::<Item, _>(RemoteError::Status {
          status: 422,
          message: "Unprocessable Entity".to_string(),
        })
      },
    )
    .await;

    assert_eq!(
      result.map_err(|e| e.to_string()),
      Err("Failed to fetch: Unprocessable Entity".to_string())
    );
    assert_eq!(coalescer.get().data.keys(), vec![1]);
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert!(!rx.has_changed().unwrap_or(true));
  }

  #[tokio::test]
  async fn test_delete_is_applied_before_remote_resolves() {
    let (coalescer, loads) = warm_coalescer(
      vec![Item::new(1, "a"), Item::new(2, "b")],
      vec![Item::new(2, "b")],
    );
    let (tx, rx) = oneshot::channel::<Result<(), RemoteError>>();

    let pending = delete_record(&coalescer, 1, move |_| async move {
      rx.await
        .unwrap_or_else(|_| Err(RemoteError::Transport("dropped".to_string())))
    });

    // Removed immediately, network call still outstanding
    assert_eq!(coalescer.get().data.keys(), vec![2]);

    let _ = tx.send(Ok(()));
    assert_eq!(pending.await, Ok(()));

    wait_idle(&coalescer).await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(coalescer.get().data.keys(), vec![2]);
  }

  #[tokio::test]
  async fn test_delete_failure_rolls_back() {
    let (coalescer, loads) = warm_coalescer(vec![tag("bug")], vec![]);

    let result = delete_record(&coalescer, "bug".to_string(), |_| async {
      Err(RemoteError::Status {
        status: 400,
        message: "Bad Request".to_string(),
      })
    })
    .await;

    assert_eq!(
      result.map_err(|e| e.to_string()),
      Err("Failed to fetch: Bad Request".to_string())
    );
    assert_eq!(coalescer.get().data.as_slice(), &[tag("bug")]);
    assert_eq!(loads.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_delete_rollback_restores_membership() {
    let before = vec![tag("wontfix"), tag("bug"), tag("enhancement")];
    let (coalescer, _) = warm_coalescer(before.clone(), vec![]);

    let pending = delete_record(&coalescer, "bug".to_string(), |_| async {
      Err(RemoteError::Transport("timeout".to_string()))
    });
    assert_eq!(coalescer.get().data.len(), 2);
    assert!(pending.await.is_err());

    let after: HashSet<Tag> = coalescer.get().data.iter().cloned().collect();
    let expected: HashSet<Tag> = before.into_iter().collect();
    assert_eq!(after, expected);
    assert_eq!(coalescer.get().data.len(), 3);
  }

  #[tokio::test]
  async fn test_rollback_applies_to_current_data() {
    let (coalescer, _) = warm_coalescer(vec![tag("a"), tag("b")], vec![]);
    let (tx, rx) = oneshot::channel::<Result<(), RemoteError>>();

    let pending = delete_record(&coalescer, "a".to_string(), move |_| async move {
      rx.await
        .unwrap_or_else(|_| Err(RemoteError::Transport("dropped".to_string())))
    });

    // A concurrent reload replaced data in the meantime
    coalescer
      .cache()
      .set_data(Collection::from_remote(vec![tag("c"), tag("b")]));

    let _ = tx.send(Err(RemoteError::Transport("reset".to_string())));
    assert!(pending.await.is_err());

    assert_eq!(
      coalescer.get().data.keys(),
      vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
  }
}
