//! Shared caches and loaders wired to the project service.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::api::types::{Comment, Issue, Label, LabelDraft, Milestone, MilestoneDraft, Reaction};
use crate::api::ApiClient;
use crate::cache::{
  create_record, delete_record, fetcher, loader, Coalescer, Fetcher, MutationError, PendingDelete,
  ResourceCache,
};
use crate::sort::SortSpec;

/// What a reactions list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionTarget {
  Issue(u64),
  Comment(u64),
}

/// The process-wide resource caches.
///
/// Built once at startup and handed to every view by cloning; all clones share
/// the same underlying caches, the active sort specification, and the
/// issue-change channel.
#[derive(Clone)]
pub struct Resources {
  client: ApiClient,
  milestones: Coalescer<Milestone>,
  labels: Coalescer<Label>,
  sort: Arc<watch::Sender<SortSpec>>,
  issue_changes: broadcast::Sender<u64>,
}

impl Resources {
  pub fn new(client: ApiClient, sort: SortSpec) -> Self {
    let milestones = {
      let client = client.clone();
      Coalescer::new(
        ResourceCache::new(),
        loader(move || {
          let client = client.clone();
          async move { client.list_milestones().await }
        }),
      )
    };

    let labels = {
      let client = client.clone();
      Coalescer::new(
        ResourceCache::new(),
        loader(move || {
          let client = client.clone();
          async move { client.list_labels().await }
        }),
      )
    };

    let (sort, _) = watch::channel(sort);
    let (issue_changes, _) = broadcast::channel(64);

    Self {
      client,
      milestones,
      labels,
      sort: Arc::new(sort),
      issue_changes,
    }
  }

  pub fn client(&self) -> &ApiClient {
    &self.client
  }

  pub fn milestones(&self) -> &Coalescer<Milestone> {
    &self.milestones
  }

  pub fn labels(&self) -> &Coalescer<Label> {
    &self.labels
  }

  pub fn sort(&self) -> SortSpec {
    self.sort.borrow().clone()
  }

  pub fn subscribe_sort(&self) -> watch::Receiver<SortSpec> {
    self.sort.subscribe()
  }

  /// Edit the sort specification. Subscribers are only woken if it changed.
  pub fn update_sort(&self, edit: impl FnOnce(&mut SortSpec) -> bool) -> bool {
    self.sort.send_if_modified(edit)
  }

  /// Announce that the issue list of `milestone` changed on the server.
  pub fn issues_changed(&self, milestone: u64) {
    debug!(milestone, "Issue list changed");
    // No receivers just means no milestone list is mounted
    let _ = self.issue_changes.send(milestone);
  }

  pub fn subscribe_issue_changes(&self) -> broadcast::Receiver<u64> {
    self.issue_changes.subscribe()
  }

  /// Drop all cached state, e.g. after the session ended.
  pub fn clear_all(&self) {
    self.milestones.cache().clear();
    self.labels.cache().clear();
  }

  pub async fn create_milestone(&self, draft: MilestoneDraft) -> Result<Milestone, MutationError> {
    let client = self.client.clone();
    create_record(&self.milestones, draft, move |draft| async move {
      client.create_milestone(&draft.to_request()).await
    })
    .await
  }

  pub fn delete_milestone(&self, number: u64) -> PendingDelete {
    let client = self.client.clone();
    delete_record(&self.milestones, number, move |number| async move {
      client.delete_milestone(number).await
    })
  }

  pub async fn create_label(&self, draft: LabelDraft) -> Result<Label, MutationError> {
    let client = self.client.clone();
    create_record(&self.labels, draft, move |draft| async move {
      client.create_label(&draft.to_request()).await
    })
    .await
  }

  pub fn delete_label(&self, name: String) -> PendingDelete {
    let client = self.client.clone();
    delete_record(&self.labels, name, move |name| async move {
      client.delete_label(&name).await
    })
  }

  /// Issues of a milestone, keyed by the active sort specification.
  pub fn issues_fetcher(&self) -> Fetcher<u64, SortSpec, Issue> {
    let client = self.client.clone();
    fetcher(move |milestone: &u64, sort: &SortSpec| {
      let client = client.clone();
      let milestone = *milestone;
      let sort = sort.labels().to_vec();
      async move { client.list_issues(milestone, &sort).await }
    })
  }

  pub fn comments_fetcher(&self) -> Fetcher<u64, (), Comment> {
    let client = self.client.clone();
    fetcher(move |issue: &u64, _: &()| {
      let client = client.clone();
      let issue = *issue;
      async move { client.list_comments(issue).await }
    })
  }

  pub fn reactions_fetcher(&self) -> Fetcher<ReactionTarget, (), Reaction> {
    let client = self.client.clone();
    fetcher(move |target: &ReactionTarget, _: &()| {
      let client = client.clone();
      let target = *target;
      async move {
        match target {
          ReactionTarget::Issue(number) => client.list_issue_reactions(number).await,
          ReactionTarget::Comment(id) => client.list_comment_reactions(id).await,
        }
      }
    })
  }
}
