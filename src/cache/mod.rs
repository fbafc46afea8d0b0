//! Client-side state layer for remote collections.
//!
//! This module is independent of any particular service:
//! - [`ResourceCache`] holds one shared collection with its load status
//! - [`Coalescer`] guarantees at most one outstanding load per resource
//! - [`create_record`] / [`delete_record`] apply mutations with rollback
//! - [`DependentView`] lazily loads per-owner child collections

mod coalesce;
mod collection;
mod dependent;
mod error;
mod mutation;
mod resource;
mod traits;

pub use coalesce::{loader, Coalescer, LoadHandle, Loader};
pub use collection::Collection;
pub use dependent::{fetcher, DependentView, Fetcher, FragmentState};
pub use error::{LoadError, MutationError, RemoteError, ValidationError};
pub use mutation::{create_record, delete_record, Draft, PendingDelete};
pub use resource::{CacheSnapshot, LoadOutcome, ResourceCache};
pub use traits::Record;
