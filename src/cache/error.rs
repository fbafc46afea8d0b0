//! Error taxonomy for the cache and mutation layer.

use thiserror::Error;

/// Failure reported by the remote collection service.
///
/// Every variant renders as a single message string; `Unauthenticated` is the
/// one callers must be able to tell apart, since it ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
  #[error("Unauthorized - please log in again")]
  Unauthenticated,

  #[error("Failed to fetch: {message}")]
  Status { status: u16, message: String },

  #[error("Request failed: {0}")]
  Transport(String),

  #[error("Failed to parse response: {0}")]
  Decode(String),
}

impl RemoteError {
  /// Whether this failure means the session is gone.
  pub fn is_auth(&self) -> bool {
    matches!(self, Self::Unauthenticated)
  }
}

/// Local, pre-network validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("{0} is required")]
  MissingField(&'static str),

  #[error("{0} is invalid: {1}")]
  Invalid(&'static str, String),
}

/// Outcome delivered to every subscriber of a failed shared load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
  #[error(transparent)]
  Remote(#[from] RemoteError),

  /// The cache was cleared while the load was in flight.
  #[error("Load was cancelled")]
  Cancelled,
}

/// Failure of a create or delete through the mutation coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Remote(#[from] RemoteError),
}

impl MutationError {
  pub fn is_auth(&self) -> bool {
    matches!(self, Self::Remote(e) if e.is_auth())
  }
}
