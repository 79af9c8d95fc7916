//! Error types for `stay-sync`.
//!
//! Errors are `Clone` because a coalesced sync hands the same result to
//! every caller that joined it.

use std::{fmt, sync::Arc};

use thiserror::Error;
use uuid::Uuid;

type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// Where in a sync pass a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
  /// Reading the local store.
  Load,
  /// Listing the remote collection.
  List,
  /// Checking payload sizes before any remote write.
  Preflight,
  /// Writing to the remote collection.
  Push,
  /// Applying pulled changes to the local store.
  Apply,
}

impl fmt::Display for SyncPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Load => "load",
      Self::List => "list",
      Self::Preflight => "preflight",
      Self::Push => "push",
      Self::Apply => "apply",
    })
  }
}

#[derive(Debug, Clone, Error)]
pub enum Error {
  /// A local or remote call failed. `applied` lists the records already
  /// written to the remote before the failure; the local store is
  /// unchanged.
  #[error("sync failed during {phase}: {cause}")]
  Sync {
    phase:   SyncPhase,
    cause:   Cause,
    applied: Vec<Uuid>,
  },

  /// Rejected before transmission; nothing was sent.
  #[error("script {id} encodes to {size} bytes, over the remote limit of {limit}")]
  PayloadTooLarge { id: Uuid, size: usize, limit: usize },

  /// Cancelled on request. No remote call was issued after the request.
  #[error("sync cancelled after {} remote writes", .applied.len())]
  Cancelled { applied: Vec<Uuid> },
}

impl Error {
  pub(crate) fn sync(
    phase: SyncPhase,
    cause: impl std::error::Error + Send + Sync + 'static,
    applied: Vec<Uuid>,
  ) -> Self {
    Self::Sync { phase, cause: Arc::new(cause), applied }
  }

  pub fn phase(&self) -> SyncPhase {
    match self {
      Self::Sync { phase, .. } => *phase,
      Self::PayloadTooLarge { .. } => SyncPhase::Preflight,
      Self::Cancelled { .. } => SyncPhase::Push,
    }
  }

  /// Records written to the remote before the pass stopped.
  pub fn applied(&self) -> &[Uuid] {
    match self {
      Self::Sync { applied, .. } | Self::Cancelled { applied } => applied,
      Self::PayloadTooLarge { .. } => &[],
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
