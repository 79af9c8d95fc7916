//! Sync Engine: reconciles the local script store with a remote script
//! collection.
//!
//! Conflicts are resolved per record by last-writer-wins on `updatedAt`,
//! using a [`SyncLedger`] of the last agreed timestamps to tell which side
//! changed and to propagate deletions. At most one pass runs at a time;
//! concurrent requests join it.

pub mod engine;
pub mod error;
pub mod http;
pub mod ledger;
pub mod plan;
pub mod remote;


use std::{fmt, str::FromStr};

pub use engine::SyncEngine;
pub use error::{Error, Result, SyncPhase};
pub use http::{HttpRemote, HttpRemoteError};
pub use ledger::SyncLedger;
pub use remote::RemoteScripts;

/// Default cap on one encoded record sent to the remote.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncMode {
  /// Remote → local.
  #[default]
  Pull,
  /// Local → remote.
  Push,
  /// Both directions.
  Both,
}

impl SyncMode {
  pub fn pulls(self) -> bool { matches!(self, Self::Pull | Self::Both) }

  pub fn pushes(self) -> bool { matches!(self, Self::Push | Self::Both) }
}

impl fmt::Display for SyncMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Pull => "pull",
      Self::Push => "push",
      Self::Both => "both",
    })
  }
}

impl FromStr for SyncMode {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s {
      "pull" => Ok(Self::Pull),
      "push" => Ok(Self::Push),
      "both" | "sync" => Ok(Self::Both),
      other => Err(format!("unknown sync mode {other:?} (expected pull, push or both)")),
    }
  }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
  /// Whether the recurring pull runs.
  pub enabled:           bool,
  /// Largest encoded record the remote accepts.
  pub max_payload_bytes: usize,
}

impl Default for SyncOptions {
  fn default() -> Self { Self { enabled: false, max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES } }
}

/// Writes performed on one side during a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideCounts {
  pub created: usize,
  pub updated: usize,
  pub deleted: usize,
}

impl SideCounts {
  pub fn total(&self) -> usize { self.created + self.updated + self.deleted }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub mode:      SyncMode,
  pub local:     SideCounts,
  pub remote:    SideCounts,
  /// Records already identical on both sides.
  pub unchanged: usize,
}
