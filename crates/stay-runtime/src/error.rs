//! Error types for `stay-runtime`.

use std::fmt;

use stay_core::script::Grant;
use thiserror::Error;
use uuid::Uuid;

use crate::{host::HostError, menu::CommandId};

/// A capability was used without being granted, or its host collaborator is
/// not configured. Raised before any side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("capability {capability} is not available to this script")]
pub struct CapabilityError {
  pub capability: Grant,
}

/// Why a script body did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptFailure {
  /// The engine reported an uncaught error from the script.
  Thrown(String),
  /// The engine itself panicked while running the script.
  Panicked(String),
}

impl fmt::Display for ScriptFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Thrown(msg) => write!(f, "uncaught error: {msg}"),
      Self::Panicked(msg) => write!(f, "engine panicked: {msg}"),
    }
  }
}

/// A contained, non-fatal failure of one script during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("script {script_id} failed: {cause}")]
pub struct ScriptExecutionError {
  pub script_id: Uuid,
  pub cause:     ScriptFailure,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Capability(#[from] CapabilityError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error(transparent)]
  Host(#[from] HostError),

  /// A menu handler panicked; the registry and other commands are intact.
  #[error(transparent)]
  Handler(#[from] ScriptExecutionError),

  #[error("unknown menu command {0}")]
  UnknownCommand(CommandId),

  #[error("the page this script ran on has been closed")]
  PageClosed,
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
