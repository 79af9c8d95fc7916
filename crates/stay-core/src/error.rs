//! Error types for `stay-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{pattern::PatternError, snapshot::ImportError};

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid match rule: {0}")]
  Pattern(#[from] PatternError),

  #[error("invalid version {0:?}: expected MAJOR.MINOR.PATCH")]
  InvalidVersion(String),

  #[error("invalid {field}: {reason}")]
  Validation {
    field:  &'static str,
    reason: String,
  },

  #[error("import rejected: {0}")]
  Import(#[from] ImportError),

  #[error("script not found: {0}")]
  ScriptNotFound(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
