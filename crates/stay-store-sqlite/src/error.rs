//! Error type for `stay-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{0}")]
  Core(#[from] stay_core::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("corrupt column {column}: {reason}")]
  Decode {
    column: &'static str,
    reason: String,
  },

  #[error("store connection lock poisoned")]
  LockPoisoned,
}

impl Error {
  /// The core error this wraps, if any (validation, pattern, import, not
  /// found).
  pub fn as_core(&self) -> Option<&stay_core::Error> {
    match self {
      Self::Core(e) => Some(e),
      _ => None,
    }
  }
}

impl From<stay_core::snapshot::ImportError> for Error {
  fn from(e: stay_core::snapshot::ImportError) -> Self { Self::Core(e.into()) }
}

impl From<stay_core::pattern::PatternError> for Error {
  fn from(e: stay_core::pattern::PatternError) -> Self { Self::Core(e.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
