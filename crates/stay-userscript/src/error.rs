//! Error types for the userscript header codec.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("no // ==UserScript== header block found")]
  MissingHeader,

  #[error("header block is not closed by // ==/UserScript==")]
  UnterminatedHeader,

  #[error("malformed header line {line}: {text:?}")]
  MalformedLine { line: usize, text: String },

  #[error("header is missing required @{0}")]
  MissingDirective(&'static str),

  #[error("@{0} has no value")]
  EmptyDirective(String),

  #[error("invalid @version {0:?}: expected MAJOR.MINOR.PATCH")]
  InvalidVersion(String),

  #[error("unknown @grant {0:?}")]
  UnknownGrant(String),

  #[error("unknown @run-at {0:?}")]
  UnknownRunAt(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
