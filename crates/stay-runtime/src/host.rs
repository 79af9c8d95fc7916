//! Host collaborators the runtime calls out to.
//!
//! The host owns page loading and content injection; the runtime only sees
//! a document handle per page and an optional way to open tabs.

use std::fmt;

use thiserror::Error;

/// A failure reported by a host collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host error: {0}")]
pub struct HostError(pub String);

/// Identifies a stylesheet node appended to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StyleNodeId(pub u64);

impl fmt::Display for StyleNodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "style#{}", self.0) }
}

/// The page a script runs against.
pub trait Document: Send + Sync {
  fn url(&self) -> &str;

  /// Append a new stylesheet node. Every call adds a node, even for text
  /// that is already present.
  fn append_stylesheet(&self, css: &str) -> Result<StyleNodeId, HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenTabOptions {
  /// Focus the new tab.
  pub active: bool,
}

impl Default for OpenTabOptions {
  fn default() -> Self { Self { active: true } }
}

pub trait TabOpener: Send + Sync {
  fn open(&self, url: &str, options: OpenTabOptions) -> Result<(), HostError>;
}
