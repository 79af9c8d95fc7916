//! `style`: stylesheet injection into the current page.

use std::sync::Arc;

use crate::host::{Document, HostError, StyleNodeId};

#[derive(Clone)]
pub struct StyleApi {
  document: Arc<dyn Document>,
}

impl StyleApi {
  pub(crate) fn new(document: Arc<dyn Document>) -> Self { Self { document } }

  /// Append a stylesheet. Each call adds a node; identical text is not
  /// deduplicated.
  pub fn inject(&self, css: &str) -> Result<StyleNodeId, HostError> {
    self.document.append_stylesheet(css)
  }
}
