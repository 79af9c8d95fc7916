//! `tab`: open a URL in a new tab.

use std::sync::Arc;

use crate::host::{HostError, OpenTabOptions, TabOpener};

#[derive(Clone)]
pub struct TabApi {
  opener: Arc<dyn TabOpener>,
}

impl TabApi {
  pub(crate) fn new(opener: Arc<dyn TabOpener>) -> Self { Self { opener } }

  pub fn open(&self, url: &str, options: OpenTabOptions) -> Result<(), HostError> {
    self.opener.open(url, options)
  }
}
