//! `menu`: commands the host surfaces on the script's behalf.

use std::sync::{Arc, Weak};

use uuid::Uuid;

use crate::{
  Error, Result,
  bridge::{Bridge, BridgeInner},
  menu::{CommandId, RegistryRef},
};

pub struct MenuApi {
  script_id: Uuid,
  registry:  RegistryRef,
  /// The bridge this module belongs to, handed to handlers when invoked.
  owner:     Weak<BridgeInner>,
}

impl MenuApi {
  pub(crate) fn new(script_id: Uuid, registry: RegistryRef, owner: Weak<BridgeInner>) -> Self {
    Self { script_id, registry, owner }
  }

  pub fn register<F>(&self, label: impl Into<String>, handler: F) -> Result<CommandId>
  where
    F: Fn(&Bridge) + Send + Sync + 'static,
  {
    let bridge = self.owner.upgrade().map(Bridge::from_inner).ok_or(Error::PageClosed)?;
    self.registry.register(bridge, label.into(), Arc::new(handler))
  }

  /// Remove one of this script's commands. Another script's command id is
  /// treated as unknown and returns `false`.
  pub fn unregister(&self, id: CommandId) -> Result<bool> {
    self.registry.unregister(self.script_id, id)
  }
}
