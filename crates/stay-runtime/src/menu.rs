//! Per-page registry of menu commands registered by scripts.
//!
//! The host owns one [`MenuRegistry`] per page, lists its commands however
//! it surfaces menus, and calls [`MenuRegistry::invoke`] when the user picks
//! one. Dropping the registry drops every handler and the bridges they hold.

use std::{
  collections::BTreeMap,
  fmt,
  panic::{self, AssertUnwindSafe},
  sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  bridge::Bridge,
  dispatch::panic_message,
  error::{ScriptExecutionError, ScriptFailure},
};

/// Identifies one registered command within its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "cmd#{}", self.0) }
}

/// Runs with the bridge of the script that registered it.
pub type MenuHandler = Arc<dyn Fn(&Bridge) + Send + Sync>;

/// What the host sees of a registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuCommand {
  pub id:        CommandId,
  pub script_id: Uuid,
  pub label:     String,
}

struct Entry {
  script_id: Uuid,
  label:     String,
  handler:   MenuHandler,
  bridge:    Bridge,
}

#[derive(Default)]
struct State {
  next_id:  u64,
  commands: BTreeMap<CommandId, Entry>,
}

#[derive(Clone, Default)]
pub struct MenuRegistry {
  state: Arc<Mutex<State>>,
}

impl fmt::Debug for MenuRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MenuRegistry")
      .field("commands", &self.lock().commands.len())
      .finish()
  }
}

impl MenuRegistry {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

  /// Registered commands in registration order.
  pub fn commands(&self) -> Vec<MenuCommand> {
    self
      .lock()
      .commands
      .iter()
      .map(|(id, e)| MenuCommand { id: *id, script_id: e.script_id, label: e.label.clone() })
      .collect()
  }

  /// Run a command's handler. The registry lock is released first, so a
  /// handler may register or unregister commands itself. A panicking
  /// handler is reported as [`Error::Handler`].
  pub fn invoke(&self, id: CommandId) -> Result<()> {
    let (handler, bridge) = {
      let state = self.lock();
      let entry = state.commands.get(&id).ok_or(Error::UnknownCommand(id))?;
      (Arc::clone(&entry.handler), entry.bridge.clone())
    };
    debug!(command = %id, script_id = %bridge.script_id(), "invoking menu command");
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&bridge))) {
      let err = ScriptExecutionError {
        script_id: bridge.script_id(),
        cause:     ScriptFailure::Panicked(panic_message(payload.as_ref())),
      };
      warn!(command = %id, error = %err, "menu handler failed");
      return Err(Error::Handler(err));
    }
    Ok(())
  }

  /// Drop every command, e.g. when the page navigates away.
  pub fn clear(&self) { self.lock().commands.clear(); }
}

/// A registry seen from a capability module; does not keep the page alive.
#[derive(Clone)]
pub(crate) struct RegistryRef(Weak<Mutex<State>>);

impl RegistryRef {
  pub(crate) fn new(registry: &MenuRegistry) -> Self { Self(Arc::downgrade(&registry.state)) }

  fn upgrade(&self) -> Result<MenuRegistry> {
    self
      .0
      .upgrade()
      .map(|state| MenuRegistry { state })
      .ok_or(Error::PageClosed)
  }

  pub(crate) fn register(
    &self,
    bridge: Bridge,
    label: String,
    handler: MenuHandler,
  ) -> Result<CommandId> {
    let registry = self.upgrade()?;
    let mut state = registry.lock();
    state.next_id += 1;
    let id = CommandId(state.next_id);
    let script_id = bridge.script_id();
    state.commands.insert(id, Entry { script_id, label, handler, bridge });
    Ok(id)
  }

  /// Remove `id` if it belongs to `script_id`.
  pub(crate) fn unregister(&self, script_id: Uuid, id: CommandId) -> Result<bool> {
    let registry = self.upgrade()?;
    let mut state = registry.lock();
    let owned = state.commands.get(&id).is_some_and(|e| e.script_id == script_id);
    if owned {
      state.commands.remove(&id);
    }
    Ok(owned)
  }
}
