//! `storage`: the script's own key/value namespace.

use std::sync::Arc;

use serde_json::Value;
use stay_core::store::ScriptStore;
use uuid::Uuid;

use crate::{Error, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The slice of [`ScriptStore`] the bridge needs, with the error type erased
/// so a bridge does not carry the store's type parameter.
pub(crate) trait ValueStore: Send + Sync {
  fn get(&self, id: Uuid, key: &str) -> Result<Option<Value>, BoxError>;
  fn set(&self, id: Uuid, key: &str, value: Value) -> Result<(), BoxError>;
  fn delete(&self, id: Uuid, key: &str) -> Result<bool, BoxError>;
  fn keys(&self, id: Uuid) -> Result<Vec<String>, BoxError>;
}

impl<S: ScriptStore> ValueStore for S {
  fn get(&self, id: Uuid, key: &str) -> Result<Option<Value>, BoxError> {
    Ok(self.value_get(id, key)?)
  }

  fn set(&self, id: Uuid, key: &str, value: Value) -> Result<(), BoxError> {
    Ok(self.value_set(id, key, value)?)
  }

  fn delete(&self, id: Uuid, key: &str) -> Result<bool, BoxError> {
    Ok(self.value_delete(id, key)?)
  }

  fn keys(&self, id: Uuid) -> Result<Vec<String>, BoxError> { Ok(self.value_keys(id)?) }
}

/// Reads and writes under one script id; there is no way to name another.
#[derive(Clone)]
pub struct StorageApi {
  store:     Arc<dyn ValueStore>,
  script_id: Uuid,
}

impl StorageApi {
  pub(crate) fn new(store: Arc<dyn ValueStore>, script_id: Uuid) -> Self { Self { store, script_id } }

  /// The stored value, or `default` when the key is absent.
  pub fn get(&self, key: &str, default: Value) -> Result<Value> {
    Ok(self.store.get(self.script_id, key).map_err(Error::Store)?.unwrap_or(default))
  }

  pub fn set(&self, key: &str, value: Value) -> Result<()> {
    self.store.set(self.script_id, key, value).map_err(Error::Store)
  }

  /// Returns `false` if the key was absent.
  pub fn delete(&self, key: &str) -> Result<bool> {
    self.store.delete(self.script_id, key).map_err(Error::Store)
  }

  pub fn list_keys(&self) -> Result<Vec<String>> {
    self.store.keys(self.script_id).map_err(Error::Store)
  }
}
