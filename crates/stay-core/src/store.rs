//! The `ScriptStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `stay-store-sqlite`).
//! The runtime and sync layers depend on this abstraction, never on a
//! concrete backend, and never hold references into its internal storage.
//!
//! Storage calls are synchronous: they never suspend, so a script's storage
//! access cannot interleave with another task's in the middle of a call.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::{
  script::{HistoryEntry, ScriptDraft, ScriptMeta, ScriptRecord},
  snapshot::{ImportMode, ImportSummary, Snapshot},
};

/// A batch of verbatim writes applied atomically by [`ScriptStore::apply`].
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
  /// Records written as-is, including `updated_at` and history.
  pub upserts: Vec<ScriptRecord>,
  pub deletes: Vec<Uuid>,
}

impl ChangeSet {
  pub fn is_empty(&self) -> bool { self.upserts.is_empty() && self.deletes.is_empty() }
}

/// Abstraction over a durable script registry.
///
/// Mutations (`save`, `restore`, `remove`, `apply`, `import_all`, `clear`)
/// are serialized by the implementation; each is atomic, so a `remove`
/// racing a `save` of the same id leaves either the whole saved record or
/// nothing.
pub trait ScriptStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Records ───────────────────────────────────────────────────────────

  /// Validate and persist `draft`, creating the record or updating the one
  /// with the same id. Appends a history entry when the source or version
  /// changes and stamps a fresh, strictly increasing `updated_at`.
  fn save(&self, draft: ScriptDraft) -> Result<ScriptRecord, Self::Error>;

  /// Validate and persist a fully-formed record verbatim, replacing any
  /// local record with the same id, history included.
  fn restore(&self, record: ScriptRecord) -> Result<ScriptRecord, Self::Error>;

  /// Delete a record and its namespace. Returns `false` if it did not exist.
  fn remove(&self, id: Uuid) -> Result<bool, Self::Error>;

  fn get(&self, id: Uuid) -> Result<Option<ScriptRecord>, Self::Error>;

  /// Metadata for every record, most recently updated first.
  fn list(&self) -> Result<Vec<ScriptMeta>, Self::Error>;

  /// Full records, in the same order as [`ScriptStore::list`].
  fn records(&self) -> Result<Vec<ScriptRecord>, Self::Error>;

  /// Full records whose rule set matches `url`, most recently updated first;
  /// ties broken by id.
  fn all_matching(&self, url: &str) -> Result<Vec<ScriptRecord>, Self::Error>;

  fn history(&self, id: Uuid) -> Result<Option<Vec<HistoryEntry>>, Self::Error> {
    Ok(self.get(id)?.map(|r| r.version_history))
  }

  // ── Bulk ──────────────────────────────────────────────────────────────

  fn export_all(&self) -> Result<Snapshot, Self::Error>;

  /// Load a snapshot. All-or-nothing: on error the store is untouched.
  fn import_all(
    &self,
    snapshot: &Snapshot,
    mode: ImportMode,
  ) -> Result<ImportSummary, Self::Error>;

  /// Apply a batch of verbatim upserts and deletes in one transaction.
  fn apply(&self, changes: ChangeSet) -> Result<(), Self::Error>;

  /// Delete every record and namespace.
  fn clear(&self) -> Result<(), Self::Error>;

  // ── Per-script namespaces ─────────────────────────────────────────────
  //
  // Every call on an unknown script id fails rather than creating an
  // orphan namespace.

  fn value_get(&self, id: Uuid, key: &str) -> Result<Option<Value>, Self::Error>;

  fn value_set(&self, id: Uuid, key: &str, value: Value) -> Result<(), Self::Error>;

  /// Returns `false` if the key was absent.
  fn value_delete(&self, id: Uuid, key: &str) -> Result<bool, Self::Error>;

  /// Keys in lexical order.
  fn value_keys(&self, id: Uuid) -> Result<Vec<String>, Self::Error>;

  /// The whole namespace of one script.
  fn values(&self, id: Uuid) -> Result<BTreeMap<String, Value>, Self::Error> {
    let mut out = BTreeMap::new();
    for key in self.value_keys(id)? {
      if let Some(value) = self.value_get(id, &key)? {
        out.insert(key, value);
      }
    }
    Ok(out)
  }
}
