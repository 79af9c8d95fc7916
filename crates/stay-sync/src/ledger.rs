//! The sync ledger: each script's `updatedAt` as of the last pass in which
//! both sides agreed on it. Change and deletion detection compare against
//! it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncLedger {
  entries: BTreeMap<Uuid, DateTime<Utc>>,
}

impl SyncLedger {
  pub fn new() -> Self { Self::default() }

  pub fn get(&self, id: Uuid) -> Option<DateTime<Utc>> { self.entries.get(&id).copied() }

  pub fn record(&mut self, id: Uuid, updated_at: DateTime<Utc>) {
    self.entries.insert(id, updated_at);
  }

  pub fn forget(&mut self, id: Uuid) { self.entries.remove(&id); }

  pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ { self.entries.keys().copied() }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string_pretty(self) }

  pub fn from_json(input: &str) -> serde_json::Result<Self> { serde_json::from_str(input) }
}
