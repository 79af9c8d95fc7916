//! Export/import snapshot document.
//!
//! ```json
//! {
//!   "format": "stay-snapshot",
//!   "formatVersion": 1,
//!   "exportedAt": "2024-06-01T00:00:00Z",
//!   "scripts": [ { "id": "...", "name": "...", ..., "values": { "k": 1 } } ]
//! }
//! ```
//!
//! Every script entry carries the full record plus its namespace values.
//! Parsing checks the envelope before the body, so a snapshot from a newer
//! format is rejected as unsupported rather than as malformed.

use std::{
  collections::{BTreeMap, HashSet},
  fmt,
  str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{script::ScriptRecord, validate::validate_record};

pub const SNAPSHOT_FORMAT: &str = "stay-snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
  #[error("malformed snapshot: {0}")]
  Malformed(String),

  #[error("not a stay snapshot (format {0:?})")]
  UnknownFormat(String),

  #[error("unsupported snapshot format version {0}")]
  UnsupportedVersion(u64),

  #[error("script {0} appears more than once")]
  DuplicateId(Uuid),

  #[error("script {id} is invalid: {reason}")]
  InvalidScript { id: Uuid, reason: String },
}

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
  /// Discard the whole store before loading the snapshot.
  Replace,
  /// Keep local records unless the incoming copy has a newer `updatedAt`.
  Merge,
}

impl FromStr for ImportMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "replace" => Ok(Self::Replace),
      "merge" => Ok(Self::Merge),
      other => Err(format!("unknown import mode {other:?} (expected replace or merge)")),
    }
  }
}

impl fmt::Display for ImportMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Replace => "replace",
      Self::Merge => "merge",
    })
  }
}

/// A record together with its namespace contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedScript {
  #[serde(flatten)]
  pub record: ScriptRecord,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub values: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
  pub format:         String,
  pub format_version: u32,
  pub exported_at:    DateTime<Utc>,
  pub scripts:        Vec<ExportedScript>,
}

/// Counts reported by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
  /// Records written from the snapshot.
  pub imported: usize,
  /// Incoming records dropped because the local copy was as new or newer.
  pub kept_local: usize,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

impl Snapshot {
  pub fn new(scripts: Vec<ExportedScript>) -> Self {
    Self {
      format: SNAPSHOT_FORMAT.to_owned(),
      format_version: SNAPSHOT_VERSION,
      exported_at: Utc::now(),
      scripts,
    }
  }

  pub fn to_json(&self) -> Result<String, serde_json::Error> { serde_json::to_string_pretty(self) }

  /// Parse and fully validate a snapshot document.
  pub fn from_json(input: &str) -> Result<Self, ImportError> {
    let raw: serde_json::Value =
      serde_json::from_str(input).map_err(|e| ImportError::Malformed(e.to_string()))?;

    let format = raw
      .get("format")
      .and_then(|v| v.as_str())
      .ok_or_else(|| ImportError::Malformed("missing \"format\"".into()))?;
    if format != SNAPSHOT_FORMAT {
      return Err(ImportError::UnknownFormat(format.to_owned()));
    }
    let version = raw
      .get("formatVersion")
      .and_then(|v| v.as_u64())
      .ok_or_else(|| ImportError::Malformed("missing \"formatVersion\"".into()))?;
    if version != u64::from(SNAPSHOT_VERSION) {
      return Err(ImportError::UnsupportedVersion(version));
    }

    let snapshot: Snapshot =
      serde_json::from_value(raw).map_err(|e| ImportError::Malformed(e.to_string()))?;
    snapshot.validate()?;
    Ok(snapshot)
  }

  /// Check the envelope, id uniqueness and every record.
  pub fn validate(&self) -> Result<(), ImportError> {
    if self.format != SNAPSHOT_FORMAT {
      return Err(ImportError::UnknownFormat(self.format.clone()));
    }
    if self.format_version != SNAPSHOT_VERSION {
      return Err(ImportError::UnsupportedVersion(u64::from(self.format_version)));
    }

    let mut seen = HashSet::new();
    for script in &self.scripts {
      let id = script.record.id;
      if !seen.insert(id) {
        return Err(ImportError::DuplicateId(id));
      }
      validate_record(&script.record)
        .map_err(|e| ImportError::InvalidScript { id, reason: e.to_string() })?;
    }
    Ok(())
  }
}
