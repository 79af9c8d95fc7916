//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with as many fractional digits as needed,
//! so they survive a round trip exactly. Rule sets and grants are compact
//! JSON. UUIDs are hyphenated lowercase strings.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use stay_core::script::{Grant, HistoryEntry, MatchRule, RunAt, ScriptMeta, ScriptRecord};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::AutoSi, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode { column: "timestamp", reason: e.to_string() })
}

// ─── RunAt ───────────────────────────────────────────────────────────────────

pub fn encode_run_at(r: RunAt) -> &'static str { r.as_str() }

pub fn decode_run_at(s: &str) -> Result<RunAt> {
  RunAt::parse(s).ok_or_else(|| Error::Decode {
    column: "run_at",
    reason: format!("unknown value {s:?}"),
  })
}

// ─── Rules & grants ──────────────────────────────────────────────────────────

pub fn encode_rules(rules: &[MatchRule]) -> Result<String> { Ok(serde_json::to_string(rules)?) }

pub fn decode_rules(s: &str) -> Result<Vec<MatchRule>> { Ok(serde_json::from_str(s)?) }

pub fn encode_grants(grants: &BTreeSet<Grant>) -> Result<String> {
  Ok(serde_json::to_string(grants)?)
}

pub fn decode_grants(s: &str) -> Result<BTreeSet<Grant>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected for a metadata row, in order.
pub const META_COLUMNS: &str =
  "script_id, name, description, author, version, match_rules, grants, run_at, updated_at";

/// Raw strings read from the metadata columns of a `scripts` row.
pub struct RawMeta {
  pub script_id:   String,
  pub name:        String,
  pub description: String,
  pub author:      String,
  pub version:     String,
  pub match_rules: String,
  pub grants:      String,
  pub run_at:      String,
  pub updated_at:  String,
}

impl RawMeta {
  /// Read [`META_COLUMNS`] starting at column 0.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      script_id:   row.get(0)?,
      name:        row.get(1)?,
      description: row.get(2)?,
      author:      row.get(3)?,
      version:     row.get(4)?,
      match_rules: row.get(5)?,
      grants:      row.get(6)?,
      run_at:      row.get(7)?,
      updated_at:  row.get(8)?,
    })
  }

  pub fn into_meta(self) -> Result<ScriptMeta> {
    Ok(ScriptMeta {
      id:          decode_uuid(&self.script_id)?,
      name:        self.name,
      description: self.description,
      author:      self.author,
      version:     self.version,
      match_rules: decode_rules(&self.match_rules)?,
      grants:      decode_grants(&self.grants)?,
      run_at:      decode_run_at(&self.run_at)?,
      updated_at:  decode_dt(&self.updated_at)?,
    })
  }
}

/// A full `scripts` row: metadata plus the source column.
pub struct RawScript {
  pub meta:        RawMeta,
  pub source_code: String,
}

impl RawScript {
  /// Read [`META_COLUMNS`] followed by `source_code`.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { meta: RawMeta::from_row(row)?, source_code: row.get(9)? })
  }

  pub fn into_record(self, version_history: Vec<HistoryEntry>) -> Result<ScriptRecord> {
    let meta = self.meta.into_meta()?;
    Ok(ScriptRecord {
      id: meta.id,
      name: meta.name,
      description: meta.description,
      author: meta.author,
      version: meta.version,
      source_code: self.source_code,
      match_rules: meta.match_rules,
      grants: meta.grants,
      run_at: meta.run_at,
      updated_at: meta.updated_at,
      version_history,
    })
  }
}

/// Raw strings read from a `script_history` row.
pub struct RawHistory {
  pub version:     String,
  pub source_code: String,
  pub changelog:   Option<String>,
  pub recorded_at: String,
}

impl RawHistory {
  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      version:     self.version,
      source_code: self.source_code,
      changelog:   self.changelog,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_keep_sub_microsecond_precision() {
    let dt = Utc.timestamp_opt(1_717_200_000, 123_456_789).unwrap();
    assert_eq!(decode_dt(&encode_dt(dt)).unwrap(), dt);
  }

  #[test]
  fn unknown_run_at_is_a_decode_error() {
    assert!(matches!(decode_run_at("later"), Err(Error::Decode { column: "run_at", .. })));
  }
}
