//! [`SqliteStore`]: the SQLite implementation of [`ScriptStore`].

use std::{
  collections::{BTreeMap, HashMap},
  path::Path,
  sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension as _};
use sha2::{Digest, Sha256};
use stay_core::{
  pattern::Matcher,
  script::{HistoryEntry, MatchRule, ScriptDraft, ScriptMeta, ScriptRecord},
  snapshot::{ExportedScript, ImportMode, ImportSummary, Snapshot},
  store::{ChangeSet, ScriptStore},
  validate::{validate_draft, validate_record},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    META_COLUMNS, RawHistory, RawMeta, RawScript, decode_dt, encode_dt, encode_grants,
    encode_rules, encode_run_at, encode_uuid,
  },
  schema::SCHEMA,
};

/// Compiled matchers kept before the cache is dropped and rebuilt.
const MATCHER_CACHE_LIMIT: usize = 1024;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A script store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and matcher cache are shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:     Arc<Mutex<Connection>>,
  /// Compiled rule sets keyed by the SHA-256 of their JSON encoding.
  matchers: Arc<Mutex<HashMap<String, Arc<Matcher>>>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::init(Connection::open(path)?)
  }

  /// Open an in-memory store, for tests.
  pub fn open_in_memory() -> Result<Self> { Self::init(Connection::open_in_memory()?) }

  fn init(conn: Connection) -> Result<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn:     Arc::new(Mutex::new(conn)),
      matchers: Arc::new(Mutex::new(HashMap::new())),
    })
  }

  /// Run `f` with exclusive access to the connection.
  pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
    let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
    f(&mut conn)
  }

  /// Fetch or compile the matcher for `rules`.
  fn matcher_for(&self, rules: &[MatchRule]) -> Result<Arc<Matcher>> {
    let key = hex::encode(Sha256::digest(encode_rules(rules)?.as_bytes()));
    let mut cache = self.matchers.lock().map_err(|_| Error::LockPoisoned)?;
    if let Some(m) = cache.get(&key) {
      return Ok(Arc::clone(m));
    }
    if cache.len() >= MATCHER_CACHE_LIMIT {
      cache.clear();
    }
    let matcher = Arc::new(Matcher::compile(rules)?);
    cache.insert(key, Arc::clone(&matcher));
    Ok(matcher)
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

/// Most recently updated first; ties broken by id so the order is total.
fn newest_first(a: (DateTime<Utc>, Uuid), b: (DateTime<Utc>, Uuid)) -> std::cmp::Ordering {
  b.0.cmp(&a.0).then(a.1.cmp(&b.1))
}

/// A timestamp strictly after `prev`, normally `now`.
fn next_timestamp(prev: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
  if now > prev { now } else { prev + Duration::microseconds(1) }
}

fn exists(conn: &Connection, id_str: &str) -> Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM scripts WHERE script_id = ?1", [id_str], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

fn require(conn: &Connection, id: Uuid) -> Result<String> {
  let id_str = encode_uuid(id);
  if !exists(conn, &id_str)? {
    return Err(stay_core::Error::ScriptNotFound(id).into());
  }
  Ok(id_str)
}

fn load_history(conn: &Connection, id_str: &str) -> Result<Vec<HistoryEntry>> {
  let mut stmt = conn.prepare(
    "SELECT version, source_code, changelog, recorded_at
     FROM script_history WHERE script_id = ?1 ORDER BY seq",
  )?;
  let raws = stmt
    .query_map([id_str], |row| {
      Ok(RawHistory {
        version:     row.get(0)?,
        source_code: row.get(1)?,
        changelog:   row.get(2)?,
        recorded_at: row.get(3)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawHistory::into_entry).collect()
}

fn load_record(conn: &Connection, id: Uuid) -> Result<Option<ScriptRecord>> {
  let id_str = encode_uuid(id);
  let raw = conn
    .query_row(
      &format!("SELECT {META_COLUMNS}, source_code FROM scripts WHERE script_id = ?1"),
      [&id_str],
      RawScript::from_row,
    )
    .optional()?;
  match raw {
    Some(raw) => Ok(Some(raw.into_record(load_history(conn, &id_str)?)?)),
    None => Ok(None),
  }
}

fn load_metas(conn: &Connection) -> Result<Vec<ScriptMeta>> {
  let mut stmt = conn.prepare(&format!("SELECT {META_COLUMNS} FROM scripts"))?;
  let raws = stmt
    .query_map([], RawMeta::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let mut metas = raws
    .into_iter()
    .map(RawMeta::into_meta)
    .collect::<Result<Vec<_>>>()?;
  metas.sort_by(|a, b| newest_first((a.updated_at, a.id), (b.updated_at, b.id)));
  Ok(metas)
}

fn load_records(conn: &Connection) -> Result<Vec<ScriptRecord>> {
  let mut history: HashMap<String, Vec<HistoryEntry>> = HashMap::new();
  {
    let mut stmt = conn.prepare(
      "SELECT script_id, version, source_code, changelog, recorded_at
       FROM script_history ORDER BY script_id, seq",
    )?;
    let rows = stmt
      .query_map([], |row| {
        Ok((row.get::<_, String>(0)?, RawHistory {
          version:     row.get(1)?,
          source_code: row.get(2)?,
          changelog:   row.get(3)?,
          recorded_at: row.get(4)?,
        }))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    for (id_str, raw) in rows {
      history.entry(id_str).or_default().push(raw.into_entry()?);
    }
  }

  let mut stmt = conn.prepare(&format!("SELECT {META_COLUMNS}, source_code FROM scripts"))?;
  let raws = stmt
    .query_map([], RawScript::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let mut records = raws
    .into_iter()
    .map(|raw| {
      let entries = history.remove(&raw.meta.script_id).unwrap_or_default();
      raw.into_record(entries)
    })
    .collect::<Result<Vec<_>>>()?;
  records.sort_by(|a, b| newest_first((a.updated_at, a.id), (b.updated_at, b.id)));
  Ok(records)
}

fn load_values(conn: &Connection, id_str: &str) -> Result<BTreeMap<String, serde_json::Value>> {
  let mut stmt =
    conn.prepare("SELECT key, value_json FROM script_values WHERE script_id = ?1")?;
  let rows = stmt
    .query_map([id_str], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows
    .into_iter()
    .map(|(k, v)| Ok((k, serde_json::from_str(&v)?)))
    .collect()
}

/// Insert or overwrite the `scripts` row. Never touches history or values.
fn upsert_row(conn: &Connection, record: &ScriptRecord) -> Result<()> {
  conn.execute(
    "INSERT INTO scripts (
       script_id, name, description, author, version,
       source_code, match_rules, grants, run_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
     ON CONFLICT(script_id) DO UPDATE SET
       name        = excluded.name,
       description = excluded.description,
       author      = excluded.author,
       version     = excluded.version,
       source_code = excluded.source_code,
       match_rules = excluded.match_rules,
       grants      = excluded.grants,
       run_at      = excluded.run_at,
       updated_at  = excluded.updated_at",
    rusqlite::params![
      encode_uuid(record.id),
      record.name,
      record.description,
      record.author,
      record.version,
      record.source_code,
      encode_rules(&record.match_rules)?,
      encode_grants(&record.grants)?,
      encode_run_at(record.run_at),
      encode_dt(record.updated_at),
    ],
  )?;
  Ok(())
}

fn append_history(conn: &Connection, id_str: &str, seq: usize, entry: &HistoryEntry) -> Result<()> {
  conn.execute(
    "INSERT INTO script_history (script_id, seq, version, source_code, changelog, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    rusqlite::params![
      id_str,
      seq as i64,
      entry.version,
      entry.source_code,
      entry.changelog,
      encode_dt(entry.recorded_at),
    ],
  )?;
  Ok(())
}

/// Write `record` verbatim: row plus a wholesale replacement of its history.
fn write_full(conn: &Connection, record: &ScriptRecord) -> Result<()> {
  let id_str = encode_uuid(record.id);
  upsert_row(conn, record)?;
  conn.execute("DELETE FROM script_history WHERE script_id = ?1", [&id_str])?;
  for (seq, entry) in record.version_history.iter().enumerate() {
    append_history(conn, &id_str, seq, entry)?;
  }
  Ok(())
}

fn replace_values(
  conn: &Connection,
  id_str: &str,
  values: &BTreeMap<String, serde_json::Value>,
) -> Result<()> {
  conn.execute("DELETE FROM script_values WHERE script_id = ?1", [id_str])?;
  for (key, value) in values {
    conn.execute(
      "INSERT INTO script_values (script_id, key, value_json) VALUES (?1, ?2, ?3)",
      rusqlite::params![id_str, key, serde_json::to_string(value)?],
    )?;
  }
  Ok(())
}

fn local_updated_at(conn: &Connection, id_str: &str) -> Result<Option<DateTime<Utc>>> {
  let raw: Option<String> = conn
    .query_row("SELECT updated_at FROM scripts WHERE script_id = ?1", [id_str], |r| r.get(0))
    .optional()?;
  raw.as_deref().map(decode_dt).transpose()
}

// ─── ScriptStore impl ────────────────────────────────────────────────────────

impl ScriptStore for SqliteStore {
  type Error = Error;

  // ── Records ───────────────────────────────────────────────────────────────

  fn save(&self, draft: ScriptDraft) -> Result<ScriptRecord> {
    validate_draft(&draft)?;

    let (record, created) = self.with_conn(|conn| {
      let tx = conn.transaction()?;
      let id_str = encode_uuid(draft.id);
      let previous = load_record(&tx, draft.id)?;
      let now = Utc::now();
      let created = previous.is_none();

      let (updated_at, history, changed) = match previous {
        Some(prev) => {
          let changed = prev.source_code != draft.source_code || prev.version != draft.version;
          (next_timestamp(prev.updated_at, now), prev.version_history, changed)
        }
        None => (now, Vec::new(), true),
      };

      let mut record = ScriptRecord {
        id: draft.id,
        name: draft.name,
        description: draft.description,
        author: draft.author,
        version: draft.version,
        source_code: draft.source_code,
        match_rules: draft.match_rules,
        grants: draft.grants,
        run_at: draft.run_at,
        updated_at,
        version_history: history,
      };
      upsert_row(&tx, &record)?;

      if changed {
        let entry = HistoryEntry {
          version:     record.version.clone(),
          source_code: record.source_code.clone(),
          changelog:   draft.changelog,
          recorded_at: updated_at,
        };
        append_history(&tx, &id_str, record.version_history.len(), &entry)?;
        record.version_history.push(entry);
      }

      tx.commit()?;
      Ok((record, created))
    })?;

    info!(
      script_id = %record.id,
      name = %record.name,
      version = %record.version,
      created,
      "saved script"
    );
    Ok(record)
  }

  fn restore(&self, record: ScriptRecord) -> Result<ScriptRecord> {
    validate_record(&record)?;
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      write_full(&tx, &record)?;
      tx.commit()?;
      Ok(())
    })?;
    info!(script_id = %record.id, name = %record.name, "restored script");
    Ok(record)
  }

  fn remove(&self, id: Uuid) -> Result<bool> {
    let removed = self.with_conn(|conn| {
      let tx = conn.transaction()?;
      let n = tx.execute("DELETE FROM scripts WHERE script_id = ?1", [encode_uuid(id)])?;
      tx.commit()?;
      Ok(n > 0)
    })?;
    if removed {
      info!(script_id = %id, "removed script");
    }
    Ok(removed)
  }

  fn get(&self, id: Uuid) -> Result<Option<ScriptRecord>> {
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      load_record(&tx, id)
    })
  }

  fn list(&self) -> Result<Vec<ScriptMeta>> { self.with_conn(|conn| load_metas(conn)) }

  fn records(&self) -> Result<Vec<ScriptRecord>> {
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      load_records(&tx)
    })
  }

  fn all_matching(&self, url: &str) -> Result<Vec<ScriptRecord>> {
    let matched = self.with_conn(|conn| {
      let tx = conn.transaction()?;
      let mut matched = Vec::new();
      for meta in load_metas(&tx)? {
        if self.matcher_for(&meta.match_rules)?.matches(url)
          && let Some(record) = load_record(&tx, meta.id)?
        {
          matched.push(record);
        }
      }
      Ok(matched)
    })?;
    debug!(url, count = matched.len(), "matched scripts");
    Ok(matched)
  }

  // ── Bulk ──────────────────────────────────────────────────────────────────

  fn export_all(&self) -> Result<Snapshot> {
    let scripts = self.with_conn(|conn| {
      let tx = conn.transaction()?;
      load_records(&tx)?
        .into_iter()
        .map(|record| {
          let values = load_values(&tx, &encode_uuid(record.id))?;
          Ok(ExportedScript { record, values })
        })
        .collect::<Result<Vec<_>>>()
    })?;
    info!(count = scripts.len(), "exported scripts");
    Ok(Snapshot::new(scripts))
  }

  fn import_all(&self, snapshot: &Snapshot, mode: ImportMode) -> Result<ImportSummary> {
    snapshot.validate()?;

    let summary = self.with_conn(|conn| {
      let tx = conn.transaction()?;
      let mut summary = ImportSummary::default();

      if mode == ImportMode::Replace {
        tx.execute("DELETE FROM scripts", [])?;
      }

      for script in &snapshot.scripts {
        let id_str = encode_uuid(script.record.id);
        if mode == ImportMode::Merge
          && let Some(local) = local_updated_at(&tx, &id_str)?
          && script.record.updated_at <= local
        {
          summary.kept_local += 1;
          continue;
        }
        write_full(&tx, &script.record)?;
        replace_values(&tx, &id_str, &script.values)?;
        summary.imported += 1;
      }

      tx.commit()?;
      Ok(summary)
    })?;

    info!(
      %mode,
      imported = summary.imported,
      kept_local = summary.kept_local,
      "imported snapshot"
    );
    Ok(summary)
  }

  fn apply(&self, changes: ChangeSet) -> Result<()> {
    for record in &changes.upserts {
      validate_record(record)?;
    }
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      for record in &changes.upserts {
        write_full(&tx, record)?;
      }
      for id in &changes.deletes {
        tx.execute("DELETE FROM scripts WHERE script_id = ?1", [encode_uuid(*id)])?;
      }
      tx.commit()?;
      Ok(())
    })?;
    info!(
      upserts = changes.upserts.len(),
      deletes = changes.deletes.len(),
      "applied change set"
    );
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self.with_conn(|conn| {
      conn.execute("DELETE FROM scripts", [])?;
      Ok(())
    })?;
    info!("cleared all scripts");
    Ok(())
  }

  // ── Namespaces ────────────────────────────────────────────────────────────

  fn value_get(&self, id: Uuid, key: &str) -> Result<Option<serde_json::Value>> {
    self.with_conn(|conn| {
      let id_str = require(conn, id)?;
      let raw: Option<String> = conn
        .query_row(
          "SELECT value_json FROM script_values WHERE script_id = ?1 AND key = ?2",
          [id_str.as_str(), key],
          |r| r.get(0),
        )
        .optional()?;
      Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    })
  }

  fn value_set(&self, id: Uuid, key: &str, value: serde_json::Value) -> Result<()> {
    let encoded = serde_json::to_string(&value)?;
    self.with_conn(|conn| {
      let id_str = require(conn, id)?;
      conn.execute(
        "INSERT INTO script_values (script_id, key, value_json) VALUES (?1, ?2, ?3)
         ON CONFLICT(script_id, key) DO UPDATE SET value_json = excluded.value_json",
        [id_str.as_str(), key, encoded.as_str()],
      )?;
      Ok(())
    })
  }

  fn value_delete(&self, id: Uuid, key: &str) -> Result<bool> {
    self.with_conn(|conn| {
      let id_str = require(conn, id)?;
      let n = conn.execute(
        "DELETE FROM script_values WHERE script_id = ?1 AND key = ?2",
        [id_str.as_str(), key],
      )?;
      Ok(n > 0)
    })
  }

  fn values(&self, id: Uuid) -> Result<BTreeMap<String, serde_json::Value>> {
    self.with_conn(|conn| {
      let id_str = require(conn, id)?;
      load_values(conn, &id_str)
    })
  }

  fn value_keys(&self, id: Uuid) -> Result<Vec<String>> {
    self.with_conn(|conn| {
      let id_str = require(conn, id)?;
      let mut stmt =
        conn.prepare("SELECT key FROM script_values WHERE script_id = ?1 ORDER BY key")?;
      let keys = stmt
        .query_map([id_str.as_str()], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
      Ok(keys)
    })
  }
}
