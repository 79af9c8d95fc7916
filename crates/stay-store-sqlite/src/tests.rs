//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeMap;

use chrono::Duration;
use serde_json::json;
use stay_core::{
  script::{Grant, RunAt, ScriptDraft},
  snapshot::{ExportedScript, ImportMode, Snapshot},
  store::{ChangeSet, ScriptStore},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

fn store() -> SqliteStore { SqliteStore::open_in_memory().expect("in-memory store") }

fn draft(name: &str) -> ScriptDraft {
  ScriptDraft::new(name, "1.0.0", format!("// {name}")).include("*://*.example.com/*")
}

fn is_not_found(err: &Error) -> bool {
  matches!(err.as_core(), Some(stay_core::Error::ScriptNotFound(_)))
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[test]
fn save_and_get() {
  let s = store();
  let saved = s.save(draft("a").grant(Grant::Storage).run_at(RunAt::DocumentStart)).unwrap();

  let fetched = s.get(saved.id).unwrap().expect("record exists");
  assert_eq!(fetched, saved);
  assert_eq!(fetched.grants, [Grant::Storage].into());
  assert_eq!(fetched.run_at, RunAt::DocumentStart);
  assert_eq!(fetched.version_history.len(), 1);
  assert_eq!(fetched.version_history[0].version, "1.0.0");
}

#[test]
fn get_missing_returns_none() {
  let s = store();
  assert!(s.get(Uuid::new_v4()).unwrap().is_none());
  assert!(s.history(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn invalid_draft_is_never_written() {
  let s = store();
  let bad = ScriptDraft::new("bad", "1.0.0", "").include("https://a b");
  let id = bad.id;
  let err = s.save(bad).unwrap_err();
  assert!(matches!(err.as_core(), Some(stay_core::Error::Pattern(_))));
  assert!(s.get(id).unwrap().is_none());
}

#[test]
fn new_version_appends_history() {
  let s = store();
  let v1 = s.save(draft("a")).unwrap();

  let mut next = ScriptDraft::from_record(&v1);
  next.version = "1.1.0".into();
  next.source_code = "// a, faster".into();
  next.changelog = Some("speed".into());
  let v2 = s.save(next).unwrap();

  assert!(v2.updated_at > v1.updated_at);
  let history = s.history(v1.id).unwrap().unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].source_code, "// a");
  assert_eq!(history[1].version, "1.1.0");
  assert_eq!(history[1].changelog.as_deref(), Some("speed"));
}

#[test]
fn metadata_only_change_keeps_history() {
  let s = store();
  let v1 = s.save(draft("a")).unwrap();

  let mut next = ScriptDraft::from_record(&v1);
  next.description = "now described".into();
  let v2 = s.save(next).unwrap();

  assert!(v2.updated_at > v1.updated_at);
  assert_eq!(v2.version_history.len(), 1);
  assert_eq!(s.get(v1.id).unwrap().unwrap().description, "now described");
}

#[test]
fn updated_at_strictly_increases() {
  let s = store();
  let mut record = s.save(draft("a")).unwrap();
  for _ in 0..20 {
    let next = s.save(ScriptDraft::from_record(&record)).unwrap();
    assert!(next.updated_at > record.updated_at);
    record = next;
  }
}

#[test]
fn concurrent_saves_of_one_id_leave_one_record() {
  let s = store();
  let id = Uuid::new_v4();

  std::thread::scope(|scope| {
    for i in 0..2 {
      let s = s.clone();
      scope.spawn(move || {
        let d = ScriptDraft::new("race", "1.0.0", format!("// writer {i}")).with_id(id);
        s.save(d).unwrap();
      });
    }
  });

  assert_eq!(s.list().unwrap().len(), 1);
  let record = s.get(id).unwrap().unwrap();
  // One creation, then one content change from the other writer.
  assert_eq!(record.version_history.len(), 2);
  assert_eq!(record.version_history[1].source_code, record.source_code);
}

/// Rows left in the history and value tables for `id`.
fn dependent_rows(s: &SqliteStore, id: Uuid) -> (i64, i64) {
  s.with_conn(|conn| {
    let key = crate::encode::encode_uuid(id);
    let count = |table: &str| -> rusqlite::Result<i64> {
      conn.query_row(&format!("SELECT COUNT(*) FROM {table} WHERE script_id = ?1"), [&key], |r| {
        r.get(0)
      })
    };
    Ok((count("script_history")?, count("script_values")?))
  })
  .unwrap()
}

#[test]
fn save_racing_remove_never_leaves_partial_state() {
  let s = store();
  let id = Uuid::new_v4();

  std::thread::scope(|scope| {
    let writer = s.clone();
    scope.spawn(move || {
      for i in 0..50 {
        let d = ScriptDraft::new("race", "1.0.0", format!("// pass {i}")).with_id(id);
        writer.save(d).unwrap();
        // The remover may win between the two calls.
        let _ = writer.value_set(id, "pass", json!(i));
      }
    });
    let remover = s.clone();
    scope.spawn(move || {
      for _ in 0..50 {
        remover.remove(id).unwrap();
        std::thread::yield_now();
      }
    });
  });

  let (history_rows, value_rows) = dependent_rows(&s, id);
  match s.get(id).unwrap() {
    Some(record) => {
      assert!(!record.version_history.is_empty());
      assert_eq!(history_rows, record.version_history.len() as i64);
      assert_eq!(record.version_history.last().unwrap().source_code, record.source_code);
      assert_eq!(value_rows, s.value_keys(id).unwrap().len() as i64);
    }
    None => assert_eq!((history_rows, value_rows), (0, 0)),
  }

  // Settle on a removal and check nothing is orphaned.
  s.remove(id).unwrap();
  assert_eq!(dependent_rows(&s, id), (0, 0));
}

#[test]
fn remove_deletes_record_and_namespace() {
  let s = store();
  let a = s.save(draft("a")).unwrap();
  s.value_set(a.id, "k", json!(1)).unwrap();

  assert!(s.remove(a.id).unwrap());
  assert!(!s.remove(a.id).unwrap());
  assert!(s.get(a.id).unwrap().is_none());
  assert!(is_not_found(&s.value_get(a.id, "k").unwrap_err()));

  // Re-creating the same id starts with an empty namespace.
  s.save(draft("a").with_id(a.id)).unwrap();
  assert_eq!(s.value_get(a.id, "k").unwrap(), None);
}

#[test]
fn list_is_newest_first() {
  let s = store();
  let a = s.save(draft("a")).unwrap();
  let b = s.save(draft("b")).unwrap();
  s.save(ScriptDraft::from_record(&a)).unwrap();

  let names: Vec<_> = s.list().unwrap().into_iter().map(|m| m.name).collect();
  assert_eq!(names, ["a", "b"]);
  assert_eq!(s.records().unwrap()[1].id, b.id);
}

// ─── Matching ────────────────────────────────────────────────────────────────

#[test]
fn all_matching_filters_and_orders() {
  let s = store();
  let news = s.save(draft("news")).unwrap();
  let admin = s
    .save(ScriptDraft::new("admin-only", "1.0.0", "").include("https://admin.example.com/*"))
    .unwrap();
  s.save(draft("hidden").exclude("*://*.example.com/private/*")).unwrap();
  s.save(ScriptDraft::new("no rules", "1.0.0", "")).unwrap();

  let hits: Vec<_> = s
    .all_matching("https://admin.example.com/private/x")
    .unwrap()
    .into_iter()
    .map(|r| r.id)
    .collect();
  assert_eq!(hits, [admin.id, news.id]);

  assert!(s.all_matching("https://other.org/").unwrap().is_empty());
}

#[test]
fn all_matching_sees_updated_rules() {
  let s = store();
  let a = s.save(draft("a")).unwrap();
  assert_eq!(s.all_matching("https://www.example.com/").unwrap().len(), 1);

  let mut next = ScriptDraft::from_record(&a);
  next.match_rules.clear();
  s.save(next.include("https://other.org/*")).unwrap();

  assert!(s.all_matching("https://www.example.com/").unwrap().is_empty());
  assert_eq!(s.all_matching("https://other.org/x").unwrap().len(), 1);
}

// ─── Namespaces ──────────────────────────────────────────────────────────────

#[test]
fn namespaces_are_isolated() {
  let s = store();
  let a = s.save(draft("a")).unwrap();
  let b = s.save(draft("b")).unwrap();

  s.value_set(a.id, "theme", json!("dark")).unwrap();
  s.value_set(b.id, "theme", json!({ "mode": "light" })).unwrap();
  s.value_set(a.id, "count", json!(2)).unwrap();

  assert_eq!(s.value_get(a.id, "theme").unwrap(), Some(json!("dark")));
  assert_eq!(s.value_get(b.id, "theme").unwrap(), Some(json!({ "mode": "light" })));
  assert_eq!(s.value_keys(a.id).unwrap(), ["count", "theme"]);
  assert_eq!(s.value_keys(b.id).unwrap(), ["theme"]);
  assert_eq!(s.values(a.id).unwrap().len(), 2);

  assert!(s.value_delete(a.id, "theme").unwrap());
  assert!(!s.value_delete(a.id, "theme").unwrap());
  assert_eq!(s.value_get(b.id, "theme").unwrap(), Some(json!({ "mode": "light" })));
}

#[test]
fn namespace_calls_on_unknown_script_fail() {
  let s = store();
  let id = Uuid::new_v4();
  assert!(is_not_found(&s.value_set(id, "k", json!(1)).unwrap_err()));
  assert!(is_not_found(&s.value_keys(id).unwrap_err()));
  assert!(is_not_found(&s.value_delete(id, "k").unwrap_err()));
}

// ─── Export / import ─────────────────────────────────────────────────────────

#[test]
fn export_then_replace_import_reproduces_store() {
  let s = store();
  let a = s.save(draft("a")).unwrap();
  s.save(draft("b")).unwrap();
  s.value_set(a.id, "k", json!([1, 2])).unwrap();
  let snapshot = s.export_all().unwrap();

  let fresh = store();
  fresh.save(draft("stale")).unwrap();
  let summary = fresh.import_all(&snapshot, ImportMode::Replace).unwrap();
  assert_eq!(summary.imported, 2);

  assert_eq!(fresh.records().unwrap(), s.records().unwrap());
  assert_eq!(fresh.value_get(a.id, "k").unwrap(), Some(json!([1, 2])));
}

#[test]
fn merge_import_keeps_newer_local_copy() {
  let s = store();
  let local = s.save(draft("a")).unwrap();

  let mut older = local.clone();
  older.name = "old name".into();
  older.updated_at = local.updated_at - Duration::hours(1);
  let mut values = BTreeMap::new();
  values.insert("k".to_owned(), json!("remote"));
  let incoming = ExportedScript { record: older, values };

  let summary = s
    .import_all(&Snapshot::new(vec![incoming.clone()]), ImportMode::Merge)
    .unwrap();
  assert_eq!((summary.imported, summary.kept_local), (0, 1));
  assert_eq!(s.get(local.id).unwrap().unwrap().name, "a");

  let mut newer = incoming;
  newer.record.updated_at = local.updated_at + Duration::hours(1);
  let summary = s.import_all(&Snapshot::new(vec![newer]), ImportMode::Merge).unwrap();
  assert_eq!(summary.imported, 1);
  assert_eq!(s.get(local.id).unwrap().unwrap().name, "old name");
  assert_eq!(s.value_get(local.id, "k").unwrap(), Some(json!("remote")));
}

#[test]
fn failed_import_leaves_store_untouched() {
  let s = store();
  let a = s.save(draft("a")).unwrap();
  let before = s.records().unwrap();

  let mut broken = a.clone();
  broken.id = Uuid::new_v4();
  broken.version = "not-a-version".into();
  let snapshot = Snapshot::new(vec![
    ExportedScript { record: a.clone(), values: BTreeMap::new() },
    ExportedScript { record: broken, values: BTreeMap::new() },
  ]);

  let err = s.import_all(&snapshot, ImportMode::Replace).unwrap_err();
  assert!(matches!(err.as_core(), Some(stay_core::Error::Import(_))));
  assert_eq!(s.records().unwrap(), before);
}

// ─── Bulk writes ─────────────────────────────────────────────────────────────

#[test]
fn apply_writes_verbatim_and_deletes() {
  let s = store();
  let a = s.save(draft("a")).unwrap();
  let b = s.save(draft("b")).unwrap();

  let mut remote = a.clone();
  remote.source_code = "// from elsewhere".into();
  remote.updated_at = a.updated_at + Duration::minutes(5);

  s.apply(ChangeSet { upserts: vec![remote.clone()], deletes: vec![b.id] }).unwrap();

  assert_eq!(s.get(a.id).unwrap().unwrap(), remote);
  assert!(s.get(b.id).unwrap().is_none());
}

#[test]
fn restore_then_save_continues_history() {
  let s = store();
  let original = s.save(draft("a")).unwrap();
  let restored = s.restore(original.clone()).unwrap();
  assert_eq!(s.get(original.id).unwrap().unwrap(), restored);

  let mut next = ScriptDraft::from_record(&restored);
  next.version = "2.0.0".into();
  let saved = s.save(next).unwrap();
  assert_eq!(saved.version_history.len(), 2);
}

#[test]
fn clear_empties_everything() {
  let s = store();
  let a = s.save(draft("a")).unwrap();
  s.value_set(a.id, "k", json!(true)).unwrap();
  s.clear().unwrap();

  assert!(s.list().unwrap().is_empty());
  assert!(s.all_matching("https://www.example.com/").unwrap().is_empty());
  assert!(is_not_found(&s.value_keys(a.id).unwrap_err()));
}
