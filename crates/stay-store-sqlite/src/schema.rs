//! SQL schema for the Stay SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS scripts (
    script_id   TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    author      TEXT NOT NULL DEFAULT '',
    version     TEXT NOT NULL,
    source_code TEXT NOT NULL,
    match_rules TEXT NOT NULL DEFAULT '[]',  -- JSON array of {kind, pattern}
    grants      TEXT NOT NULL DEFAULT '[]',  -- JSON array of grant names
    run_at      TEXT NOT NULL,               -- 'document-start' | 'document-end' | 'document-idle'
    updated_at  TEXT NOT NULL                -- RFC 3339 UTC
);

-- Append-only per script; rows are only ever inserted at the next seq,
-- or replaced wholesale when a record is restored from import or sync.
CREATE TABLE IF NOT EXISTS script_history (
    script_id   TEXT    NOT NULL REFERENCES scripts(script_id) ON DELETE CASCADE,
    seq         INTEGER NOT NULL,
    version     TEXT    NOT NULL,
    source_code TEXT    NOT NULL,
    changelog   TEXT,
    recorded_at TEXT    NOT NULL,
    PRIMARY KEY (script_id, seq)
);

-- Per-script key/value namespace.
CREATE TABLE IF NOT EXISTS script_values (
    script_id  TEXT NOT NULL REFERENCES scripts(script_id) ON DELETE CASCADE,
    key        TEXT NOT NULL,
    value_json TEXT NOT NULL,
    PRIMARY KEY (script_id, key)
);

PRAGMA user_version = 1;
";
