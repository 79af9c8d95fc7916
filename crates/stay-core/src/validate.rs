//! Validation applied before anything is persisted.
//!
//! Stores call these at the point of mutation; a value that fails here is
//! never written.

use crate::{
  Error, Result,
  pattern::Matcher,
  script::{MatchRule, ScriptDraft, ScriptRecord},
  version::Version,
};

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_AUTHOR_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4 * 1024;
pub const MAX_SOURCE_LEN: usize = 1024 * 1024;
pub const MAX_CHANGELOG_LEN: usize = 4 * 1024;
pub const MAX_RULES: usize = 256;

pub fn validate_draft(draft: &ScriptDraft) -> Result<()> {
  check_fields(
    &draft.name,
    &draft.description,
    &draft.author,
    &draft.version,
    &draft.source_code,
    &draft.match_rules,
  )?;
  if let Some(changelog) = &draft.changelog {
    check_len("changelog", changelog, MAX_CHANGELOG_LEN)?;
  }
  Ok(())
}

/// Validate a fully-formed record arriving from import or sync.
pub fn validate_record(record: &ScriptRecord) -> Result<()> {
  check_fields(
    &record.name,
    &record.description,
    &record.author,
    &record.version,
    &record.source_code,
    &record.match_rules,
  )?;
  for entry in &record.version_history {
    entry.version.parse::<Version>()?;
    check_len("history source", &entry.source_code, MAX_SOURCE_LEN)?;
  }
  Ok(())
}

fn check_fields(
  name: &str,
  description: &str,
  author: &str,
  version: &str,
  source_code: &str,
  rules: &[MatchRule],
) -> Result<()> {
  if name.trim().is_empty() {
    return Err(Error::Validation { field: "name", reason: "must not be empty".into() });
  }
  check_len("name", name, MAX_NAME_LEN)?;
  check_len("description", description, MAX_DESCRIPTION_LEN)?;
  check_len("author", author, MAX_AUTHOR_LEN)?;
  check_len("source", source_code, MAX_SOURCE_LEN)?;
  version.parse::<Version>()?;

  if rules.len() > MAX_RULES {
    return Err(Error::Validation {
      field:  "match rules",
      reason: format!("{} rules exceeds the limit of {MAX_RULES}", rules.len()),
    });
  }
  Matcher::compile(rules)?;
  Ok(())
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
  if value.len() > max {
    return Err(Error::Validation {
      field,
      reason: format!("{} bytes exceeds the limit of {max}", value.len()),
    });
  }
  Ok(())
}
