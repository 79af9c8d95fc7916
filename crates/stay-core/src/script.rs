//! Script records: the unit the store persists and the runtime executes.
//!
//! A [`ScriptRecord`] is created and mutated only through the store. Scripts
//! themselves never see their own record beyond the read-only info snapshot
//! the runtime hands them.

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Result,
  pattern::{Matcher, PatternError},
  version::Version,
};

// ─── Match rules ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
  Include,
  Exclude,
}

/// One wildcard rule; the rule set of a script is an ordered list of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRule {
  pub kind:    RuleKind,
  pub pattern: String,
}

impl MatchRule {
  pub fn include(pattern: impl Into<String>) -> Self {
    Self { kind: RuleKind::Include, pattern: pattern.into() }
  }

  pub fn exclude(pattern: impl Into<String>) -> Self {
    Self { kind: RuleKind::Exclude, pattern: pattern.into() }
  }
}

// ─── Grants ──────────────────────────────────────────────────────────────────

/// A capability a script may declare. The set is closed: the runtime knows
/// how to provide every variant and nothing else.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Grant {
  Storage,
  Network,
  Style,
  Menu,
  Tab,
  RawPageAccess,
}

impl Grant {
  pub const ALL: [Grant; 6] = [
    Grant::Storage,
    Grant::Network,
    Grant::Style,
    Grant::Menu,
    Grant::Tab,
    Grant::RawPageAccess,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Storage => "storage",
      Self::Network => "network",
      Self::Style => "style",
      Self::Menu => "menu",
      Self::Tab => "tab",
      Self::RawPageAccess => "raw-page-access",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|g| g.as_str() == s)
  }
}

impl fmt::Display for Grant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Run timing ──────────────────────────────────────────────────────────────

/// When in the page's construction a script runs. Declaration order is
/// dispatch order.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum RunAt {
  /// Before the document has been constructed.
  DocumentStart,
  /// Once the document is parsed, before subresources finish.
  DocumentEnd,
  /// After the page has settled.
  #[default]
  DocumentIdle,
}

impl RunAt {
  pub const ALL: [RunAt; 3] = [RunAt::DocumentStart, RunAt::DocumentEnd, RunAt::DocumentIdle];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::DocumentStart => "document-start",
      Self::DocumentEnd => "document-end",
      Self::DocumentIdle => "document-idle",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|r| r.as_str() == s)
  }
}

impl fmt::Display for RunAt {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// One snapshot in a script's append-only version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  pub version:     String,
  pub source_code: String,
  #[serde(default)]
  pub changelog:   Option<String>,
  pub recorded_at: DateTime<Utc>,
}

// ─── ScriptRecord ────────────────────────────────────────────────────────────

/// A managed userscript as persisted by the store.
///
/// `version_history` holds every version ever saved, oldest first; its last
/// entry describes the live `version` and `source_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRecord {
  pub id:              Uuid,
  pub name:            String,
  #[serde(default)]
  pub description:     String,
  #[serde(default)]
  pub author:          String,
  pub version:         String,
  pub source_code:     String,
  #[serde(default)]
  pub match_rules:     Vec<MatchRule>,
  #[serde(default)]
  pub grants:          BTreeSet<Grant>,
  #[serde(default)]
  pub run_at:          RunAt,
  pub updated_at:      DateTime<Utc>,
  #[serde(default)]
  pub version_history: Vec<HistoryEntry>,
}

impl ScriptRecord {
  /// Metadata view without the source body or history.
  pub fn meta(&self) -> ScriptMeta {
    ScriptMeta {
      id:          self.id,
      name:        self.name.clone(),
      description: self.description.clone(),
      author:      self.author.clone(),
      version:     self.version.clone(),
      match_rules: self.match_rules.clone(),
      grants:      self.grants.clone(),
      run_at:      self.run_at,
      updated_at:  self.updated_at,
    }
  }

  pub fn parsed_version(&self) -> Result<Version> { self.version.parse() }

  pub fn matcher(&self) -> Result<Matcher, PatternError> { Matcher::compile(&self.match_rules) }

  pub fn is_granted(&self, grant: Grant) -> bool { self.grants.contains(&grant) }
}

/// What `list()` returns: a record minus `source_code` and history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptMeta {
  pub id:          Uuid,
  pub name:        String,
  pub description: String,
  pub author:      String,
  pub version:     String,
  pub match_rules: Vec<MatchRule>,
  pub grants:      BTreeSet<Grant>,
  pub run_at:      RunAt,
  pub updated_at:  DateTime<Utc>,
}

// ─── ScriptDraft ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::ScriptStore::save`].
///
/// `updated_at` and history are owned by the store and never accepted from
/// callers. Saving a draft whose `id` already exists updates that record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDraft {
  pub id:          Uuid,
  pub name:        String,
  pub description: String,
  pub author:      String,
  pub version:     String,
  pub source_code: String,
  pub match_rules: Vec<MatchRule>,
  pub grants:      BTreeSet<Grant>,
  pub run_at:      RunAt,
  /// Recorded on the history entry when this save changes source or version.
  pub changelog:   Option<String>,
}

impl ScriptDraft {
  /// A draft with a fresh id, no rules, no grants and the default run timing.
  pub fn new(
    name: impl Into<String>,
    version: impl Into<String>,
    source_code: impl Into<String>,
  ) -> Self {
    Self {
      id:          Uuid::new_v4(),
      name:        name.into(),
      description: String::new(),
      author:      String::new(),
      version:     version.into(),
      source_code: source_code.into(),
      match_rules: Vec::new(),
      grants:      BTreeSet::new(),
      run_at:      RunAt::default(),
      changelog:   None,
    }
  }

  /// A draft that will overwrite `record` when saved.
  pub fn from_record(record: &ScriptRecord) -> Self {
    Self {
      id:          record.id,
      name:        record.name.clone(),
      description: record.description.clone(),
      author:      record.author.clone(),
      version:     record.version.clone(),
      source_code: record.source_code.clone(),
      match_rules: record.match_rules.clone(),
      grants:      record.grants.clone(),
      run_at:      record.run_at,
      changelog:   None,
    }
  }

  pub fn with_id(mut self, id: Uuid) -> Self {
    self.id = id;
    self
  }

  pub fn include(mut self, pattern: impl Into<String>) -> Self {
    self.match_rules.push(MatchRule::include(pattern));
    self
  }

  pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
    self.match_rules.push(MatchRule::exclude(pattern));
    self
  }

  /// Shorthand for a single include pattern.
  pub fn domain(self, pattern: impl Into<String>) -> Self { self.include(pattern) }

  pub fn grant(mut self, grant: Grant) -> Self {
    self.grants.insert(grant);
    self
  }

  pub fn run_at(mut self, run_at: RunAt) -> Self {
    self.run_at = run_at;
    self
  }
}
