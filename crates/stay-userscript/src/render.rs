//! Canonical header rendering.
//!
//! Emits the directives [`crate::parse`] recognises, one per line, with keys
//! padded to a common column. Grants use their canonical names.

use std::fmt::Write as _;

use stay_core::script::{RuleKind, ScriptMeta};

const KEY_WIDTH: usize = 13;

/// Fold line breaks into spaces so a value stays on its directive line.
fn single_line(value: &str) -> String {
  value.split(['\r', '\n']).filter(|part| !part.is_empty()).collect::<Vec<_>>().join(" ")
}

pub(crate) fn render(meta: &ScriptMeta) -> String {
  let mut out = String::from("// ==UserScript==\n");
  let mut line = |key: &str, value: &str| {
    // Writing into a String cannot fail.
    let _ = writeln!(out, "// @{key:<KEY_WIDTH$}{}", single_line(value));
  };

  line("name", &meta.name);
  line("version", &meta.version);
  if !meta.description.is_empty() {
    line("description", &meta.description);
  }
  if !meta.author.is_empty() {
    line("author", &meta.author);
  }
  for rule in &meta.match_rules {
    match rule.kind {
      RuleKind::Include => line("match", &rule.pattern),
      RuleKind::Exclude => line("exclude", &rule.pattern),
    }
  }
  if meta.grants.is_empty() {
    line("grant", "none");
  }
  for grant in &meta.grants {
    line("grant", grant.as_str());
  }
  line("run-at", meta.run_at.as_str());

  out.push_str("// ==/UserScript==\n");
  out
}
