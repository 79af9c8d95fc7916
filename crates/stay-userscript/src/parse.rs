//! `==UserScript==` header parser.
//!
//! Pipeline:
//!   raw &str
//!     └─ locate_block()       → header lines
//!          └─ parse_directive()  → (key, value)
//!               └─ Header::apply()  → accumulate fields
//!                    └─ Header::into_draft() → ScriptDraft

use stay_core::{
  script::{Grant, MatchRule, RunAt, ScriptDraft},
  version::Version,
};

use crate::error::{Error, Result};

const OPEN: &str = "==UserScript==";
const CLOSE: &str = "==/UserScript==";

// ─── Grant names ─────────────────────────────────────────────────────────────

/// Resolve a `@grant` value to a capability. `Ok(None)` is `@grant none`.
pub(crate) fn resolve_grant(value: &str) -> Result<Option<Grant>> {
  if value == "none" {
    return Ok(None);
  }
  if let Some(grant) = Grant::parse(value) {
    return Ok(Some(grant));
  }
  let grant = match value {
    "GM_getValue" | "GM_setValue" | "GM_deleteValue" | "GM_listValues" => Grant::Storage,
    "GM_xmlhttpRequest" => Grant::Network,
    "GM_addStyle" => Grant::Style,
    "GM_registerMenuCommand" | "GM_unregisterMenuCommand" => Grant::Menu,
    "GM_openInTab" => Grant::Tab,
    "unsafeWindow" => Grant::RawPageAccess,
    other => return Err(Error::UnknownGrant(other.to_owned())),
  };
  Ok(Some(grant))
}

// ─── Block location ──────────────────────────────────────────────────────────

/// The text after `//`, if `line` is a line comment.
fn comment_body(line: &str) -> Option<&str> { line.trim().strip_prefix("//").map(str::trim) }

/// Return the header lines (exclusive of the markers) paired with their
/// 1-based line numbers.
fn locate_block(input: &str) -> Result<Vec<(usize, &str)>> {
  let mut lines = input.lines().enumerate();

  lines
    .by_ref()
    .find(|(_, l)| comment_body(l) == Some(OPEN))
    .ok_or(Error::MissingHeader)?;

  let mut block = Vec::new();
  for (idx, line) in lines {
    if comment_body(line) == Some(CLOSE) {
      return Ok(block);
    }
    block.push((idx + 1, line));
  }
  Err(Error::UnterminatedHeader)
}

/// Split `// @key value` into `(key, value)`. Returns `None` for blank and
/// plain comment lines, which are allowed inside the block.
fn parse_directive(line_no: usize, line: &str) -> Result<Option<(&str, &str)>> {
  if line.trim().is_empty() {
    return Ok(None);
  }
  let body = comment_body(line).ok_or_else(|| Error::MalformedLine {
    line: line_no,
    text: line.to_owned(),
  })?;
  let Some(directive) = body.strip_prefix('@') else {
    return Ok(None);
  };
  let (key, value) = match directive.split_once(char::is_whitespace) {
    Some((k, v)) => (k, v.trim()),
    None => (directive, ""),
  };
  if key.is_empty() {
    return Err(Error::MalformedLine { line: line_no, text: line.to_owned() });
  }
  Ok(Some((key, value)))
}

// ─── Accumulator ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct Header {
  name:        Option<String>,
  namespace:   Option<String>,
  version:     Option<String>,
  description: Option<String>,
  author:      Option<String>,
  rules:       Vec<MatchRule>,
  grants:      Vec<Grant>,
  run_at:      Option<RunAt>,
}

impl Header {
  fn apply(&mut self, key: &str, value: &str) -> Result<()> {
    let required = || {
      if value.is_empty() {
        Err(Error::EmptyDirective(key.to_owned()))
      } else {
        Ok(value.to_owned())
      }
    };

    match key {
      "name" => set_once(&mut self.name, required()?),
      "namespace" => set_once(&mut self.namespace, required()?),
      "version" => set_once(&mut self.version, required()?),
      "description" => set_once(&mut self.description, value.to_owned()),
      "author" => set_once(&mut self.author, value.to_owned()),
      "match" | "include" | "domain" => self.rules.push(MatchRule::include(required()?)),
      "exclude" | "exclude-match" => self.rules.push(MatchRule::exclude(required()?)),
      "grant" => {
        if let Some(grant) = resolve_grant(&required()?)? {
          self.grants.push(grant);
        }
      }
      "run-at" => {
        let raw = required()?;
        let run_at = RunAt::parse(&raw).ok_or(Error::UnknownRunAt(raw))?;
        self.run_at = Some(run_at);
      }
      // Localised variants (`@name:fr`) and directives we don't act on.
      _ => {}
    }
    Ok(())
  }

  fn into_draft(self, source: &str) -> Result<ScriptDraft> {
    let name = self.name.ok_or(Error::MissingDirective("name"))?;
    let version = self.version.ok_or(Error::MissingDirective("version"))?;
    if version.parse::<Version>().is_err() {
      return Err(Error::InvalidVersion(version));
    }

    let mut draft = ScriptDraft::new(name, version, source);
    draft.description = self.description.unwrap_or_default();
    draft.author = self.author.or(self.namespace).unwrap_or_default();
    draft.match_rules = self.rules;
    draft.grants = self.grants.into_iter().collect();
    draft.run_at = self.run_at.unwrap_or_default();
    Ok(draft)
  }
}

/// First occurrence wins.
fn set_once(slot: &mut Option<String>, value: String) {
  if slot.is_none() {
    *slot = Some(value);
  }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub(crate) fn parse(input: &str) -> Result<ScriptDraft> {
  let mut header = Header::default();
  for (line_no, line) in locate_block(input)? {
    if let Some((key, value)) = parse_directive(line_no, line)? {
      header.apply(key, value)?;
    }
  }
  header.into_draft(input)
}
