//! Wildcard URL patterns and the include/exclude [`Matcher`] built from them.
//!
//! A pattern is a URL in which `*` stands for zero or more characters; every
//! other character is literal. Matching is case-insensitive and anchored at
//! both ends.
//!
//! Compilation splits the pattern at each `*` into literal segments. The
//! first segment must be a prefix of the URL and the last a suffix; every
//! middle segment is placed at its leftmost occurrence after the previous
//! one. With `*` as the only metacharacter the leftmost placement never has
//! to be revisited, so evaluation is a single forward scan with no
//! backtracking.

use thiserror::Error;

use crate::script::{MatchRule, RuleKind};

/// Longest pattern accepted, in characters.
pub const MAX_PATTERN_LEN: usize = 2048;

/// Conventional spelling for "every URL"; compiled as a lone `*`.
pub const ALL_URLS: &str = "<all_urls>";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
  #[error("pattern is empty")]
  Empty,

  #[error("pattern is longer than {MAX_PATTERN_LEN} characters")]
  TooLong,

  #[error("pattern {pattern:?} has whitespace or a control character at byte {position}")]
  InvalidCharacter { pattern: String, position: usize },
}

// ─── Pattern ─────────────────────────────────────────────────────────────────

/// A single compiled wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
  source:   String,
  /// Lowercased literal runs; `segments.len()` is the wildcard count plus
  /// one, so it is never empty.
  segments: Vec<String>,
}

impl Pattern {
  pub fn compile(source: &str) -> Result<Self, PatternError> {
    if source.is_empty() {
      return Err(PatternError::Empty);
    }
    if source.chars().count() > MAX_PATTERN_LEN {
      return Err(PatternError::TooLong);
    }
    if let Some((position, _)) = source
      .char_indices()
      .find(|(_, c)| c.is_whitespace() || c.is_control())
    {
      return Err(PatternError::InvalidCharacter {
        pattern: source.to_owned(),
        position,
      });
    }

    let effective = if source == ALL_URLS { "*" } else { source };
    let segments = effective
      .to_lowercase()
      .split('*')
      .map(str::to_owned)
      .collect();

    Ok(Self { source: source.to_owned(), segments })
  }

  /// The pattern as written.
  pub fn as_str(&self) -> &str { &self.source }

  /// Match against `url`, folding case first.
  pub fn is_match(&self, url: &str) -> bool {
    self.matches_folded(&url.to_lowercase())
  }

  /// Match against a URL that has already been lowercased.
  fn matches_folded(&self, url: &str) -> bool {
    let Some((first, rest)) = self.segments.split_first() else {
      return false;
    };
    let Some((last, middle)) = rest.split_last() else {
      // No wildcard at all: exact comparison.
      return url == first;
    };
    let Some(mut remaining) = url.strip_prefix(first.as_str()) else {
      return false;
    };

    for segment in middle.iter().filter(|s| !s.is_empty()) {
      match remaining.find(segment.as_str()) {
        Some(at) => remaining = &remaining[at + segment.len()..],
        None => return false,
      }
    }

    remaining.ends_with(last.as_str())
  }
}

// ─── Matcher ─────────────────────────────────────────────────────────────────

/// A compiled rule set: a URL matches when any include pattern matches and
/// no exclude pattern does. An empty include set never matches.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
  includes: Vec<Pattern>,
  excludes: Vec<Pattern>,
}

impl Matcher {
  /// Compile an ordered rule set. The first malformed pattern aborts
  /// compilation.
  pub fn compile(rules: &[MatchRule]) -> Result<Self, PatternError> {
    let mut matcher = Self::default();
    for rule in rules {
      let pattern = Pattern::compile(&rule.pattern)?;
      match rule.kind {
        RuleKind::Include => matcher.includes.push(pattern),
        RuleKind::Exclude => matcher.excludes.push(pattern),
      }
    }
    Ok(matcher)
  }

  pub fn matches(&self, url: &str) -> bool {
    if self.includes.is_empty() {
      return false;
    }
    let url = url.to_lowercase();
    self.includes.iter().any(|p| p.matches_folded(&url))
      && !self.excludes.iter().any(|p| p.matches_folded(&url))
  }

  pub fn has_includes(&self) -> bool { !self.includes.is_empty() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn matcher(rules: &[MatchRule]) -> Matcher { Matcher::compile(rules).unwrap() }

  #[test]
  fn verbatim_pattern_matches_only_itself() {
    let url = "https://example.com/path?q=1";
    let m = matcher(&[MatchRule::include(url)]);
    assert!(m.matches(url));
    for other in [
      "https://example.com/path?q=12",
      "https://example.com/path?q=",
      "http://example.com/path?q=1",
      "https://example.com/path?q=1/",
      "xhttps://example.com/path?q=1",
    ] {
      assert!(!m.matches(other), "{other} should not match");
    }
  }

  #[test]
  fn subdomain_wildcard() {
    let m = matcher(&[MatchRule::include("*://*.example.com/*")]);
    assert!(m.matches("https://api.example.com/path?x=1"));
    assert!(m.matches("http://a.b.example.com/"));
    assert!(!m.matches("https://example.org/"));
    assert!(!m.matches("https://api.example.com"));
  }

  #[test]
  fn exclude_more_specific_than_include() {
    let m = matcher(&[
      MatchRule::include("*://*.example.com/*"),
      MatchRule::exclude("*://*.example.com/admin/*"),
    ]);
    assert!(m.matches("https://x.example.com/"));
    assert!(!m.matches("https://x.example.com/admin/y"));
  }

  #[test]
  fn matching_is_case_insensitive() {
    let m = matcher(&[MatchRule::include("https://Example.COM/*")]);
    assert!(m.matches("HTTPS://EXAMPLE.com/Index.html"));
  }

  #[test]
  fn regex_metacharacters_are_literal() {
    let m = matcher(&[MatchRule::include("https://a.b/(x)?+[y]")]);
    assert!(m.matches("https://a.b/(x)?+[y]"));
    assert!(!m.matches("https://aXb/(x)?+[y]"));
    assert!(!m.matches("https://a.b/x"));
  }

  #[test]
  fn empty_include_set_never_matches() {
    let m = matcher(&[MatchRule::exclude("*")]);
    assert!(!m.matches("https://example.com/"));
    assert!(!matcher(&[]).matches("https://example.com/"));
  }

  #[test]
  fn all_urls_alias() {
    let m = matcher(&[MatchRule::include(ALL_URLS)]);
    assert!(m.matches("file:///tmp/a.html"));
    assert!(m.matches(""));
  }

  #[test]
  fn adjacent_and_trailing_wildcards() {
    let p = Pattern::compile("a**b*").unwrap();
    assert!(p.is_match("ab"));
    assert!(p.is_match("axxbyy"));
    assert!(!p.is_match("ba"));
  }

  #[test]
  fn suffix_cannot_overlap_consumed_prefix() {
    let p = Pattern::compile("ab*ba").unwrap();
    assert!(!p.is_match("aba"));
    assert!(p.is_match("abba"));
  }

  #[test]
  fn pathological_input_stays_fast() {
    let p = Pattern::compile("*a*a*a*a*a*a*a*b").unwrap();
    let url = "a".repeat(100_000);
    assert!(!p.is_match(&url));
  }

  #[test]
  fn malformed_patterns_are_rejected() {
    assert_eq!(Pattern::compile(""), Err(PatternError::Empty));
    assert!(matches!(
      Pattern::compile("https://a b/"),
      Err(PatternError::InvalidCharacter { position: 9, .. })
    ));
    assert_eq!(
      Pattern::compile(&"x".repeat(MAX_PATTERN_LEN + 1)),
      Err(PatternError::TooLong)
    );
    assert!(Matcher::compile(&[MatchRule::include("ok"), MatchRule::exclude("\t")]).is_err());
  }
}
