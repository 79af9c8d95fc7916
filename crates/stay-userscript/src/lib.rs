//! Userscript definition format for Stay.
//!
//! A script file starts with a header block of `// @key value` directives
//! between `// ==UserScript==` and `// ==/UserScript==`, followed by the
//! body. The whole file, header included, becomes the script's source.
//! Pure synchronous; no I/O.
//!
//! # Quick start
//!
//! ```no_run
//! let src = "// ==UserScript==\n// @name hi\n// @version 1.0.0\n// ==/UserScript==\n";
//! let draft = stay_userscript::parse(src).unwrap();
//! println!("{} {}", draft.name, draft.version);
//! ```

pub mod error;
mod parse;
mod render;

pub use error::{Error, Result};
use stay_core::script::{ScriptDraft, ScriptMeta};

/// Parse a userscript file into a draft with a fresh id.
///
/// Match patterns are carried through unchecked; the store compiles them
/// when the draft is saved.
pub fn parse(input: &str) -> Result<ScriptDraft> { parse::parse(input) }

/// Render the canonical header block for `meta`.
pub fn render_header(meta: &ScriptMeta) -> String { render::render(meta) }
