//! # Source Rewriting
//!
//! Text-level rules that make a script runnable without a person at the keyboard and
//! without touching paths outside the sandbox root. Rules work on lines and patterns,
//! not on a syntax tree, so a script does not need to be complete or even valid for a
//! pass to run over it.
//!
//! Each rule is a pure function from input text to a [`RewriteOutcome`] holding the
//! new text, the edits actually applied and the lines that were deliberately left
//! alone. Filesystem effects of the path passes are described as [`SandboxFile`]s and
//! carried out separately by [`paths::materialize`].
//!
//! Every edit comments the original line with [`MARKER`] and inserts exactly one
//! synthesized line directly after it. [`restore::restore`] undoes those pairs.
//! Lines already carrying the marker, the sentinel, or a sandbox path are never
//! touched again, which makes every pass idempotent.

pub mod inputs;
pub mod paths;
pub mod restore;
pub mod source;

pub use inputs::{neutralize_inputs, relax_required_args};
pub use paths::{materialize, virtualize_absolute_paths, virtualize_mode_paths};
pub use restore::{RestoreOutcome, restore};
pub use source::{SourceUnit, write_atomic};

use serde::Serialize;
use std::path::PathBuf;

/// Prefix that comments out a rewritten original line.
pub const MARKER: &str = "#%@ ";

/// Value written into synthesized files and arguments.
pub const SENTINEL: &str = "[SENSIBLE VALUE]";

/// Trailing tag on synthesized assignment lines.
pub const SENTINEL_TAG: &str = "#[SENSIBLE VALUE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewriteKind {
    InputReplacement,
    ArgDefault,
    PathRedirect,
}

/// One applied edit: the commented original plus its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteRecord {
    pub kind: RewriteKind,
    /// 1-based line number in the text the pass received
    pub line_no: usize,
    pub original: String,
    pub replacement: String,
}

impl RewriteRecord {
    /// The original line as it appears after the edit.
    pub fn commented(&self) -> String {
        format!("{MARKER}{}", self.original)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// `input()` is wrapped by a function whose result type is unknown
    UnknownWrapper(String),
    /// `input()` appears outside a simple assignment
    NotAnAssignment,
    /// The path argument is not a plain string literal
    NotLiteralPath,
    /// The literal has no usable base name
    NoBaseName(String),
    /// The call's closing parenthesis is not on this line
    UnbalancedCall,
}

/// A line a rule recognised but chose not to rewrite. Surfaced for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteSkip {
    pub kind: RewriteKind,
    pub line_no: usize,
    pub line: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// How a sandbox file comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOrigin {
    /// Real file or directory moved in from its original location
    Relocated,
    /// File created with the sentinel value, only if nothing is there yet
    PlaceholderFile,
    /// Empty directory
    PlaceholderDir,
}

/// Mapping from a path referenced by the script to its place under the sandbox root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxFile {
    pub original: PathBuf,
    pub sandbox_path: PathBuf,
    pub origin: FileOrigin,
}

impl SandboxFile {
    /// Whether real content is moved rather than synthesized.
    pub fn is_relocated(&self) -> bool {
        self.origin == FileOrigin::Relocated
    }
}

/// Result of one rewrite pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteOutcome {
    #[serde(skip)]
    pub text: String,
    pub records: Vec<RewriteRecord>,
    pub skipped: Vec<RewriteSkip>,
    pub sandbox_files: Vec<SandboxFile>,
}

impl RewriteOutcome {
    pub fn edit_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_unchanged(&self) -> bool {
        self.records.is_empty()
    }

    /// Fold a later pass into this one, keeping the later pass's text.
    pub fn absorb(&mut self, later: RewriteOutcome) {
        self.text = later.text;
        self.records.extend(later.records);
        self.skipped.extend(later.skipped);
        self.sandbox_files.extend(later.sandbox_files);
    }
}

/// A line split into its content and its line ending (`"\n"`, `"\r\n"` or `""`).
pub(crate) fn split_lines(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.split_inclusive('\n').map(|raw| {
        if let Some(body) = raw.strip_suffix("\r\n") {
            (body, "\r\n")
        } else if let Some(body) = raw.strip_suffix('\n') {
            (body, "\n")
        } else {
            (raw, "")
        }
    })
}

/// Like [`split_lines`], also flagging lines synthesized by an earlier edit, i.e.
/// the line directly after a marker line.
pub(crate) fn scan_lines(text: &str) -> impl Iterator<Item = (&str, &str, bool)> {
    let mut after_marker = false;
    split_lines(text).map(move |(line, ending)| {
        let synthesized = after_marker;
        after_marker = !synthesized && line.starts_with(MARKER);
        (line, ending, synthesized)
    })
}

/// Emit an edit of `line`. A line synthesized by an earlier pass is replaced in
/// place: its marker line already holds the original, so one pair stays one pair.
pub(crate) fn push_edit(
    out: &mut String,
    line: &str,
    ending: &str,
    replacement: &str,
    synthesized: bool,
) {
    if synthesized {
        out.push_str(replacement);
        out.push_str(ending);
    } else {
        push_pair(out, line, ending, replacement);
    }
}

/// Append the marker-commented original and its replacement, preserving the
/// original line ending so that [`restore::restore`] is byte-exact.
pub(crate) fn push_pair(out: &mut String, original: &str, ending: &str, replacement: &str) {
    out.push_str(MARKER);
    out.push_str(original);
    out.push_str(if ending.is_empty() { "\n" } else { ending });
    out.push_str(replacement);
    out.push_str(ending);
}

/// Lines no rule may touch again.
pub(crate) fn is_protected(line: &str, sandbox_root: Option<&str>) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#')
        || line.contains(SENTINEL)
        || sandbox_root.is_some_and(|root| mentions_root(line, root))
}

fn mentions_root(line: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    line.match_indices(root).any(|(idx, _)| {
        matches!(
            line[idx + root.len()..].chars().next(),
            Some('/') | Some('"') | Some('\'') | None
        )
    })
}
