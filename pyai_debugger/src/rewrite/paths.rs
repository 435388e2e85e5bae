//! Path virtualization.
//!
//! Two complementary passes redirect filesystem references into the sandbox root:
//!
//! - **Pass A** ([`virtualize_mode_paths`]): `open("<path>", <mode>, ...)` calls whose
//!   first argument is a string literal. Absolute paths and paths climbing out with
//!   `..` collapse to their base name; other relative paths keep their shape under the
//!   root. A placeholder file is created only when nothing exists there yet.
//! - **Pass B** ([`virtualize_absolute_paths`]): any absolute path literal on a line.
//!   Existing files and directories are moved into the root; missing ones become a
//!   placeholder file (name has a dot) or an empty directory.
//!
//! Both passes are pure. They describe the filesystem work as [`SandboxFile`]s which
//! [`materialize`] then performs.

use super::{
    FileOrigin, RewriteKind, RewriteOutcome, RewriteRecord, RewriteSkip, SENTINEL, SandboxFile,
    SkipReason, is_protected, push_edit, scan_lines,
};
use crate::error::DebuggerError;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

fn open_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bopen\s*\(\s*").expect("open call regex must compile"))
}

fn absolute_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""(?P<dq>/[\w./-]+)"|'(?P<sq>/[\w./-]+)'"#)
            .expect("absolute path literal regex must compile")
    })
}

/// Where a referenced path lands inside the sandbox root.
///
/// Returns `None` when the path has no usable name (empty, `/`, `..`).
pub fn sandbox_target(root: &Path, referenced: &str) -> Option<PathBuf> {
    let path = Path::new(referenced);
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        let name = path.file_name()?;
        if name == ".." {
            return None;
        }
        return Some(root.join(name));
    }
    let relative: PathBuf = path
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(root.join(relative))
    }
}

/// Pass A: redirect `open("<literal>", <mode>)` style calls.
pub fn virtualize_mode_paths(text: &str, root: &Path) -> RewriteOutcome {
    let root_str = root.to_string_lossy();
    let mut outcome = RewriteOutcome::default();
    let mut out = String::with_capacity(text.len() + 64);

    for (idx, (line, ending, synthesized)) in scan_lines(text).enumerate() {
        let line_no = idx + 1;
        let call = open_call().find(line);
        let candidate = call.is_some_and(|m| line[m.end()..].contains(','));
        if is_protected(line, Some(&root_str)) || !candidate {
            out.push_str(line);
            out.push_str(ending);
            continue;
        }
        let arg_start = call.map_or(0, |m| m.end());

        let Some((lit_start, lit_end)) = literal_with_mode(line, arg_start) else {
            outcome.skipped.push(RewriteSkip {
                kind: RewriteKind::PathRedirect,
                line_no,
                line: line.to_string(),
                reason: SkipReason::NotLiteralPath,
            });
            out.push_str(line);
            out.push_str(ending);
            continue;
        };

        let referenced = &line[lit_start..lit_end];
        let Some(target) = sandbox_target(root, referenced) else {
            outcome.skipped.push(RewriteSkip {
                kind: RewriteKind::PathRedirect,
                line_no,
                line: line.to_string(),
                reason: SkipReason::NoBaseName(referenced.to_string()),
            });
            out.push_str(line);
            out.push_str(ending);
            continue;
        };

        let replacement = format!(
            "{}{}{}",
            &line[..lit_start],
            target.to_string_lossy(),
            &line[lit_end..]
        );
        push_edit(&mut out, line, ending, &replacement, synthesized);
        outcome.sandbox_files.push(SandboxFile {
            original: PathBuf::from(referenced),
            sandbox_path: target,
            origin: FileOrigin::PlaceholderFile,
        });
        outcome.records.push(RewriteRecord {
            kind: RewriteKind::PathRedirect,
            line_no,
            original: line.to_string(),
            replacement,
        });
    }

    outcome.text = out;
    outcome
}

/// Byte range of the string literal starting at `at`, provided it is followed by a
/// second positional argument.
fn literal_with_mode(line: &str, at: usize) -> Option<(usize, usize)> {
    let rest = &line[at..];
    let prefix_len = rest
        .bytes()
        .take_while(|b| matches!(b, b'r' | b'R'))
        .count();
    let quote = *rest.as_bytes().get(prefix_len)?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let body_start = at + prefix_len + 1;
    let body_len = line[body_start..].find(quote as char)?;
    let body_end = body_start + body_len;
    let after = line[body_end + 1..].trim_start();
    if !after.starts_with(',') || body_len == 0 {
        return None;
    }
    Some((body_start, body_end))
}

/// Pass B: redirect every absolute path literal.
///
/// `exists` decides whether a referenced path is real; it is injected so the pass
/// stays free of I/O.
pub fn virtualize_absolute_paths(
    text: &str,
    root: &Path,
    exists: impl Fn(&Path) -> bool,
) -> RewriteOutcome {
    let root_str = root.to_string_lossy();
    let mut outcome = RewriteOutcome::default();
    let mut out = String::with_capacity(text.len() + 64);

    for (idx, (line, ending, synthesized)) in scan_lines(text).enumerate() {
        let line_no = idx + 1;
        if is_protected(line, Some(&root_str)) || !absolute_literal().is_match(line) {
            out.push_str(line);
            out.push_str(ending);
            continue;
        }

        let mut replacement = String::with_capacity(line.len() + 32);
        let mut files = Vec::new();
        let mut cursor = 0;
        for caps in absolute_literal().captures_iter(line) {
            let Some(m) = caps.name("dq").or_else(|| caps.name("sq")) else {
                continue;
            };
            let referenced = m.as_str();
            let Some(name) = Path::new(referenced).file_name().filter(|n| *n != "..") else {
                outcome.skipped.push(RewriteSkip {
                    kind: RewriteKind::PathRedirect,
                    line_no,
                    line: line.to_string(),
                    reason: SkipReason::NoBaseName(referenced.to_string()),
                });
                continue;
            };
            let target = root.join(name);
            let origin = if exists(Path::new(referenced)) {
                FileOrigin::Relocated
            } else if name.to_string_lossy().contains('.') {
                FileOrigin::PlaceholderFile
            } else {
                FileOrigin::PlaceholderDir
            };

            replacement.push_str(&line[cursor..m.start()]);
            replacement.push_str(&target.to_string_lossy());
            cursor = m.end();
            files.push(SandboxFile {
                original: PathBuf::from(referenced),
                sandbox_path: target,
                origin,
            });
        }

        if files.is_empty() {
            out.push_str(line);
            out.push_str(ending);
            continue;
        }
        replacement.push_str(&line[cursor..]);

        push_edit(&mut out, line, ending, &replacement, synthesized);
        outcome.sandbox_files.extend(files);
        outcome.records.push(RewriteRecord {
            kind: RewriteKind::PathRedirect,
            line_no,
            original: line.to_string(),
            replacement,
        });
    }

    outcome.text = out;
    outcome
}

/// What [`materialize`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeSummary {
    pub relocated: Vec<PathBuf>,
    pub created: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

/// Create the sandbox root and carry out the filesystem side of the path passes.
///
/// Only a failure to create the root itself is an error; problems with individual
/// files are logged and listed in the summary.
pub fn materialize(root: &Path, files: &[SandboxFile]) -> Result<MaterializeSummary, DebuggerError> {
    std::fs::create_dir_all(root).map_err(|e| DebuggerError::io(root, e))?;

    let mut summary = MaterializeSummary::default();
    for file in files {
        let result = match file.origin {
            FileOrigin::Relocated => relocate(&file.original, &file.sandbox_path),
            FileOrigin::PlaceholderFile => create_placeholder_file(&file.sandbox_path),
            FileOrigin::PlaceholderDir => std::fs::create_dir_all(&file.sandbox_path).map(|_| true),
        };
        match result {
            Ok(true) if file.is_relocated() => {
                tracing::info!(from = %file.original.display(), to = %file.sandbox_path.display(), "Moved into sandbox");
                summary.relocated.push(file.sandbox_path.clone());
            }
            Ok(true) => {
                tracing::debug!(path = %file.sandbox_path.display(), "Created sandbox placeholder");
                summary.created.push(file.sandbox_path.clone());
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(path = %file.sandbox_path.display(), error = %e, "Could not prepare sandbox file");
                summary
                    .failures
                    .push((file.sandbox_path.clone(), e.to_string()));
            }
        }
    }
    Ok(summary)
}

fn create_placeholder_file(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, SENTINEL)?;
    Ok(true)
}

/// Move `from` to `to`. A source that is already gone (moved by an earlier line)
/// is not an error.
fn relocate(from: &Path, to: &Path) -> std::io::Result<bool> {
    if !from.exists() {
        return Ok(false);
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices && from.is_file() => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            tracing::warn!(from = %from.display(), "Directory is on another device, using an empty placeholder");
            std::fs::create_dir_all(to)?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}
