//! Whole-file access to scripts and artifacts.
//!
//! A script is read completely, transformed in memory and written back completely.
//! Writes land in a temporary file in the destination directory and are renamed over
//! the target, so readers see either the old file or the new one, never a mix.

use crate::error::DebuggerError;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A script on disk together with its full text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    path: PathBuf,
    text: String,
}

impl SourceUnit {
    pub fn load(path: &Path) -> Result<Self, DebuggerError> {
        let text = std::fs::read_to_string(path).map_err(|e| DebuggerError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
        })
    }

    /// A unit that has not been written anywhere yet.
    pub fn in_memory(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn size_bytes(&self) -> u64 {
        self.text.len() as u64
    }

    /// Replace the whole text.
    pub fn replace(&mut self, text: String) {
        self.text = text;
    }

    /// Write the text back to this unit's own path.
    pub fn store(&self) -> Result<(), DebuggerError> {
        write_atomic(&self.path, &self.text)
    }

    /// Write the text to `path` and make that the unit's path.
    pub fn store_as(&mut self, path: &Path) -> Result<(), DebuggerError> {
        write_atomic(path, &self.text)?;
        self.path = path.to_path_buf();
        Ok(())
    }
}

/// Replace `path` with `contents` in one rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), DebuggerError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| DebuggerError::io(&dir, e))?;
    if let Err(e) = tmp.write_all(contents.as_bytes()).and_then(|_| tmp.flush()) {
        return Err(DebuggerError::io(tmp.path(), e));
    }
    tmp.persist(path)
        .map_err(|e| DebuggerError::io(path, e.error))?;
    Ok(())
}
